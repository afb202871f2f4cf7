//! Send side: capture, downsample, encode, split, send

use glam::Vec3;
use tracing::{debug, info};

use crate::chunk::ChunkSplitter;
use crate::codec::FrameCodec;
use crate::config::PipelineConfig;
use crate::downsample::Downsampler;
use crate::transport::MessageTransport;
use crate::types::{Color, EncodedFrame, PointCloudFrame};
use crate::{Result, StreamError};

/// Summary of one sent frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureReport {
    /// Zero-based position of the frame in this producer's stream
    pub frame_index: u64,
    /// Points captured before downsampling
    pub input_points: usize,
    /// Points actually sent
    pub output_points: usize,
    pub encoded_bytes: usize,
    /// Transport messages used, completion included
    pub messages: usize,
}

/// Producer end of a push-mode pipeline
pub struct Producer<T: MessageTransport> {
    transport: T,
    downsampler: Box<dyn Downsampler>,
    codec: FrameCodec,
    splitter: ChunkSplitter,
    frames_sent: u64,
}

impl<T: MessageTransport> Producer<T> {
    /// Build a producer from a validated config.
    ///
    /// The chunk size is capped at the transport's own message limit.
    pub fn new(transport: T, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;

        let limit = transport.max_message_size();
        let chunk_size = config.max_chunk_size.min(limit);
        if chunk_size < config.max_chunk_size {
            debug!("Chunk size capped at transport limit of {} bytes", limit);
        }
        let splitter = ChunkSplitter::new(chunk_size, config.framing)?;

        Ok(Self {
            transport,
            downsampler: Box::new(config.downsampler()?),
            codec: config.codec()?,
            splitter,
            frames_sent: 0,
        })
    }

    /// Replace the configured downsampler.
    pub fn with_downsampler(mut self, downsampler: impl Downsampler + 'static) -> Self {
        self.downsampler = Box::new(downsampler);
        self
    }

    /// Send raw capture output. `positions` and `colors` must have equal length.
    pub async fn capture_frame(
        &mut self,
        positions: &[Vec3],
        colors: &[Color],
    ) -> Result<CaptureReport> {
        let frame = PointCloudFrame::from_parts(positions, colors)?;
        self.send_frame(frame).await
    }

    /// Downsample, encode and send one frame.
    pub async fn send_frame(&mut self, frame: PointCloudFrame) -> Result<CaptureReport> {
        let input_points = frame.len();
        let reduced = self.downsampler.downsample(frame)?;
        let output_points = reduced.len();
        let encoded = self.codec.encode(&reduced)?;

        let frame_index = self.frames_sent;
        let messages = self.send_encoded(&encoded).await?;
        let report = CaptureReport {
            frame_index,
            input_points,
            output_points,
            encoded_bytes: encoded.len(),
            messages,
        };

        info!(
            points = output_points,
            captured = input_points,
            bytes = report.encoded_bytes,
            chunks = messages,
            "Frame {} sent",
            frame_index
        );
        Ok(report)
    }

    /// Send an already-encoded frame, returning the number of messages used.
    pub async fn send_encoded(&mut self, frame: &EncodedFrame) -> Result<usize> {
        let messages = self.splitter.to_messages(frame.as_bytes())?;
        let count = messages.len();
        for message in messages {
            self.transport.send(message).await.map_err(|e| match e {
                StreamError::ChannelClosed { .. } => e,
                other => StreamError::transport_failed_with_source(
                    format!("Sending chunk of frame {}", self.frames_sent),
                    Box::new(other),
                ),
            })?;
        }
        self.frames_sent += 1;
        Ok(count)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkAssembler, ChunkEvent, Framing, SessionId};
    use crate::downsample::DownsampleStrategy;
    use crate::transport::MemoryTransport;

    fn config() -> PipelineConfig {
        PipelineConfig::default().with_voxel_size(0.1).with_max_chunk_size(64)
    }

    #[tokio::test]
    async fn capture_sends_chunks_and_marker() {
        let (tx, mut rx) = MemoryTransport::pair(1024, 64);
        let mut producer = Producer::new(tx, &config()).unwrap();

        let positions: Vec<Vec3> = (0..40).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
        let colors = vec![Color::rgb(0.5, 0.5, 0.5); 40];
        let report = producer.capture_frame(&positions, &colors).await.unwrap();

        assert_eq!(report.input_points, 40);
        assert_eq!(report.output_points, 40);
        assert_eq!(report.encoded_bytes, 4 + 40 * 9);
        // 364 bytes at 63 payload bytes per message, plus the completion message
        assert_eq!(report.messages, 7);

        let mut assembler = ChunkAssembler::new(Framing::Tagged, 4096);
        let mut completed = None;
        for _ in 0..report.messages {
            let message = rx.recv().await.unwrap().unwrap();
            assert!(message.len() <= 64);
            if let ChunkEvent::Complete(frame) =
                assembler.on_message(SessionId::POINT_CLOUD, &message).unwrap()
            {
                completed = Some(frame);
            }
        }
        let frame = FrameCodec::default().decode(completed.unwrap().as_bytes()).unwrap();
        assert_eq!(frame.len(), 40);
    }

    #[tokio::test]
    async fn mismatched_capture_is_invalid_input() {
        let (tx, _rx) = MemoryTransport::pair(1024, 4);
        let mut producer = Producer::new(tx, &config()).unwrap();
        let result = producer.capture_frame(&[Vec3::ZERO, Vec3::ONE], &[Color::BLACK]).await;
        assert!(matches!(result, Err(StreamError::InvalidInput { .. })));
        assert_eq!(producer.frames_sent(), 0);
    }

    #[tokio::test]
    async fn chunk_size_is_capped_by_transport() {
        let (tx, mut rx) = MemoryTransport::pair(16, 256);
        let mut producer = Producer::new(tx, &PipelineConfig::default()).unwrap();
        let report = producer.send_frame(PointCloudFrame::new(vec![])).await.unwrap();
        assert_eq!(report.messages, 2);
        assert_eq!(rx.recv().await.unwrap(), Some(vec![0x00, 0, 0, 0, 0]));
        assert_eq!(rx.recv().await.unwrap(), Some(vec![0x01, 4, 0, 0, 0]));
    }

    #[tokio::test]
    async fn downsampling_reduces_sent_points() {
        let (tx, _rx) = MemoryTransport::pair(1024, 64);
        let config = config().with_strategy(DownsampleStrategy::Average).with_voxel_size(1.0);
        let mut producer = Producer::new(tx, &config).unwrap();

        let positions = vec![Vec3::splat(0.1), Vec3::splat(0.2), Vec3::splat(5.5)];
        let colors = vec![Color::BLACK; 3];
        let report = producer.capture_frame(&positions, &colors).await.unwrap();
        assert_eq!(report.output_points, 2);
    }

    struct LinkDown;

    #[async_trait::async_trait]
    impl MessageTransport for LinkDown {
        async fn send(&mut self, _message: Vec<u8>) -> Result<()> {
            Err(StreamError::transport_failed("link down"))
        }

        async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        fn max_message_size(&self) -> usize {
            64
        }
    }

    #[tokio::test]
    async fn reports_and_errors_use_the_same_frame_index() {
        let (tx, _rx) = MemoryTransport::pair(1024, 64);
        let mut producer = Producer::new(tx, &config()).unwrap();
        let first = producer.send_frame(PointCloudFrame::empty()).await.unwrap();
        let second = producer.send_frame(PointCloudFrame::empty()).await.unwrap();
        assert_eq!((first.frame_index, second.frame_index), (0, 1));
        assert_eq!(producer.frames_sent(), 2);

        let mut producer = Producer::new(LinkDown, &config()).unwrap();
        match producer.send_frame(PointCloudFrame::empty()).await {
            Err(StreamError::Transport { reason, .. }) => {
                assert_eq!(reason, "Sending chunk of frame 0")
            }
            other => panic!("expected a transport error, got {other:?}"),
        }
        assert_eq!(producer.frames_sent(), 0);
    }

    #[tokio::test]
    async fn closed_peer_surfaces_channel_closed() {
        let (tx, rx) = MemoryTransport::pair(1024, 4);
        drop(rx);
        let mut producer = Producer::new(tx, &config()).unwrap();
        let result = producer.send_frame(PointCloudFrame::empty()).await;
        assert!(matches!(result, Err(StreamError::ChannelClosed { .. })));
    }
}
