//! Receive-side task: transport -> assembler -> codec -> queue

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::chunk::{ChunkAssembler, ChunkEvent, SessionId};
use crate::codec::FrameCodec;
use crate::config::PipelineConfig;
use crate::queue::{PushOutcome, QueueReceiver, QueueSender, frame_queue};
use crate::transport::MessageTransport;
use crate::types::PointCloudFrame;
use crate::Result;

/// Consecutive transport errors tolerated before the task gives up
const MAX_ERRORS: u32 = 10;

/// Counters published by the receiver task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReceiverStats {
    /// Frames decoded successfully
    pub frames_completed: u64,
    /// Decoded frames lost to the queue policy
    pub frames_dropped: u64,
    /// Completed buffers that failed to decode
    pub decode_failures: u64,
    /// Chunk streams that violated the session contract
    pub protocol_violations: u64,
}

/// Handles returned by [`Receiver::spawn`]
pub struct ReceiverChannels {
    /// Decoded frames, in completion order
    pub frames: QueueReceiver<PointCloudFrame>,
    /// Latest counters
    pub stats: watch::Receiver<ReceiverStats>,
    /// Stops the task
    pub cancel: CancellationToken,
}

/// Spawns and manages the receive task
///
/// The task owns the transport and the assembler, so nothing else can touch a partial
/// frame. Completed frames leave the task by value through the frame queue.
pub struct Receiver;

impl Receiver {
    /// Spawn the receive task for `transport`.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn<T>(transport: T, config: &PipelineConfig) -> Result<ReceiverChannels>
    where
        T: MessageTransport,
    {
        config.validate()?;
        let codec = config.codec()?;
        let assembler = config.assembler();
        let (queue_tx, queue_rx) = frame_queue(config.queue_capacity, config.queue_policy);
        let (stats_tx, stats_rx) = watch::channel(ReceiverStats::default());
        let cancel = CancellationToken::new();

        let task = ReceiveTask {
            session: SessionId::POINT_CLOUD,
            assembler,
            codec,
            queue: queue_tx,
            stats: stats_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run(transport));

        Ok(ReceiverChannels { frames: queue_rx, stats: stats_rx, cancel })
    }
}

struct ReceiveTask {
    session: SessionId,
    assembler: ChunkAssembler,
    codec: FrameCodec,
    queue: QueueSender<PointCloudFrame>,
    stats: watch::Sender<ReceiverStats>,
    cancel: CancellationToken,
}

/// Whether the task should keep reading after a message
enum Flow {
    Continue,
    Stop,
}

impl ReceiveTask {
    async fn run<T: MessageTransport>(mut self, mut transport: T) {
        info!("Receiver task started");
        let mut message_count = 0u64;
        let mut error_count = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                info!("Receiver cancelled");
                break;
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Receiver cancelled during read");
                    break;
                }
                result = transport.recv() => result,
            };

            match result {
                Ok(Some(message)) => {
                    message_count += 1;
                    error_count = 0;
                    trace!("Message {}: {} bytes", message_count, message.len());
                    if let Flow::Stop = self.on_message(&message) {
                        break;
                    }
                }
                Ok(None) => {
                    let abandoned = self.assembler.pending_bytes(self.session);
                    self.assembler.close(self.session);
                    info!("Transport closed ({} bytes of partial frame abandoned)", abandoned);
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    error!("Transport error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if error_count >= MAX_ERRORS || !e.is_retryable() {
                        error!("Receiver giving up after transport errors");
                        self.assembler.close(self.session);
                        break;
                    }

                    // 100ms, 200ms, 400ms, ... capped at 1.6s
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        self.queue.close();
        info!("Receiver task ended ({} messages)", message_count);
    }

    fn on_message(&mut self, message: &[u8]) -> Flow {
        let encoded = match self.assembler.on_message(self.session, message) {
            Ok(ChunkEvent::Pending) => return Flow::Continue,
            Ok(ChunkEvent::Complete(encoded)) => encoded,
            Err(e) => {
                warn!("Protocol violation on session {}: {}", self.session, e);
                self.stats.send_modify(|s| s.protocol_violations += 1);
                return Flow::Continue;
            }
        };

        let frame = match self.codec.decode(encoded.as_bytes()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Discarding malformed frame ({} bytes): {}", encoded.len(), e);
                self.stats.send_modify(|s| s.decode_failures += 1);
                return Flow::Continue;
            }
        };

        let points = frame.len();
        match self.queue.push(frame) {
            PushOutcome::Queued => {
                self.stats.send_modify(|s| s.frames_completed += 1);
            }
            PushOutcome::Evicted(_) | PushOutcome::Rejected(_) => {
                self.stats.send_modify(|s| {
                    s.frames_completed += 1;
                    s.frames_dropped += 1;
                });
            }
            PushOutcome::Closed(_) => {
                debug!("Frame consumer dropped, shutting down");
                return Flow::Stop;
            }
        }
        debug!(points, bytes = encoded.len(), "Frame received");
        Flow::Continue
    }
}
