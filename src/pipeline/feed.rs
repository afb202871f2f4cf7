//! Consume-context end of a push-mode pipeline

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::receiver::{Receiver, ReceiverChannels, ReceiverStats};
use crate::config::PipelineConfig;
use crate::queue::QueueReceiver;
use crate::stream::ThrottleExt;
use crate::transport::MessageTransport;
use crate::types::{PointCloudFrame, UpdateRate};
use crate::Result;

type FrameCallback = Box<dyn FnMut(&PointCloudFrame) + Send>;

/// Frames decoded by a [`Receiver`] task, ready for the consumer
///
/// Supports three styles of consumption; pick one per feed:
///
/// - per-tick polling with [`has_frame`](Self::has_frame) / [`take_frame`](Self::take_frame)
/// - callbacks registered with [`on_frame_ready`](Self::on_frame_ready) and run by
///   [`dispatch`](Self::dispatch) from the consumer's own loop
/// - async, via [`next_frame`](Self::next_frame) or [`frames`](Self::frames)
///
/// Dropping the feed stops the receiver task.
pub struct FrameFeed {
    frames: QueueReceiver<PointCloudFrame>,
    stats: watch::Receiver<ReceiverStats>,
    callbacks: Vec<FrameCallback>,
    cancel: CancellationToken,
}

impl FrameFeed {
    /// Spawn a receiver task on `transport` and return its feed.
    pub fn open<T: MessageTransport>(transport: T, config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(Receiver::spawn(transport, config)?))
    }

    pub fn new(channels: ReceiverChannels) -> Self {
        Self {
            frames: channels.frames,
            stats: channels.stats,
            callbacks: Vec::new(),
            cancel: channels.cancel,
        }
    }

    /// Whether a frame can be taken right now
    pub fn has_frame(&self) -> bool {
        self.frames.has_frame()
    }

    /// Take the next frame without waiting.
    pub fn take_frame(&mut self) -> Option<PointCloudFrame> {
        self.frames.try_recv()
    }

    /// Register a callback for [`dispatch`](Self::dispatch).
    pub fn on_frame_ready<F>(&mut self, callback: F)
    where
        F: FnMut(&PointCloudFrame) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Hand every queued frame to the registered callbacks, in order.
    ///
    /// Returns the number of frames dispatched. Never waits; with no frames queued it
    /// returns 0 immediately. Frames are discarded after the callbacks run.
    pub fn dispatch(&mut self) -> usize {
        if self.callbacks.is_empty() {
            return 0;
        }
        let mut dispatched = 0;
        while let Some(frame) = self.frames.try_recv() {
            for callback in &mut self.callbacks {
                callback(&frame);
            }
            dispatched += 1;
        }
        dispatched
    }

    /// Wait for the next frame. `None` once the receiver has stopped and the queue is empty.
    pub async fn next_frame(&mut self) -> Option<PointCloudFrame> {
        self.frames.recv().await
    }

    /// Frames as a stream, optionally rate limited.
    ///
    /// With [`UpdateRate::Max`] frames arriving faster than the rate replace each other and
    /// only the newest is yielded.
    pub fn frames(&mut self, rate: UpdateRate) -> BoxStream<'_, PointCloudFrame> {
        let frames = futures::stream::unfold(&self.frames, |queue| async move {
            queue.recv().await.map(|frame| (frame, queue))
        });

        match rate.throttle_interval() {
            None => frames.boxed(),
            Some(interval) => frames.throttle(interval).boxed(),
        }
    }

    /// Current receiver counters
    pub fn stats(&self) -> ReceiverStats {
        *self.stats.borrow()
    }

    /// Counter updates as a stream, starting with the current value
    pub fn stats_updates(&self) -> impl Stream<Item = ReceiverStats> + 'static {
        WatchStream::new(self.stats.clone())
    }

    /// Whether the receiver has stopped and every frame has been taken
    pub fn is_finished(&self) -> bool {
        self.frames.is_closed() && self.frames.is_empty()
    }

    /// Stop the receiver task. Frames already queued can still be taken.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl From<ReceiverChannels> for FrameFeed {
    fn from(channels: ReceiverChannels) -> Self {
        Self::new(channels)
    }
}

impl Drop for FrameFeed {
    fn drop(&mut self) {
        debug!("Dropping frame feed");
        self.cancel.cancel();
    }
}
