//! Transports that carry chunk messages between producer and receiver

mod memory;
pub mod stream;

pub use memory::MemoryTransport;
pub use stream::{FrameServer, REQUEST_BYTE, request_frame, request_frame_within, serve_frame};

use crate::Result;

/// Ordered, reliable byte-message channel with a maximum message size
///
/// Implementations are expected to deliver every message exactly once and in order.
/// Retransmission and reordering are the transport's business; the chunk layer above
/// assumes they already happened.
#[async_trait::async_trait]
pub trait MessageTransport: Send + 'static {
    /// Send one message
    ///
    /// Messages longer than [`max_message_size`](Self::max_message_size) are refused.
    async fn send(&mut self, message: Vec<u8>) -> Result<()>;

    /// Receive the next message
    ///
    /// Returns:
    /// - `Ok(Some(message))` - Next message in order
    /// - `Ok(None)` - Channel closed by the peer
    /// - `Err(e)` - Transport failure
    async fn recv(&mut self) -> Result<Option<Vec<u8>>>;

    /// Largest message this transport accepts, in bytes
    fn max_message_size(&self) -> usize;
}
