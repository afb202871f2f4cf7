//! In-process transport over tokio channels

use tokio::sync::mpsc;
use tracing::trace;

use super::MessageTransport;
use crate::{Result, StreamError};

/// One end of an in-process message channel
#[derive(Debug)]
pub struct MemoryTransport {
    outbound: mpsc::Sender<Vec<u8>>,
    inbound: mpsc::Receiver<Vec<u8>>,
    max_message_size: usize,
}

impl MemoryTransport {
    /// Create two connected ends. `capacity` bounds the messages buffered per direction.
    pub fn pair(max_message_size: usize, capacity: usize) -> (Self, Self) {
        let capacity = capacity.max(1);
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (
            Self { outbound: a_tx, inbound: a_rx, max_message_size },
            Self { outbound: b_tx, inbound: b_rx, max_message_size },
        )
    }
}

#[async_trait::async_trait]
impl MessageTransport for MemoryTransport {
    async fn send(&mut self, message: Vec<u8>) -> Result<()> {
        if message.len() > self.max_message_size {
            return Err(StreamError::invalid_input(format!(
                "Message of {} bytes exceeds transport limit of {}",
                message.len(),
                self.max_message_size
            )));
        }
        trace!("Sending {} byte message", message.len());
        self.outbound
            .send(message)
            .await
            .map_err(|_| StreamError::channel_closed("memory transport peer dropped"))
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.inbound.recv().await)
    }

    fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}
