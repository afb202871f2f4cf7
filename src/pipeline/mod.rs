//! Producer and consumer ends of the streaming pipeline
//!
//! Send path: [`Producer`] downsamples, encodes, splits and sends each captured frame.
//!
//! Receive path, push mode: [`Receiver::spawn`] starts a task that owns the transport and
//! the chunk assembler, decodes completed frames and hands them to a bounded queue.
//! [`FrameFeed`] is the consume-context end of that queue.
//!
//! Receive path, pull mode: [`PullClient`] asks a byte-stream producer for one frame at a
//! time and never has more than one request outstanding.

mod feed;
mod producer;
mod pull;
mod receiver;

pub use feed::FrameFeed;
pub use producer::{CaptureReport, Producer};
pub use pull::{PullClient, PullTick};
pub use receiver::{Receiver, ReceiverChannels, ReceiverStats};
