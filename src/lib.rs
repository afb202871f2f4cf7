//! Point-cloud frame streaming over size-limited message transports.
//!
//! Pointstream moves 3D point-cloud frames (position + color per point) from a capture
//! process to a consumer, typically a renderer, over a transport that delivers ordered,
//! reliable messages up to some maximum size.
//!
//! # Features
//!
//! - **Voxel downsampling**: averaging, density-adaptive and surface-aware strategies
//! - **Compact wire format**: 9 bytes per point with i16 positions and u8 colors
//! - **Chunking**: frames of any size over message-limited transports, with an explicit
//!   completion signal
//! - **Backpressure**: bounded push queue or single-flight pull, so a slow consumer never
//!   builds a backlog
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pointstream::{MemoryTransport, PipelineConfig, PointStream, UpdateRate};
//! use pointstream::types::Color;
//! use futures::StreamExt;
//! use glam::Vec3;
//!
//! #[tokio::main]
//! async fn main() -> pointstream::Result<()> {
//!     let config = PipelineConfig::default();
//!     let (tx, rx) = MemoryTransport::pair(config.max_chunk_size, 64);
//!
//!     let mut feed = PointStream::receive(rx, &config)?;
//!     let mut producer = PointStream::producer(tx, &config)?;
//!
//!     let positions = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.5, 0.0, 0.0)];
//!     let colors = vec![Color::rgb(1.0, 0.0, 0.0); 2];
//!     producer.capture_frame(&positions, &colors).await?;
//!
//!     let mut frames = feed.frames(UpdateRate::Max(60));
//!     if let Some(frame) = frames.next().await {
//!         println!("{} points", frame.len());
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Frame processing
pub mod chunk;
pub mod codec;
pub mod downsample;

// Streaming architecture
pub mod pipeline;
pub mod queue;
pub mod stream;
pub mod transport;

// Core exports
pub use config::PipelineConfig;
pub use error::*;
pub use types::*;

// Processing exports
pub use chunk::{Chunk, ChunkAssembler, ChunkEvent, ChunkSplitter, Framing, SessionId};
pub use codec::FrameCodec;
pub use downsample::{DownsampleStrategy, Downsampler, VoxelDownsampler};

// Main API exports
pub use pipeline::{CaptureReport, FrameFeed, Producer, PullClient, PullTick, ReceiverStats};
pub use queue::{PushOutcome, QueuePolicy};
pub use transport::{FrameServer, MemoryTransport, MessageTransport};

use tokio::io::{AsyncRead, AsyncWrite};

/// Unified entry point for both ends of a pipeline.
///
/// Every constructor validates the [`PipelineConfig`] before doing any work, so an
/// invalid voxel size or chunk size fails here rather than on the first frame.
///
/// # Examples
///
/// ## Push mode over a message transport
/// ```rust,no_run
/// use pointstream::{MemoryTransport, PipelineConfig, PointStream};
///
/// #[tokio::main]
/// async fn main() -> pointstream::Result<()> {
///     let config = PipelineConfig::default();
///     let (tx, rx) = MemoryTransport::pair(config.max_chunk_size, 16);
///     let producer = PointStream::producer(tx, &config)?;
///     let feed = PointStream::receive(rx, &config)?;
///     // Use producer and feed...
///     Ok(())
/// }
/// ```
///
/// ## Pull mode over a byte stream
/// ```rust,no_run
/// use pointstream::{PipelineConfig, PointStream, PullTick};
///
/// #[tokio::main]
/// async fn main() -> pointstream::Result<()> {
///     let socket = tokio::io::duplex(64 * 1024).0;
///     let mut client = PointStream::pull(socket, &PipelineConfig::default())?;
///     if let PullTick::Frame(frame) = client.tick() {
///         println!("{} points", frame.len());
///     }
///     Ok(())
/// }
/// ```
pub struct PointStream;

impl PointStream {
    /// Create the sending end for a message transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the chunk size cannot fit the
    /// transport's message limit.
    pub fn producer<T: MessageTransport>(
        transport: T,
        config: &PipelineConfig,
    ) -> Result<Producer<T>> {
        Producer::new(transport, config)
    }

    /// Spawn a receiver on a message transport and return its consumer feed.
    ///
    /// Must be called within a tokio runtime.
    pub fn receive<T: MessageTransport>(
        transport: T,
        config: &PipelineConfig,
    ) -> Result<FrameFeed> {
        FrameFeed::open(transport, config)
    }

    /// Spawn a pull-mode client on a byte stream.
    ///
    /// Must be called within a tokio runtime.
    pub fn pull<S>(io: S, config: &PipelineConfig) -> Result<PullClient>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        PullClient::spawn(io, config)
    }

    /// Create the producer side of the pull protocol on a byte stream.
    pub fn serve<S>(io: S, config: &PipelineConfig) -> Result<FrameServer<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        config.validate()?;
        Ok(FrameServer::new(io, config.codec()?))
    }
}
