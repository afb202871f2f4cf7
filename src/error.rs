//! Error types for the point-cloud streaming pipeline.
//!
//! Every fallible operation in the crate returns [`StreamError`]. Errors carry enough
//! context to decide whether the pipeline can continue (a single malformed frame is
//! discarded and the session restarts) or whether the caller has to intervene
//! (an invalid configuration is rejected before any work begins).
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: Non-positive voxel size, zero chunk size, bad config files
//! - **Input Errors**: Captured positions and colors that do not line up
//! - **Decode Errors**: Encoded frames whose length does not match their point count
//! - **Protocol Errors**: Chunk streams that violate the session contract
//! - **Transport Errors**: Closed channels and failed sends, surfaced from the transport
//!
//! ## Recovery
//!
//! ```rust
//! use pointstream::StreamError;
//!
//! let error = StreamError::transport_failed("peer went away");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::chunk::SessionId;

/// Result type alias for pipeline operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Invalid configuration for {parameter}: {reason}")]
    InvalidConfiguration { parameter: String, reason: String },

    #[error("Invalid input: {details}")]
    InvalidInput { details: String },

    #[error("Decode error in {context}: {details}")]
    Decode { context: String, details: String },

    #[error("Session {session} mismatch: expected {expected:?} bytes, accumulated {actual}")]
    SessionMismatch { session: SessionId, expected: Option<usize>, actual: usize },

    #[error("Chunk at offset {offset} is indistinguishable from a completion marker")]
    AmbiguousChunk { offset: usize },

    #[error("Channel closed: {context}")]
    ChannelClosed { context: String },

    #[error("Transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Config file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {details}")]
    ConfigParse { details: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },
}

impl StreamError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Transport { .. } => true,
            StreamError::Timeout { .. } => true,
            StreamError::SessionMismatch { .. } => true,
            StreamError::Decode { .. } => true,
            StreamError::InvalidConfiguration { .. } => false,
            StreamError::InvalidInput { .. } => false,
            StreamError::AmbiguousChunk { .. } => false,
            StreamError::ChannelClosed { .. } => false,
            StreamError::ConfigFile { .. } => false,
            StreamError::ConfigParse { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::InvalidConfiguration { .. } => vec![
                "Use a strictly positive voxel size",
                "Use a chunk size larger than the framing overhead",
                "Check density and curvature parameters",
            ],
            StreamError::InvalidInput { .. } => vec![
                "Provide one color per captured position",
                "Check the capture layer output",
            ],
            StreamError::Decode { .. } => vec![
                "Wait for the next frame; the malformed one was discarded",
                "Check that both peers use the same framing mode",
                "Verify position and color scales match on both ends",
            ],
            StreamError::SessionMismatch { .. } => vec![
                "Wait for the next frame; the session was reset",
                "Check that the transport preserves message order",
                "Raise max_frame_size if frames are legitimately large",
            ],
            StreamError::AmbiguousChunk { .. } => vec![
                "Switch to tagged framing",
                "Use a chunk size of at least two bytes",
            ],
            StreamError::ChannelClosed { .. } => vec![
                "Reopen the channel before sending more chunks",
                "Re-establish the transport session",
            ],
            StreamError::Transport { .. } => vec![
                "Check the peer connection state",
                "Retry the send once the channel is open",
                "Reduce max_chunk_size below the transport limit",
            ],
            StreamError::ConfigFile { .. } => vec![
                "Check the config file exists and is readable",
                "Check file permissions",
            ],
            StreamError::ConfigParse { .. } => vec![
                "Check the YAML syntax",
                "Compare field names against PipelineConfig",
            ],
            StreamError::Timeout { .. } => vec![
                "Increase the timeout duration",
                "Check that the producer is still running",
            ],
        }
    }

    /// Helper constructor for configuration errors.
    pub fn invalid_configuration(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        StreamError::InvalidConfiguration { parameter: parameter.into(), reason: reason.into() }
    }

    /// Helper constructor for input errors.
    pub fn invalid_input(details: impl Into<String>) -> Self {
        StreamError::InvalidInput { details: details.into() }
    }

    /// Helper constructor for decode errors.
    pub fn decode_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        StreamError::Decode { context: context.into(), details: details.into() }
    }

    /// Helper constructor for closed channels.
    pub fn channel_closed(context: impl Into<String>) -> Self {
        StreamError::ChannelClosed { context: context.into() }
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        StreamError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for config file errors with path context.
    pub fn config_file_error(path: PathBuf, source: std::io::Error) -> Self {
        StreamError::ConfigFile { path, source }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Transport { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}

impl From<serde_yaml_ng::Error> for StreamError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        StreamError::ConfigParse { details: err.to_string() }
    }
}
