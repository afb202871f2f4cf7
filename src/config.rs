//! Pipeline configuration
//!
//! All knobs live in one [`PipelineConfig`] that can be built in code or loaded from YAML.
//! Missing fields take their defaults, so a config file only needs the values it changes:
//!
//! ```yaml
//! voxel_size: 0.01
//! strategy:
//!   mode: density_adaptive
//!   min_points_threshold: 3
//!   density_factor: 1.5
//! max_chunk_size: 65536
//! ```
//!
//! Every entry point validates the config before any work starts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::chunk::{ChunkAssembler, ChunkSplitter, Framing};
use crate::codec::{COUNT_SIZE, DEFAULT_COLOR_SCALE, DEFAULT_POSITION_SCALE, FrameCodec};
use crate::downsample::{DownsampleStrategy, VoxelDownsampler};
use crate::queue::QueuePolicy;
use crate::{Result, StreamError};

pub const DEFAULT_VOXEL_SIZE: f32 = 0.005;
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 250_000;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Settings shared by the producer and the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Edge length of a downsampling voxel, in position units
    pub voxel_size: f32,
    pub strategy: DownsampleStrategy,
    /// Upper bound on every transport message, framing included
    pub max_chunk_size: usize,
    pub framing: Framing,
    pub position_scale: f32,
    pub color_scale: f32,
    /// Largest encoded frame a receiver will buffer
    pub max_frame_size: usize,
    pub queue_capacity: usize,
    pub queue_policy: QueuePolicy,
    /// Pull mode only: give up on a frame request after this many milliseconds
    pub request_timeout_ms: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            voxel_size: DEFAULT_VOXEL_SIZE,
            strategy: DownsampleStrategy::Average,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            framing: Framing::Tagged,
            position_scale: DEFAULT_POSITION_SCALE,
            color_scale: DEFAULT_COLOR_SCALE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            queue_capacity: 1,
            queue_policy: QueuePolicy::KeepLatest,
            request_timeout_ms: None,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| StreamError::config_file_error(path.to_path_buf(), e))?;
        let config = Self::from_yaml_str(&yaml)?;
        debug!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Check every parameter, reporting the first invalid one.
    pub fn validate(&self) -> Result<()> {
        self.downsampler()?;
        self.codec()?;
        self.splitter()?;

        if self.max_frame_size < COUNT_SIZE {
            return Err(StreamError::invalid_configuration(
                "max_frame_size",
                format!(
                    "must hold at least the {COUNT_SIZE} byte header, got {}",
                    self.max_frame_size
                ),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(StreamError::invalid_configuration("queue_capacity", "must be non-zero"));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(StreamError::invalid_configuration(
                "request_timeout_ms",
                "must be non-zero when set",
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn downsampler(&self) -> Result<VoxelDownsampler> {
        VoxelDownsampler::new(self.voxel_size, self.strategy)
    }

    pub fn codec(&self) -> Result<FrameCodec> {
        FrameCodec::new(self.position_scale, self.color_scale)
    }

    pub fn splitter(&self) -> Result<ChunkSplitter> {
        ChunkSplitter::new(self.max_chunk_size, self.framing)
    }

    pub fn assembler(&self) -> ChunkAssembler {
        ChunkAssembler::new(self.framing, self.max_frame_size)
    }

    pub fn with_voxel_size(mut self, voxel_size: f32) -> Self {
        self.voxel_size = voxel_size;
        self
    }

    pub fn with_strategy(mut self, strategy: DownsampleStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_queue(mut self, capacity: usize, policy: QueuePolicy) -> Self {
        self.queue_capacity = capacity;
        self.queue_policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}
