//! Run configuration, read once at startup.
//!
//! The descriptor is JSON; every field has a default so a partial file works:
//!
//! ```json
//! {
//!   "binary_path": "/opt/xclbin/nhop.xclbin",
//!   "request_load": 100,
//!   "num_kernels": 2,
//!   "channels_per_kernel": 4,
//!   "mode": "offload"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::StatusCode;
use crate::graph::SizeLimits;

/// Where per-batch hop expansion runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Expansion runs in the host kernel state machine.
    #[default]
    Host,
    /// Batches are handed to a [`BatchExecutor`](crate::executor::BatchExecutor).
    Offload,
}

/// Capacities, in packets, of each kernel's buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferConfig {
    /// Input buffer (dispatch and switching target).
    pub input: usize,
    /// Output buffer (packets leaving the kernel).
    pub output: usize,
    /// Each of the two ping-pong buffers.
    pub ping_pong: usize,
    /// Aggregation buffer.
    pub aggregation: usize,
}

impl BufferConfig {
    /// The same capacity for every buffer.
    pub const fn uniform(capacity: usize) -> Self {
        Self {
            input: capacity,
            output: capacity,
            ping_pong: capacity,
            aggregation: capacity,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::uniform(1 << 20)
    }
}

/// The configuration descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HopConfig {
    /// Accelerator binary; required in [`ExecutionMode::Offload`].
    pub binary_path: Option<PathBuf>,
    /// Requested compute-unit load, percent in `1..=100`.
    pub request_load: u32,
    /// Physical kernels deployed.
    pub num_kernels: usize,
    /// Lanes (channels) per kernel.
    pub channels_per_kernel: usize,
    /// Offset-array byte budget of one channel.
    pub limit_offset_bytes: usize,
    /// Index-array byte budget of one channel.
    pub limit_index_bytes: usize,
    /// Packets taken from the input buffer per round.
    pub batch_size: usize,
    /// Report every device match separately instead of coalescing per pair.
    pub bypass: bool,
    /// Device lanes hold whole-graph copies rather than disjoint shares.
    /// Only valid when the graph fits one kernel.
    pub duplicate: bool,
    /// Host or offloaded expansion.
    pub mode: ExecutionMode,
    /// Per-kernel buffer capacities.
    pub buffers: BufferConfig,
    /// Merged result path; per-kernel dumps get a `_<kernel>` suffix.
    pub output: Option<PathBuf>,
}

impl Default for HopConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            request_load: 100,
            num_kernels: 2,
            channels_per_kernel: 4,
            limit_offset_bytes: 64 << 20,
            limit_index_bytes: 64 << 20,
            batch_size: 32_768,
            bypass: false,
            duplicate: false,
            mode: ExecutionMode::Host,
            buffers: BufferConfig::default(),
            output: None,
        }
    }
}

/// Configuration failures, all detected before any work is dispatched.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The descriptor file does not exist.
    #[error("configuration file {} does not exist", .0.display())]
    FileMissing(PathBuf),
    /// The descriptor could not be read.
    #[error("failed to read configuration {}: {source}", .path.display())]
    Read {
        /// Descriptor path.
        path: PathBuf,
        /// Cause.
        #[source]
        source: std::io::Error,
    },
    /// The descriptor is not valid JSON for [`HopConfig`].
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// Offload mode without an existing accelerator binary.
    #[error("accelerator binary {} does not exist", .0.display())]
    BinaryMissing(PathBuf),
    /// Offload mode without any binary path.
    #[error("offload mode requires binary_path")]
    BinaryUnset,
    /// The compute-unit load is outside `1..=100`.
    #[error("request_load must be within 1..=100 (got {0})")]
    InvalidLoad(u32),
    /// A count that must be positive is zero.
    #[error("{0} must be positive")]
    Zero(&'static str),
    /// Whole-graph lane copies on a graph that spans several kernels.
    #[error("duplicate lanes need a single-kernel layout but the graph spans {0} kernel partitions")]
    DuplicateMultiKernel(usize),
}

impl ConfigError {
    /// Caller-facing status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::FileMissing(_) => StatusCode::ConfigFileMissing,
            Self::BinaryMissing(_) | Self::BinaryUnset => StatusCode::BinaryMissing,
            Self::InvalidLoad(_) => StatusCode::ComputeUnitSetup,
            _ => StatusCode::Failure,
        }
    }
}

impl HopConfig {
    /// Parses a JSON descriptor.
    ///
    /// # Errors
    /// Malformed JSON or unknown fields.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON descriptor.
    ///
    /// # Errors
    /// [`ConfigError::FileMissing`] if `path` does not exist, otherwise read or
    /// parse failures.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileMissing(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Checks value ranges. Does not touch the filesystem.
    ///
    /// # Errors
    /// The first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.request_load) {
            return Err(ConfigError::InvalidLoad(self.request_load));
        }
        let counts = [
            ("num_kernels", self.num_kernels),
            ("channels_per_kernel", self.channels_per_kernel),
            ("limit_offset_bytes", self.limit_offset_bytes),
            ("limit_index_bytes", self.limit_index_bytes),
            ("batch_size", self.batch_size),
            ("buffers.input", self.buffers.input),
            ("buffers.output", self.buffers.output),
            ("buffers.ping_pong", self.buffers.ping_pong),
            ("buffers.aggregation", self.buffers.aggregation),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Zero(name));
        }
        Ok(())
    }

    /// Checks that the accelerator binary exists when offloading.
    ///
    /// # Errors
    /// [`ConfigError::BinaryUnset`] or [`ConfigError::BinaryMissing`].
    pub fn check_binary(&self) -> Result<(), ConfigError> {
        if self.mode != ExecutionMode::Offload {
            return Ok(());
        }
        match &self.binary_path {
            None => Err(ConfigError::BinaryUnset),
            Some(p) if !p.exists() => Err(ConfigError::BinaryMissing(p.clone())),
            Some(_) => Ok(()),
        }
    }

    /// Channel byte budgets.
    pub fn limits(&self) -> SizeLimits {
        SizeLimits::new(self.limit_offset_bytes, self.limit_index_bytes)
    }
}
