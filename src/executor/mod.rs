//! The accelerator boundary.
//!
//! A kernel in [`ExecutionMode::Offload`](crate::config::ExecutionMode) hands
//! each batch to a [`BatchExecutor`]: packed query records in, packed local
//! (aggregate) and switch records out. Device drivers implement the trait;
//! [`ReferenceExecutor`] walks the CSR in memory with the same contract.

pub mod reference;
pub mod wire;

use thiserror::Error;

use crate::channel::Channel;
use crate::graph::GraphIndex;

pub use reference::ReferenceExecutor;

/// One batch handed to the accelerator.
#[derive(Debug)]
pub struct BatchRequest<'a, T> {
    /// Physical kernel issuing the batch.
    pub kernel: usize,
    /// `[v_start, v_end]` of every lane, lane-major.
    pub offset_table: Vec<T>,
    /// `[e_start, e_end]` of every lane, lane-major.
    pub index_table: Vec<T>,
    /// The kernel's lanes.
    pub channels: &'a [Channel<T>],
    /// Packed [`wire::WireRecord`]s.
    pub pairs: Vec<u8>,
    /// Records in `pairs`.
    pub pair_count: usize,
    /// Configured batch size.
    pub batch_size: usize,
    /// Hop limit.
    pub num_hops: u32,
    /// Report every match separately.
    pub bypass: bool,
    /// Lanes hold whole-graph copies.
    pub duplicate: bool,
}

/// Device output for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResponse {
    /// Packed match records. Unless bypassed, `idx` carries the match count.
    pub local: Vec<u8>,
    /// Packed records owned by other kernels.
    pub switch: Vec<u8>,
    /// Records in `local`.
    pub local_count: usize,
    /// Records in `switch`.
    pub switch_count: usize,
}

/// A batch the device rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("device returned status {status}: {message}")]
pub struct ExecutorError {
    /// Negative device status.
    pub status: i32,
    /// Driver message.
    pub message: String,
}

impl ExecutorError {
    /// Creates an error with a status and message.
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Runs hop batches on an accelerator.
///
/// Each kernel keeps at most one batch in flight, so implementations may
/// block until the device finishes.
pub trait BatchExecutor<T: GraphIndex>: Send + Sync {
    /// Executes one batch.
    ///
    /// # Errors
    /// Any negative device status.
    fn run_batch(&self, request: &BatchRequest<'_, T>) -> Result<BatchResponse, ExecutorError>;
}
