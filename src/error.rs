//! Error types and caller-facing status codes.
//!
//! Every failure in the engine is terminal for the run: nothing here is retried.
//! [`HopError::status_code`] folds each condition onto the small negative codes
//! the external caller understands.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::coordinator::BufferReport;
use crate::executor::{wire::WireError, ExecutorError};
use crate::io::PersistError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HopError>;

/// Status codes surfaced to the external caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    /// Run completed.
    Success = 0,
    /// Any fatal condition without a dedicated code.
    Failure = -1,
    /// The configuration descriptor does not exist.
    ConfigFileMissing = -2,
    /// The accelerator binary named by the configuration does not exist.
    BinaryMissing = -3,
    /// Fewer kernels configured than the graph needs.
    InsufficientDevices = -6,
    /// The compute-unit request could not be honored.
    ComputeUnitSetup = -7,
    /// Buffer allocation failed.
    AllocationFailed = -8,
}

impl StatusCode {
    /// The raw integer handed to the caller.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Malformed CSR input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// `offsets` must hold at least one element (`NV + 1`).
    #[error("offsets must have length NV + 1 (got an empty array)")]
    EmptyOffsets,
    /// `offsets[0]` must be zero.
    #[error("offsets must start at 0 (got {0})")]
    FirstOffsetNonZero(u64),
    /// `offsets` decreased between two positions.
    #[error("offsets must be non-decreasing (offset[{position}] > offset[{}])", .position + 1)]
    OffsetsNotMonotone {
        /// Position of the larger element.
        position: usize,
    },
    /// `offsets[NV]` disagrees with the index length.
    #[error("offsets end at {expected} but the index array holds {actual} edges")]
    EdgeCountMismatch {
        /// `offsets[NV]`.
        expected: u64,
        /// `index.len()`.
        actual: usize,
    },
    /// A neighbor id is not a vertex of the graph.
    #[error("edge {vertex}->{neighbor} is out of bounds for NV={node_count}")]
    NeighborOutOfBounds {
        /// Source vertex of the edge.
        vertex: usize,
        /// Offending neighbor id.
        neighbor: u64,
        /// Vertex count.
        node_count: usize,
    },
    /// The weight array does not match the edge count.
    #[error("weight array holds {actual} entries, expected {expected}")]
    WeightCountMismatch {
        /// Edge count.
        expected: usize,
        /// Weight count.
        actual: usize,
    },
    /// A value does not fit the element type.
    #[error("value {0} does not fit the graph element type")]
    IndexOverflow(u64),
    /// A vertex range lies outside the graph.
    #[error("vertex range [{v_start}, {v_end}) lies outside the graph (NV={node_count})")]
    RangeOutOfBounds {
        /// Range start.
        v_start: usize,
        /// Exclusive range end.
        v_end: usize,
        /// Vertex count.
        node_count: usize,
    },
}

/// Failure to split a graph into bounded partitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    /// Zero partitions were requested.
    #[error("the number of partitions must be positive")]
    ZeroPartitions,
    /// Zero channels per kernel were requested.
    #[error("the number of channels per kernel must be positive")]
    ZeroChannels,
    /// The source graph holds no offsets.
    #[error("the source graph is not initialized")]
    Uninitialized,
    /// The byte limits cannot hold even one vertex.
    #[error(
        "limits of {offset_bytes} offset bytes and {index_bytes} index bytes cannot hold one vertex of {element_bytes}-byte elements"
    )]
    LimitTooSmall {
        /// Offset array limit in bytes.
        offset_bytes: usize,
        /// Index array limit in bytes.
        index_bytes: usize,
        /// Element width in bytes.
        element_bytes: usize,
    },
    /// A single adjacency list exceeds the index limit.
    #[error("vertex {vertex} has degree {degree}, above the per-partition edge limit {max_edges}")]
    VertexTooLarge {
        /// The vertex that cannot be placed.
        vertex: usize,
        /// Its out-degree.
        degree: usize,
        /// Edge capacity of one partition.
        max_edges: usize,
    },
    /// A partition view could not be built.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Malformed or exhausted dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The table has no partitions.
    #[error("dispatch table is empty")]
    EmptyTable,
    /// `start_vertex` is not sorted.
    #[error("start vertices must be ascending (position {position})")]
    Unsorted {
        /// First out-of-order position.
        position: usize,
    },
    /// A partition declared zero replicas.
    #[error("partition {partition} has zero copies")]
    ZeroCopies {
        /// Logical partition.
        partition: usize,
    },
    /// The rotation register left `[0, copies)`.
    #[error("round-robin state {state} of partition {partition} is outside [0, {copies})")]
    RotationState {
        /// Logical partition.
        partition: usize,
        /// Current register value.
        state: usize,
        /// Replica count.
        copies: usize,
    },
}

/// A push that would exceed the buffer capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("buffer full: {len} of {capacity} slots used, {incoming} incoming")]
pub struct BufferFull {
    /// Buffer capacity.
    pub capacity: usize,
    /// Occupancy at the time of the push.
    pub len: usize,
    /// Packets the producer tried to add.
    pub incoming: usize,
}

/// Backing storage for a buffer could not be reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("failed to allocate a buffer of {capacity} slots")]
pub struct AllocationError {
    /// Requested capacity.
    pub capacity: usize,
}

/// A vertex looked up in a channel that does not own it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("vertex {vertex} is outside the channel range [{v_start}, {v_end})")]
pub struct RangeError {
    /// The vertex.
    pub vertex: u64,
    /// Channel range start.
    pub v_start: usize,
    /// Channel exclusive range end.
    pub v_end: usize,
}

/// The buffer stage a packet was being written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Kernel input buffer.
    Input,
    /// Kernel output (switch) buffer.
    Output,
    /// First ping-pong buffer.
    Ping,
    /// Second ping-pong buffer.
    Pong,
    /// Aggregation buffer.
    Aggregation,
}

impl Stage {
    /// The ping-pong stage with the given parity.
    pub const fn ping_pong(parity: usize) -> Self {
        if parity & 1 == 0 {
            Self::Ping
        } else {
            Self::Pong
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "in",
            Self::Output => "out",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Aggregation => "agg",
        })
    }
}

/// Top-level error for a partitioned hop run.
#[derive(Debug, Error)]
pub enum HopError {
    /// Invalid or missing configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Malformed graph.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Partitioning failed.
    #[error(transparent)]
    Partition(#[from] PartitionError),
    /// Dispatch table failure.
    #[error("dispatch failed{}: {source}", kernel_suffix(.kernel))]
    Dispatch {
        /// Kernel whose table failed, `None` for the coordinator table.
        kernel: Option<usize>,
        /// Cause.
        #[source]
        source: DispatchError,
    },
    /// A producer found its destination buffer full.
    #[error("kernel {kernel} {stage} buffer overflow in round {round}: {source}")]
    BufferFull {
        /// Kernel owning the full buffer.
        kernel: usize,
        /// Round in which the overflow happened.
        round: usize,
        /// Which buffer.
        stage: Stage,
        /// Occupancy details.
        #[source]
        source: BufferFull,
        /// Buffer occupancy at the time of the overflow. Errors raised by the
        /// coordinator cover every kernel.
        report: Box<BufferReport>,
    },
    /// Buffer allocation failed at deployment.
    #[error("kernel {kernel} {stage} buffer: {source}")]
    Allocation {
        /// Kernel being built.
        kernel: usize,
        /// Which buffer.
        stage: Stage,
        /// Cause.
        #[source]
        source: AllocationError,
    },
    /// A frontier vertex reached a lane that does not own it.
    #[error("kernel {kernel} lane {lane}: {source}")]
    VertexOutOfRange {
        /// Kernel.
        kernel: usize,
        /// Lane selected by the intra-kernel table.
        lane: usize,
        /// Range details.
        #[source]
        source: RangeError,
    },
    /// The intra-kernel table selected a lane the kernel does not have.
    #[error("kernel {kernel} selected lane {lane} but owns {lanes} lanes")]
    MissingLane {
        /// Kernel.
        kernel: usize,
        /// Selected lane.
        lane: usize,
        /// Lanes present.
        lanes: usize,
    },
    /// A packet was routed to a kernel that does not exist.
    #[error("packet routed to kernel {kernel} but only {kernels} kernels are deployed")]
    MissingKernel {
        /// Routed kernel index.
        kernel: usize,
        /// Deployed kernels.
        kernels: usize,
    },
    /// The graph needs more kernels than were configured.
    #[error("graph needs {required} kernels but only {available} are configured")]
    InsufficientDevices {
        /// Kernel partitions the graph spans.
        required: usize,
        /// Configured kernels.
        available: usize,
    },
    /// The accelerator rejected a batch.
    #[error("kernel {kernel} batch in round {round} failed: {source}")]
    Executor {
        /// Kernel issuing the batch.
        kernel: usize,
        /// Round.
        round: usize,
        /// Device status.
        #[source]
        source: ExecutorError,
    },
    /// Packet serialization failed.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// Result persistence failed.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

fn kernel_suffix(kernel: &Option<usize>) -> String {
    kernel.map(|k| format!(" in kernel {k}")).unwrap_or_default()
}

impl HopError {
    /// Maps the error onto the caller-facing status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config(e) => e.status_code(),
            Self::InsufficientDevices { .. } => StatusCode::InsufficientDevices,
            Self::Allocation { .. } | Self::BufferFull { .. } => StatusCode::AllocationFailed,
            _ => StatusCode::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_caller_contract() {
        assert_eq!(StatusCode::ConfigFileMissing.code(), -2);
        assert_eq!(StatusCode::BinaryMissing.code(), -3);
        assert_eq!(StatusCode::InsufficientDevices.code(), -6);
        assert_eq!(StatusCode::ComputeUnitSetup.code(), -7);
        assert_eq!(StatusCode::AllocationFailed.code(), -8);
    }

    #[test]
    fn hop_error_status_mapping() {
        let e = HopError::InsufficientDevices { required: 3, available: 2 };
        assert_eq!(e.status_code(), StatusCode::InsufficientDevices);

        let e = HopError::Allocation {
            kernel: 0,
            stage: Stage::Input,
            source: AllocationError { capacity: usize::MAX },
        };
        assert_eq!(e.status_code(), StatusCode::AllocationFailed);

        let e = HopError::BufferFull {
            kernel: 1,
            round: 4,
            stage: Stage::Output,
            source: BufferFull { capacity: 8, len: 8, incoming: 1 },
            report: Box::new(BufferReport { round: 4, kernels: Vec::new() }),
        };
        assert_eq!(e.status_code(), StatusCode::AllocationFailed);
        assert_eq!(
            e.to_string(),
            "kernel 1 out buffer overflow in round 4: buffer full: 8 of 8 slots used, 1 incoming"
        );

        let e = HopError::Dispatch { kernel: None, source: DispatchError::EmptyTable };
        assert_eq!(e.status_code(), StatusCode::Failure);
        assert_eq!(e.to_string(), "dispatch failed: dispatch table is empty");
    }

    #[test]
    fn stage_display_and_parity() {
        assert_eq!(Stage::ping_pong(0), Stage::Ping);
        assert_eq!(Stage::ping_pong(3), Stage::Pong);
        assert_eq!(Stage::Aggregation.to_string(), "agg");
    }
}
