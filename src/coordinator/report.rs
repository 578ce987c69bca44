//! Serializable run and buffer reports.

use serde::Serialize;

use crate::graph::Layout;
use crate::kernel::{BufferStatus, HopStats};

/// Buffer occupancy of every kernel at one point of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferReport {
    /// Round the snapshot was taken in.
    pub round: usize,
    /// One entry per physical kernel.
    pub kernels: Vec<KernelBuffers>,
}

/// Buffer occupancy of one kernel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelBuffers {
    /// Physical kernel index.
    pub kernel: usize,
    /// Input, ping, pong, output and aggregation buffers, in that order.
    pub buffers: [BufferStatus; 5],
}

impl BufferReport {
    /// Highest occupancy ratio of any buffer.
    pub fn peak_ratio(&self) -> f64 {
        self.kernels
            .iter()
            .flat_map(|k| k.buffers.iter())
            .map(|b| b.ratio_used)
            .fold(0.0, f64::max)
    }
}

/// Per-kernel outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelSummary {
    /// Physical kernel index.
    pub kernel: usize,
    /// Kernel partition served.
    pub partition: usize,
    /// Records in the aggregation buffer.
    pub aggregation_records: usize,
    /// Counters.
    pub stats: HopStats,
}

/// Outcome of [`Coordinator::run`](super::Coordinator::run).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Rounds in which at least one kernel worked.
    pub rounds: usize,
    /// Graph vertices.
    pub node_count: usize,
    /// Graph edges.
    pub edge_count: usize,
    /// Channel partitions deployed.
    pub channel_partitions: usize,
    /// Distinct kernel partitions.
    pub kernel_partitions: usize,
    /// Physical kernels.
    pub num_kernels: usize,
    /// Whether the graph fits one kernel.
    #[serde(serialize_with = "serialize_layout")]
    pub layout: Layout,
    /// Distinct `(src, des)` pairs with a path.
    pub matched_pairs: usize,
    /// Paths counted over all pairs.
    pub total_paths: u64,
    /// Adjacency entries read by host expansion, summed over kernels.
    pub edge_accesses: u64,
    /// Counters summed over kernels.
    pub totals: HopStats,
    /// Per-kernel breakdown.
    pub kernels: Vec<KernelSummary>,
}

fn serialize_layout<S: serde::Serializer>(layout: &Layout, s: S) -> Result<S::Ok, S::Error> {
    match layout {
        Layout::SingleKernel { divisor } => s.collect_str(&format_args!("single-kernel/{divisor}")),
        Layout::MultiKernel => s.serialize_str("multi-kernel"),
    }
}
