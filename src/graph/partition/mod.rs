//! Size-bounded CSR partitioning and deployment sizing.
//!
//! Channels hold at most `limit_offset_bytes` of offsets and
//! `limit_index_bytes` of neighbor ids. [`partition`] walks the vertex range,
//! aiming for an even split and shrinking each boundary until both arrays fit.
//! [`plan_deployment`] decides how many kernels the graph spans.
//!
//! | Operation | Complexity | Notes |
//! |-----------|------------|-------|
//! | `partition` | \(O(NV)\) worst case | one shrink step per rejected vertex |
//! | `partition_fixed` | \(O(p)\) | no size checks |
//! | `plan_deployment` | \(O(k \cdot NV)\) | re-partitions while the estimate is short |

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::PartitionError;
use crate::graph::{CsrGraph, CsrPartition, GraphIndex};

/// Byte budgets of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    /// Maximum bytes of a channel's offset array (`(nv + 1) * elem`).
    pub offset_bytes: usize,
    /// Maximum bytes of a channel's index array (`ne * elem`).
    pub index_bytes: usize,
}

impl SizeLimits {
    /// Creates limits from byte budgets.
    pub const fn new(offset_bytes: usize, index_bytes: usize) -> Self {
        Self {
            offset_bytes,
            index_bytes,
        }
    }

    /// Limits large enough for any graph.
    pub const fn unbounded() -> Self {
        Self::new(usize::MAX, usize::MAX)
    }

    /// Most vertices one channel can hold.
    pub const fn max_vertices(self, element_bytes: usize) -> usize {
        (self.offset_bytes / element_bytes).saturating_sub(1)
    }

    /// Most edges one channel can hold.
    pub const fn max_edges(self, element_bytes: usize) -> usize {
        self.index_bytes / element_bytes
    }

    /// Whether a partition view fits both budgets.
    pub fn fits<T: GraphIndex>(self, part: &CsrPartition<T>) -> bool {
        part.offset_bytes() <= self.offset_bytes && part.index_bytes() <= self.index_bytes
    }

    fn checked<T: GraphIndex>(self) -> Result<(usize, usize), PartitionError> {
        let max_v = self.max_vertices(T::BYTES);
        let max_e = self.max_edges(T::BYTES);
        if max_v == 0 {
            return Err(PartitionError::LimitTooSmall {
                offset_bytes: self.offset_bytes,
                index_bytes: self.index_bytes,
                element_bytes: T::BYTES,
            });
        }
        Ok((max_v, max_e))
    }
}

/// Returns the exclusive end of the partition starting at `v_start`.
fn find_segment_point<T: GraphIndex>(
    graph: &CsrGraph<T>,
    num_partitions: usize,
    max_vertices: usize,
    max_edges: usize,
    v_start: usize,
) -> Result<usize, PartitionError> {
    let nv = graph.node_count();
    let nv_ref = nv.div_ceil(num_partitions).clamp(1, max_vertices);

    let mut v_end = (v_start + nv_ref).min(nv);
    let e_start = graph.offset(v_start);
    while graph.offset(v_end) - e_start > max_edges {
        v_end -= 1;
        if v_end == v_start {
            return Err(PartitionError::VertexTooLarge {
                vertex: v_start,
                degree: graph.degree(v_start),
                max_edges,
            });
        }
    }
    Ok(v_end)
}

/// Splits `graph` into contiguous partitions that fit `limits`.
///
/// The target size is `ceil(NV / num_partitions)` vertices; each boundary is
/// pulled back one vertex at a time while the edge span is too large, so the
/// realized count may exceed `num_partitions`. An empty graph yields one empty
/// partition.
///
/// # Errors
/// - `num_partitions == 0` or an uninitialized graph
/// - limits too small for one vertex, or one adjacency list above the edge limit
pub fn partition<T: GraphIndex>(
    graph: &Arc<CsrGraph<T>>,
    num_partitions: usize,
    limits: SizeLimits,
) -> Result<Vec<CsrPartition<T>>, PartitionError> {
    if num_partitions == 0 {
        return Err(PartitionError::ZeroPartitions);
    }
    if !graph.is_initialized() {
        return Err(PartitionError::Uninitialized);
    }
    let (max_v, max_e) = limits.checked::<T>()?;

    let nv = graph.node_count();
    let mut parts = Vec::with_capacity(num_partitions);
    let mut v_start = 0;
    loop {
        let v_end = if nv == 0 {
            0
        } else {
            find_segment_point(graph, num_partitions, max_v, max_e, v_start)?
        };
        parts.push(CsrPartition::new(Arc::clone(graph), v_start, v_end)?);
        v_start = v_end;
        if v_start == nv {
            break;
        }
    }
    Ok(parts)
}

/// Splits `graph` into `ceil(NV / share)`-sized shares with no size checks.
///
/// Used when the whole graph fits one kernel and only intra-kernel load
/// spreading is needed. Yields at most `num_partitions` partitions.
///
/// # Errors
/// `num_partitions == 0` or an uninitialized graph.
pub fn partition_fixed<T: GraphIndex>(
    graph: &Arc<CsrGraph<T>>,
    num_partitions: usize,
) -> Result<Vec<CsrPartition<T>>, PartitionError> {
    if num_partitions == 0 {
        return Err(PartitionError::ZeroPartitions);
    }
    if !graph.is_initialized() {
        return Err(PartitionError::Uninitialized);
    }

    let nv = graph.node_count();
    let share = nv.div_ceil(num_partitions).max(1);
    let mut parts = Vec::with_capacity(num_partitions);
    let mut v_start = 0;
    loop {
        let v_end = (v_start + share).min(nv);
        parts.push(CsrPartition::new(Arc::clone(graph), v_start, v_end)?);
        v_start = v_end;
        if v_start == nv {
            break;
        }
    }
    Ok(parts)
}

/// How the channel partitions map onto kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// The graph fits one kernel; `divisor` partitions are replicated across
    /// the kernel's lanes.
    SingleKernel {
        /// Divisor of `channels_per_kernel` used for the even split.
        divisor: usize,
    },
    /// The graph spans several kernels.
    MultiKernel,
}

/// Channel partitions grouped into kernel partitions.
#[derive(Debug, Clone)]
pub struct DeploymentPlan<T> {
    /// Channel partitions, ascending by vertex range.
    pub partitions: Vec<CsrPartition<T>>,
    /// Lanes per kernel.
    pub channels_per_kernel: usize,
    /// Distinct kernel partitions (`ceil(partitions / channels_per_kernel)`).
    pub kernel_partitions: usize,
    /// Channels the byte limits call for before any rounding.
    pub channels_needed: usize,
    /// Single or multi-kernel layout.
    pub layout: Layout,
    /// The limits the partitions honor.
    pub limits: SizeLimits,
}

impl<T: GraphIndex> DeploymentPlan<T> {
    /// Channel partitions owned by kernel partition `k`.
    pub fn kernel_slice(&self, k: usize) -> &[CsrPartition<T>] {
        let start = (k * self.channels_per_kernel).min(self.partitions.len());
        let end = (start + self.channels_per_kernel).min(self.partitions.len());
        &self.partitions[start..end]
    }

    /// Global channel-partition id of the first partition of kernel partition `k`.
    pub fn first_channel_of(&self, k: usize) -> usize {
        k * self.channels_per_kernel
    }
}

/// Sizes a deployment for `graph` on kernels with `channels_per_kernel` lanes.
///
/// `channels_needed = max(ceil(NV*elem / offset_limit), ceil(NE*elem / index_limit))`.
/// When that reaches a whole kernel, partitions with
/// `kernels * channels_per_kernel` targets and adds kernels until the realized
/// count fits. Otherwise picks the smallest divisor of `channels_per_kernel`
/// covering the graph so replication stays uniform, falling back to the
/// multi-kernel path if no even split fits the limits.
///
/// # Errors
/// `channels_per_kernel == 0`, an uninitialized graph, or a limit violation
/// reported by [`partition`].
pub fn plan_deployment<T: GraphIndex>(
    graph: &Arc<CsrGraph<T>>,
    channels_per_kernel: usize,
    limits: SizeLimits,
) -> Result<DeploymentPlan<T>, PartitionError> {
    if channels_per_kernel == 0 {
        return Err(PartitionError::ZeroChannels);
    }
    if !graph.is_initialized() {
        return Err(PartitionError::Uninitialized);
    }
    limits.checked::<T>()?;

    let nv_bytes = graph.node_count().saturating_mul(T::BYTES);
    let ne_bytes = graph.edge_count().saturating_mul(T::BYTES);
    let cover_nv = nv_bytes.div_ceil(limits.offset_bytes);
    let cover_ne = ne_bytes.div_ceil(limits.index_bytes.max(1));
    let channels_needed = cover_nv.max(cover_ne).max(1);
    debug!(
        nv = graph.node_count(),
        ne = graph.edge_count(),
        cover_nv,
        cover_ne,
        channels_needed,
        "sizing deployment"
    );

    if channels_needed < channels_per_kernel {
        for divisor in channels_needed..=channels_per_kernel {
            if channels_per_kernel % divisor != 0 {
                continue;
            }
            let partitions = partition_fixed(graph, divisor)?;
            if partitions.iter().all(|p| limits.fits(p)) {
                info!(divisor, partitions = partitions.len(), "graph fits one kernel");
                return Ok(DeploymentPlan {
                    partitions,
                    channels_per_kernel,
                    kernel_partitions: 1,
                    channels_needed,
                    layout: Layout::SingleKernel { divisor },
                    limits,
                });
            }
            debug!(divisor, "even split breaks the byte limits");
        }
        debug!("no divisor fits, sizing as a multi-kernel graph");
    }

    let mut kernels = channels_needed.div_ceil(channels_per_kernel).max(1);
    info!(kernels, channels = kernels * channels_per_kernel, "estimated kernels to cover graph");
    let mut partitions = partition(graph, kernels * channels_per_kernel, limits)?;
    while partitions.len() > kernels * channels_per_kernel {
        kernels += 1;
        partitions = partition(graph, kernels * channels_per_kernel, limits)?;
    }
    let kernel_partitions = partitions.len().div_ceil(channels_per_kernel);
    info!(
        kernel_partitions,
        channel_partitions = partitions.len(),
        "minimal kernels to cover graph"
    );

    Ok(DeploymentPlan {
        partitions,
        channels_per_kernel,
        kernel_partitions,
        channels_needed,
        layout: Layout::MultiKernel,
        limits,
    })
}

#[cfg(test)]
mod tests;
