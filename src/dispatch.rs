//! Vertex-to-partition dispatch with round-robin replica selection.
//!
//! A table maps a vertex to the logical partition whose range owns it. When a
//! logical partition has `k > 1` physical replicas, repeated lookups rotate
//! through them strictly in order: replica `r` of partition `i` has physical
//! index `r * len + i`.
//!
//! The rotation register is mutated by every [`DispatchTable::select`] call,
//! so each owner (the coordinator, every kernel) keeps its own table.

use tracing::trace;

use crate::error::DispatchError;
use crate::graph::{CsrPartition, GraphIndex};

/// Start vertices, replica counts and rotation state, indexed by logical partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTable<T> {
    start_vertex: Vec<T>,
    copy_count: Vec<usize>,
    round_robin_state: Vec<usize>,
}

impl<T: GraphIndex> DispatchTable<T> {
    /// Builds a table from parallel start-vertex and copy-count arrays.
    ///
    /// # Errors
    /// Empty input, unsorted starts, mismatched lengths or a zero copy count.
    pub fn from_parts(start_vertex: Vec<T>, copy_count: Vec<usize>) -> Result<Self, DispatchError> {
        if start_vertex.is_empty() || start_vertex.len() != copy_count.len() {
            return Err(DispatchError::EmptyTable);
        }
        if let Some(w) = start_vertex.windows(2).position(|w| w[0] > w[1]) {
            return Err(DispatchError::Unsorted { position: w + 1 });
        }
        if let Some(partition) = copy_count.iter().position(|&c| c == 0) {
            return Err(DispatchError::ZeroCopies { partition });
        }
        let round_robin_state = vec![0; start_vertex.len()];
        Ok(Self {
            start_vertex,
            copy_count,
            round_robin_state,
        })
    }

    /// Inter-kernel table: one entry per kernel partition, replicas spread over
    /// `num_kernels` physical kernels.
    ///
    /// Kernel partition `k` starts at `partitions[k * channels_per_kernel]`.
    /// Physical kernel `p` serves partition `p % kernel_partitions`.
    ///
    /// # Errors
    /// No partitions, or fewer kernels than kernel partitions.
    pub fn for_kernels(
        partitions: &[CsrPartition<T>],
        channels_per_kernel: usize,
        num_kernels: usize,
    ) -> Result<Self, DispatchError> {
        let kernel_partitions = partitions.len().div_ceil(channels_per_kernel.max(1));
        if kernel_partitions == 0 || num_kernels < kernel_partitions {
            return Err(DispatchError::EmptyTable);
        }
        let mut starts = Vec::with_capacity(kernel_partitions);
        let mut copies = Vec::with_capacity(kernel_partitions);
        let base = num_kernels / kernel_partitions;
        let rem = num_kernels % kernel_partitions;
        for k in 0..kernel_partitions {
            starts.push(vertex_id(partitions[k * channels_per_kernel].v_start())?);
            copies.push(if k < rem { base + 1 } else { base });
        }
        Self::from_parts(starts, copies)
    }

    /// Intra-kernel table: `local` partitions replicated over `lanes` lanes.
    ///
    /// Lane `i + local.len() * c` holds partition `i`.
    ///
    /// # Errors
    /// No local partitions, or more partitions than lanes.
    pub fn for_lanes(local: &[CsrPartition<T>], lanes: usize) -> Result<Self, DispatchError> {
        let n = local.len();
        if n == 0 || lanes < n {
            return Err(DispatchError::EmptyTable);
        }
        let mut starts = Vec::with_capacity(n);
        let mut copies = Vec::with_capacity(n);
        for (i, part) in local.iter().enumerate() {
            starts.push(vertex_id(part.v_start())?);
            copies.push((i..lanes).step_by(n).count());
        }
        Self::from_parts(starts, copies)
    }

    /// Number of logical partitions.
    pub fn len(&self) -> usize {
        self.start_vertex.len()
    }

    /// Whether the table has no partitions (never true for a built table).
    pub fn is_empty(&self) -> bool {
        self.start_vertex.is_empty()
    }

    /// Start vertex of logical partition `i`.
    pub fn start_vertex(&self, i: usize) -> T {
        self.start_vertex[i]
    }

    /// Replica count of logical partition `i`.
    pub fn copy_count(&self, i: usize) -> usize {
        self.copy_count[i]
    }

    /// Current rotation register of logical partition `i`.
    pub fn rotation(&self, i: usize) -> usize {
        self.round_robin_state[i]
    }

    /// Physical slots addressed by the table (sum of replica counts).
    pub fn total_copies(&self) -> usize {
        self.copy_count.iter().sum()
    }

    /// Logical partition owning `vertex`: the last partition whose start is
    /// `<= vertex`; vertices past every start fall into the final partition.
    pub fn find(&self, vertex: T) -> usize {
        self.start_vertex
            .partition_point(|&s| s <= vertex)
            .saturating_sub(1)
    }

    /// Logical partition served by physical index `physical`.
    pub fn logical_of(&self, physical: usize) -> usize {
        physical % self.len()
    }

    /// Physical index for `vertex`, advancing the rotation of its partition.
    ///
    /// # Errors
    /// An empty table, or a rotation register outside `[0, copies)`.
    pub fn select(&mut self, vertex: T) -> Result<usize, DispatchError> {
        if self.is_empty() {
            return Err(DispatchError::EmptyTable);
        }
        let i = self.find(vertex);
        let copies = self.copy_count[i];
        if copies == 1 {
            return Ok(i);
        }
        let state = self.round_robin_state[i];
        if state >= copies {
            return Err(DispatchError::RotationState {
                partition: i,
                state,
                copies,
            });
        }
        self.round_robin_state[i] = if state + 1 < copies { state + 1 } else { 0 };
        let physical = state * self.len() + i;
        trace!(vertex = %vertex, partition = i, replica = state, physical, "dispatch");
        Ok(physical)
    }

    /// Rewinds every rotation register to replica 0.
    pub fn reset_rotation(&mut self) {
        self.round_robin_state.fill(0);
    }

    /// `(start_vertex, copy_count)` rows, for reporting.
    pub fn rows(&self) -> impl Iterator<Item = (T, usize)> + '_ {
        self.start_vertex
            .iter()
            .copied()
            .zip(self.copy_count.iter().copied())
    }

    #[cfg(test)]
    fn force_rotation(&mut self, i: usize, state: usize) {
        self.round_robin_state[i] = state;
    }
}

fn vertex_id<T: GraphIndex>(v: usize) -> Result<T, DispatchError> {
    // Partition starts come from a graph of `T` ids, so this never fails in practice.
    T::from_index(v).ok_or(DispatchError::EmptyTable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{partition_fixed, CsrGraph};
    use std::sync::Arc;

    fn table(starts: &[u32], copies: &[usize]) -> DispatchTable<u32> {
        DispatchTable::from_parts(starts.to_vec(), copies.to_vec()).unwrap()
    }

    #[test]
    fn test_find_last_start_not_above_vertex() {
        let t = table(&[0, 10, 20], &[1, 1, 1]);
        assert_eq!(t.find(0), 0);
        assert_eq!(t.find(9), 0);
        assert_eq!(t.find(10), 1);
        assert_eq!(t.find(19), 1);
        assert_eq!(t.find(20), 2);
        // Catch-all overflow bucket.
        assert_eq!(t.find(1_000_000), 2);
    }

    #[test]
    fn test_single_copy_returns_logical_index() {
        let mut t = table(&[0, 10], &[1, 1]);
        for _ in 0..5 {
            assert_eq!(t.select(12).unwrap(), 1);
        }
        assert_eq!(t.rotation(1), 0);
    }

    #[test]
    fn test_round_robin_rotation_order() {
        // Partition 1 has three replicas: physical 1, 3, 5.
        let mut t = table(&[0, 10], &[1, 3]);
        let picks: Vec<usize> = (0..7).map(|_| t.select(15).unwrap()).collect();
        assert_eq!(picks, vec![1, 3, 5, 1, 3, 5, 1]);
        assert_eq!(t.rotation(1), 1);

        // Partition 0 is untouched.
        assert_eq!(t.select(3).unwrap(), 0);

        t.reset_rotation();
        assert_eq!(t.select(15).unwrap(), 1);
    }

    #[test]
    fn test_rotation_state_out_of_range_is_an_error() {
        let mut t = table(&[0, 10], &[2, 2]);
        t.force_rotation(0, 2);
        assert_eq!(
            t.select(1).unwrap_err(),
            DispatchError::RotationState { partition: 0, state: 2, copies: 2 }
        );
    }

    #[test]
    fn test_from_parts_validation() {
        assert_eq!(
            DispatchTable::<u32>::from_parts(vec![], vec![]).unwrap_err(),
            DispatchError::EmptyTable
        );
        assert_eq!(
            DispatchTable::<u32>::from_parts(vec![5, 1], vec![1, 1]).unwrap_err(),
            DispatchError::Unsorted { position: 1 }
        );
        assert_eq!(
            DispatchTable::<u32>::from_parts(vec![0, 1], vec![1, 0]).unwrap_err(),
            DispatchError::ZeroCopies { partition: 1 }
        );
    }

    #[test]
    fn test_kernel_table_spreads_remainder() {
        let adj: Vec<Vec<usize>> = (0..8).map(|_| vec![]).collect();
        let g = Arc::new(CsrGraph::<u32>::from_adjacency(&adj).unwrap());
        let parts = partition_fixed(&g, 4).unwrap();

        // 4 channel partitions, 2 per kernel → 2 kernel partitions over 5 kernels.
        let t = DispatchTable::for_kernels(&parts, 2, 5).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows().collect::<Vec<_>>(), vec![(0, 3), (4, 2)]);
        assert_eq!(t.total_copies(), 5);

        assert!(DispatchTable::for_kernels(&parts, 2, 1).is_err());
    }

    #[test]
    fn test_lane_table_replicates_partitions() {
        let adj: Vec<Vec<usize>> = (0..6).map(|_| vec![]).collect();
        let g = Arc::new(CsrGraph::<u32>::from_adjacency(&adj).unwrap());
        let parts = partition_fixed(&g, 3).unwrap();

        // 3 partitions over 8 lanes: lanes {0,3,6}, {1,4,7}, {2,5}.
        let mut t = DispatchTable::for_lanes(&parts, 8).unwrap();
        assert_eq!(t.rows().collect::<Vec<_>>(), vec![(0, 3), (2, 3), (4, 2)]);
        let picks: Vec<usize> = (0..3).map(|_| t.select(5).unwrap()).collect();
        assert_eq!(picks, vec![2, 5, 2]);
        assert!(picks.iter().all(|&lane| lane < 8));

        assert!(DispatchTable::for_lanes(&parts, 2).is_err());
    }
}
