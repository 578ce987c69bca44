//! A processing lane bound to one channel partition.

use crate::buffer::AccessPoint;
use crate::error::RangeError;
use crate::graph::{CsrPartition, GraphIndex};

/// One channel partition bound to a lane of a kernel.
///
/// Holds a view, not a copy: the adjacency data lives in the shared graph.
#[derive(Debug, Clone)]
pub struct Channel<T> {
    partition_id: usize,
    partition: CsrPartition<T>,
}

impl<T: GraphIndex> Channel<T> {
    /// Binds channel partition `partition_id` to a lane.
    pub fn new(partition_id: usize, partition: CsrPartition<T>) -> Self {
        Self {
            partition_id,
            partition,
        }
    }

    /// Global channel-partition id.
    pub fn partition_id(&self) -> usize {
        self.partition_id
    }

    /// The partition view.
    pub fn partition(&self) -> &CsrPartition<T> {
        &self.partition
    }

    /// First vertex served.
    pub fn v_start(&self) -> usize {
        self.partition.v_start()
    }

    /// One past the last vertex served.
    pub fn v_end(&self) -> usize {
        self.partition.v_end()
    }

    /// Whether the lane serves `v`.
    pub fn contains(&self, v: T) -> bool {
        self.partition.contains(v.index())
    }

    /// Resolves the adjacency list of `v`.
    ///
    /// # Errors
    /// Returns [`RangeError`] if `v` lies outside this channel's range, which
    /// means a packet was routed to the wrong lane.
    pub fn lookup(&self, v: T) -> Result<AccessPoint<'_, T>, RangeError> {
        let neighbors = self.partition.neighbors(v.index()).ok_or(RangeError {
            vertex: v.to_wide(),
            v_start: self.v_start(),
            v_end: self.v_end(),
        })?;
        Ok(AccessPoint { vertex: v, neighbors })
    }

    /// Copies up to `dest.len()` neighbors of `v` into `dest` and returns the
    /// real degree.
    ///
    /// # Errors
    /// Same as [`Channel::lookup`].
    pub fn lookup_into(&self, dest: &mut [T], v: T) -> Result<usize, RangeError> {
        let access = self.lookup(v)?;
        let n = dest.len().min(access.degree());
        dest[..n].copy_from_slice(&access.neighbors[..n]);
        Ok(access.degree())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CsrGraph;
    use std::sync::Arc;

    fn channel() -> Channel<u32> {
        // 0 -> 1 ; 1 -> 0, 2, 3 ; 2 -> 3 ; 3 ->
        let g = CsrGraph::from_adjacency(&[vec![1], vec![0, 2, 3], vec![3], vec![]]).unwrap();
        Channel::new(7, CsrPartition::new(Arc::new(g), 1, 3).unwrap())
    }

    #[test]
    fn test_lookup_in_range() {
        let ch = channel();
        assert_eq!(ch.partition_id(), 7);
        let ap = ch.lookup(1).unwrap();
        assert_eq!(ap.vertex, 1);
        assert_eq!(ap.neighbors, &[0, 2, 3]);
        assert_eq!(ch.lookup(2).unwrap().degree(), 1);
        assert!(ch.contains(2));
        assert!(!ch.contains(3));
    }

    #[test]
    fn test_lookup_out_of_range() {
        let ch = channel();
        assert_eq!(ch.lookup(0).unwrap_err(), RangeError { vertex: 0, v_start: 1, v_end: 3 });
        assert!(ch.lookup(3).is_err());
    }

    #[test]
    fn test_lookup_into_truncates_but_reports_degree() {
        let ch = channel();
        let mut dest = [0u32; 2];
        assert_eq!(ch.lookup_into(&mut dest, 1).unwrap(), 3);
        assert_eq!(dest, [0, 2]);
    }
}
