//! Whole-graph CSR storage and vertex-range partition views.
//!
//! Memory layout:
//! - `offsets`: `NV + 1` prefix sums into `index`
//! - `index`: `NE` neighbor ids, row-major
//! - `weights`: optional `NE` edge weights, parallel to `index`
//!
//! A [`CsrPartition`] never copies: it holds an `Arc` to the parent store and a
//! [`Shift`] translating global vertex/edge ids to positions in its local view.

use std::sync::Arc;

use crate::error::GraphError;
use crate::graph::GraphIndex;

/// A directed graph in compressed-sparse-row form.
///
/// Immutable once built. `Default` yields an uninitialized graph (no offsets),
/// which the partitioner rejects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsrGraph<T> {
    offsets: Vec<T>,
    index: Vec<T>,
    weights: Option<Vec<f32>>,
}

impl<T: GraphIndex> CsrGraph<T> {
    /// Builds a graph directly from CSR parts.
    ///
    /// # Errors
    /// - if `offsets` is empty or does not start at 0
    /// - if offsets are not monotone
    /// - if `offsets[NV] != index.len()`
    /// - if any neighbor id is `>= NV`
    pub fn from_csr_parts(offsets: Vec<T>, index: Vec<T>) -> Result<Self, GraphError> {
        let first = *offsets.first().ok_or(GraphError::EmptyOffsets)?;
        if first != T::zero() {
            return Err(GraphError::FirstOffsetNonZero(first.to_wide()));
        }
        if let Some(position) = offsets.windows(2).position(|w| w[0] > w[1]) {
            return Err(GraphError::OffsetsNotMonotone { position });
        }
        let last = offsets[offsets.len() - 1];
        if last.index() != index.len() {
            return Err(GraphError::EdgeCountMismatch {
                expected: last.to_wide(),
                actual: index.len(),
            });
        }

        let n = offsets.len() - 1;
        for v in 0..n {
            let (start, end) = (offsets[v].index(), offsets[v + 1].index());
            if let Some(&bad) = index[start..end].iter().find(|u| u.index() >= n) {
                return Err(GraphError::NeighborOutOfBounds {
                    vertex: v,
                    neighbor: bad.to_wide(),
                    node_count: n,
                });
            }
        }

        Ok(Self {
            offsets,
            index,
            weights: None,
        })
    }

    /// Builds a graph from an adjacency list.
    ///
    /// # Errors
    /// Returns an error if a neighbor is out of bounds or an id does not fit `T`.
    pub fn from_adjacency(adjacency: &[Vec<usize>]) -> Result<Self, GraphError> {
        let n = adjacency.len();

        let mut offsets = Vec::with_capacity(n + 1);
        offsets.push(T::zero());

        let mut total_edges = 0usize;
        for nbrs in adjacency {
            total_edges = total_edges.saturating_add(nbrs.len());
            offsets.push(to_element(total_edges)?);
        }

        let mut index = Vec::with_capacity(total_edges);
        for (u, nbrs) in adjacency.iter().enumerate() {
            for &v in nbrs {
                if v >= n {
                    return Err(GraphError::NeighborOutOfBounds {
                        vertex: u,
                        neighbor: v as u64,
                        node_count: n,
                    });
                }
                index.push(to_element(v)?);
            }
        }

        Ok(Self {
            offsets,
            index,
            weights: None,
        })
    }

    /// Attaches per-edge weights.
    ///
    /// # Errors
    /// Returns an error if `weights.len() != NE`.
    pub fn with_weights(mut self, weights: Vec<f32>) -> Result<Self, GraphError> {
        if weights.len() != self.index.len() {
            return Err(GraphError::WeightCountMismatch {
                expected: self.index.len(),
                actual: weights.len(),
            });
        }
        self.weights = Some(weights);
        Ok(self)
    }

    /// Whether the graph holds an offset array at all.
    pub fn is_initialized(&self) -> bool {
        !self.offsets.is_empty()
    }

    /// Number of vertices (`NV`).
    pub fn node_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Number of edges (`NE`).
    pub fn edge_count(&self) -> usize {
        self.index.len()
    }

    /// The full offset array.
    pub fn offsets(&self) -> &[T] {
        &self.offsets
    }

    /// The full index array.
    pub fn index(&self) -> &[T] {
        &self.index
    }

    /// Edge weights, if attached.
    pub fn weights(&self) -> Option<&[f32]> {
        self.weights.as_deref()
    }

    /// `offset[v]` as a native index.
    ///
    /// # Panics
    /// Panics if `v > NV`.
    #[inline]
    pub fn offset(&self, v: usize) -> usize {
        self.offsets[v].index()
    }

    /// Out-neighbors of `v`.
    ///
    /// # Panics
    /// Panics if `v >= NV`.
    pub fn neighbors(&self, v: usize) -> &[T] {
        assert!(v < self.node_count(), "vertex {v} out of bounds");
        &self.index[self.offset(v)..self.offset(v + 1)]
    }

    /// Out-degree of `v`.
    ///
    /// # Panics
    /// Panics if `v >= NV`.
    pub fn degree(&self, v: usize) -> usize {
        assert!(v < self.node_count(), "vertex {v} out of bounds");
        self.offset(v + 1) - self.offset(v)
    }

    /// Bytes needed to store the whole offset array.
    pub fn offset_bytes(&self) -> usize {
        self.offsets.len() * T::BYTES
    }

    /// Bytes needed to store the whole index array.
    pub fn index_bytes(&self) -> usize {
        self.index.len() * T::BYTES
    }

    /// Average out-degree, `0.0` for an empty graph.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_degree(&self) -> f64 {
        match self.node_count() {
            0 => 0.0,
            n => self.edge_count() as f64 / n as f64,
        }
    }
}

fn to_element<T: GraphIndex>(value: usize) -> Result<T, GraphError> {
    T::from_index(value).ok_or(GraphError::IndexOverflow(value as u64))
}

/// Translation from global vertex/edge ids to positions inside a partition view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Shift {
    /// Subtracted from a global vertex id to get the local offset position.
    pub offset_shift: usize,
    /// Subtracted from a global edge position to get the local index position.
    pub index_shift: usize,
}

impl Shift {
    /// Local offset position of global vertex `v`.
    #[inline]
    pub const fn local_vertex(self, v: usize) -> usize {
        v - self.offset_shift
    }

    /// Local index position of global edge position `e`.
    #[inline]
    pub const fn local_edge(self, e: usize) -> usize {
        e - self.index_shift
    }
}

/// A contiguous vertex range `[v_start, v_end)` of a parent graph.
#[derive(Debug, Clone)]
pub struct CsrPartition<T> {
    graph: Arc<CsrGraph<T>>,
    v_start: usize,
    v_end: usize,
    shift: Shift,
}

impl<T: GraphIndex> CsrPartition<T> {
    /// Creates a view over `[v_start, v_end)`.
    ///
    /// # Errors
    /// Returns an error if the range is inverted or exceeds the graph.
    pub fn new(graph: Arc<CsrGraph<T>>, v_start: usize, v_end: usize) -> Result<Self, GraphError> {
        let node_count = graph.node_count();
        if v_start > v_end || v_end > node_count || !graph.is_initialized() {
            return Err(GraphError::RangeOutOfBounds {
                v_start,
                v_end,
                node_count,
            });
        }
        let shift = Shift {
            offset_shift: v_start,
            index_shift: graph.offset(v_start),
        };
        Ok(Self {
            graph,
            v_start,
            v_end,
            shift,
        })
    }

    /// First vertex in the range.
    pub fn v_start(&self) -> usize {
        self.v_start
    }

    /// One past the last vertex in the range.
    pub fn v_end(&self) -> usize {
        self.v_end
    }

    /// Number of vertices in the range.
    pub fn nv(&self) -> usize {
        self.v_end - self.v_start
    }

    /// First global edge position covered.
    pub fn e_start(&self) -> usize {
        self.graph.offset(self.v_start)
    }

    /// One past the last global edge position covered.
    pub fn e_end(&self) -> usize {
        self.graph.offset(self.v_end)
    }

    /// Number of edges in the range.
    pub fn ne(&self) -> usize {
        self.e_end() - self.e_start()
    }

    /// The id translation for this view.
    pub fn shift(&self) -> Shift {
        self.shift
    }

    /// The parent graph.
    pub fn graph(&self) -> &Arc<CsrGraph<T>> {
        &self.graph
    }

    /// Whether `v` falls inside the range.
    #[inline]
    pub fn contains(&self, v: usize) -> bool {
        (self.v_start..self.v_end).contains(&v)
    }

    /// The `nv + 1` offsets of this view (values are global edge positions).
    pub fn offsets(&self) -> &[T] {
        &self.graph.offsets()[self.v_start..=self.v_end]
    }

    /// The `ne` neighbor ids of this view.
    pub fn index(&self) -> &[T] {
        &self.graph.index()[self.e_start()..self.e_end()]
    }

    /// The `ne` weights of this view, if the parent carries weights.
    pub fn weights(&self) -> Option<&[f32]> {
        let (s, e) = (self.e_start(), self.e_end());
        self.graph.weights().map(|w| &w[s..e])
    }

    /// Neighbors of `v` resolved through the local view, `None` outside the range.
    pub fn neighbors(&self, v: usize) -> Option<&[T]> {
        if !self.contains(v) {
            return None;
        }
        let local = self.shift.local_vertex(v);
        let offsets = self.offsets();
        let start = self.shift.local_edge(offsets[local].index());
        let end = self.shift.local_edge(offsets[local + 1].index());
        Some(&self.index()[start..end])
    }

    /// Bytes of this view's offset array.
    pub fn offset_bytes(&self) -> usize {
        (self.nv() + 1) * T::BYTES
    }

    /// Bytes of this view's index array.
    pub fn index_bytes(&self) -> usize {
        self.ne() * T::BYTES
    }
}
