//! Work packets and the bounded pack buffer that carries them between stages.
//!
//! [`PackBuffer`] is a fixed-capacity circular queue. `write` and `read`
//! cursors wrap modulo the capacity; the `empty` flag tells a full buffer from
//! an empty one when the cursors meet. A push never overwrites: it fails and
//! leaves the buffer untouched.
//!
//! ### Performance Characteristics
//! | Operation | Complexity | Notes |
//! |-----------|------------|-------|
//! | `push` | \(O(1)\) | fails when full |
//! | `push_expanded` | \(O(d)\) | all-or-nothing batch of `d` packets |
//! | `pop` | \(O(1)\) | `None` when empty |
//! | `len` | \(O(1)\) | derived from the cursors |

use crate::error::{AllocationError, BufferFull};
use crate::graph::GraphIndex;

/// One query walk in flight.
///
/// `src`/`des` identify the query pair, `idx` is the frontier vertex being
/// expanded and `hop` the number of edges walked so far.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HopPack<T> {
    /// Query source vertex.
    pub src: T,
    /// Query destination vertex.
    pub des: T,
    /// Current frontier vertex.
    pub idx: T,
    /// Hops walked so far.
    pub hop: u32,
}

impl<T: GraphIndex> HopPack<T> {
    /// The hop-0 packet of query `(src, des)`, positioned at `src`.
    pub fn seed(src: T, des: T) -> Self {
        Self {
            src,
            des,
            idx: src,
            hop: 0,
        }
    }

    /// The packet one hop further, positioned at `next`.
    #[must_use]
    pub fn advance(self, next: T) -> Self {
        Self {
            idx: next,
            hop: self.hop + 1,
            ..self
        }
    }

    /// Whether the walk has reached its destination.
    #[inline]
    pub fn is_match(&self) -> bool {
        self.idx == self.des
    }
}

/// A terminal match recorded in an aggregation buffer.
///
/// `count` is 1 for a single host-side match; device batches may report
/// coalesced counts.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggPack<T> {
    /// Query source vertex.
    pub src: T,
    /// Query destination vertex.
    pub des: T,
    /// Matches represented by this record.
    pub count: u32,
}

impl<T: GraphIndex> AggPack<T> {
    /// A single match of `pack`.
    pub fn from_match(pack: &HopPack<T>) -> Self {
        Self {
            src: pack.src,
            des: pack.des,
            count: 1,
        }
    }
}

/// A resolved adjacency list: the frontier vertex and its neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPoint<'a, T> {
    /// Vertex that was looked up.
    pub vertex: T,
    /// Its out-neighbors.
    pub neighbors: &'a [T],
}

impl<T> AccessPoint<'_, T> {
    /// Out-degree of the looked-up vertex.
    pub fn degree(&self) -> usize {
        self.neighbors.len()
    }
}

/// A bounded FIFO ring of fixed-size packets.
#[derive(Debug, Clone)]
pub struct PackBuffer<P> {
    slots: Box<[P]>,
    write: usize,
    read: usize,
    empty: bool,
}

impl<P: Copy + Default> PackBuffer<P> {
    /// Allocates a buffer of `capacity` slots.
    ///
    /// # Errors
    /// Returns an error if `capacity` is zero or the slots cannot be reserved.
    pub fn try_with_capacity(capacity: usize) -> Result<Self, AllocationError> {
        if capacity == 0 {
            return Err(AllocationError { capacity });
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| AllocationError { capacity })?;
        slots.resize(capacity, P::default());
        Ok(Self {
            slots: slots.into_boxed_slice(),
            write: 0,
            read: 0,
            empty: true,
        })
    }

    /// Slot count.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Packets currently stored.
    #[inline]
    pub fn len(&self) -> usize {
        if self.empty {
            0
        } else if self.write > self.read {
            self.write - self.read
        } else {
            self.write + self.capacity() - self.read
        }
    }

    /// Whether no packet is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Whether `incoming` more packets would not fit.
    #[inline]
    pub fn is_full(&self, incoming: usize) -> bool {
        self.len() + incoming > self.capacity()
    }

    /// Occupancy as a percentage of capacity. Diagnostics only.
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio_used(&self) -> f64 {
        self.len() as f64 * 100.0 / self.capacity() as f64
    }

    fn full_error(&self, incoming: usize) -> BufferFull {
        BufferFull {
            capacity: self.capacity(),
            len: self.len(),
            incoming,
        }
    }

    #[inline]
    fn write_slot(&mut self, packet: P) {
        self.slots[self.write] = packet;
        self.write += 1;
        if self.write == self.capacity() {
            self.write = 0;
        }
    }

    /// Appends one packet.
    ///
    /// # Errors
    /// Returns [`BufferFull`] and leaves the buffer unchanged when full.
    pub fn push(&mut self, packet: P) -> Result<(), BufferFull> {
        if self.is_full(1) {
            return Err(self.full_error(1));
        }
        self.write_slot(packet);
        self.empty = false;
        Ok(())
    }

    /// Removes the oldest packet.
    pub fn pop(&mut self) -> Option<P> {
        if self.empty {
            return None;
        }
        let packet = self.slots[self.read];
        self.read += 1;
        if self.read == self.capacity() {
            self.read = 0;
        }
        if self.read == self.write {
            self.empty = true;
        }
        Some(packet)
    }

    /// Drops every packet and rewinds both cursors.
    pub fn reset(&mut self) {
        self.write = 0;
        self.read = 0;
        self.empty = true;
    }

    /// Stored packets, oldest first, without consuming them.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &P> + '_ {
        let cap = self.capacity();
        (0..self.len()).map(move |i| &self.slots[(self.read + i) % cap])
    }

    /// Pops every stored packet, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = P> + '_ {
        core::iter::from_fn(move || self.pop())
    }
}

impl<T: GraphIndex> PackBuffer<HopPack<T>> {
    /// Pushes one copy of `template` per neighbor of `access`, each with `idx`
    /// set to that neighbor. All-or-nothing: returns the number pushed.
    ///
    /// # Errors
    /// Returns [`BufferFull`] without writing anything if the batch does not fit.
    pub fn push_expanded(
        &mut self,
        access: &AccessPoint<'_, T>,
        template: &HopPack<T>,
    ) -> Result<usize, BufferFull> {
        let degree = access.degree();
        if self.is_full(degree) {
            return Err(self.full_error(degree));
        }
        for &next in access.neighbors {
            self.write_slot(HopPack { idx: next, ..*template });
        }
        if degree > 0 {
            self.empty = false;
        }
        Ok(degree)
    }
}
