//! Per-kernel counters and buffer occupancy snapshots.

use core::ops::AddAssign;

use serde::Serialize;

use crate::buffer::PackBuffer;
use crate::error::Stage;

/// Packet counters accumulated across rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HopStats {
    /// Packets received into the input buffer (dispatch and switching).
    pub pushed: u64,
    /// Packets popped for expansion.
    pub visited: u64,
    /// Neighbor packets produced by expansion.
    pub expanded: u64,
    /// Matches written to the aggregation buffer.
    pub aggregated: u64,
    /// Packets kept in this kernel's ping-pong buffers.
    pub local: u64,
    /// Packets sent to the output buffer.
    pub sent: u64,
    /// Packets dropped at the hop limit.
    pub dropped: u64,
    /// Offloaded batches.
    pub batches: u64,
    /// Rounds in which the kernel had input.
    pub rounds: u64,
}

impl AddAssign for HopStats {
    fn add_assign(&mut self, rhs: Self) {
        self.pushed += rhs.pushed;
        self.visited += rhs.visited;
        self.expanded += rhs.expanded;
        self.aggregated += rhs.aggregated;
        self.local += rhs.local;
        self.sent += rhs.sent;
        self.dropped += rhs.dropped;
        self.batches += rhs.batches;
        self.rounds += rhs.rounds;
    }
}

/// Occupancy of one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BufferStatus {
    /// Which buffer.
    #[serde(serialize_with = "serialize_stage")]
    pub stage: Stage,
    /// Packets stored.
    pub len: usize,
    /// Slots available.
    pub capacity: usize,
    /// `len / capacity` in percent.
    pub ratio_used: f64,
}

impl BufferStatus {
    pub(crate) fn of<P: Copy + Default>(stage: Stage, buf: &PackBuffer<P>) -> Self {
        Self {
            stage,
            len: buf.len(),
            capacity: buf.capacity(),
            ratio_used: buf.ratio_used(),
        }
    }
}

fn serialize_stage<S: serde::Serializer>(stage: &Stage, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(stage)
}
