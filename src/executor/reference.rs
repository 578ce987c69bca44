//! In-memory model of the hop accelerator.

use std::collections::BTreeMap;

use tracing::trace;

use super::wire::{self, WireRecord};
use super::{BatchExecutor, BatchRequest, BatchResponse, ExecutorError};
use crate::buffer::{AccessPoint, HopPack, PackBuffer};
use crate::channel::Channel;
use crate::error::{AllocationError, BufferFull};
use crate::graph::GraphIndex;

const STATUS_FAILURE: i32 = -1;
const STATUS_ALLOCATION: i32 = -8;

/// Walks the request's channels on the host, with the device's output contract.
///
/// Packets are expanded until they match, reach the hop limit or leave the
/// kernel's vertex range. With `duplicate` every lane holds the whole graph,
/// so nothing is switched. Without `bypass`, matches are coalesced per
/// `(src, des)` and the count travels in the `idx` field.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceExecutor {
    capacity: usize,
}

impl ReferenceExecutor {
    /// A model whose internal frontier buffers hold `capacity` packets.
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl Default for ReferenceExecutor {
    fn default() -> Self {
        Self::new(1 << 16)
    }
}

fn owner<T: GraphIndex>(channels: &[Channel<T>], v: T) -> Option<&Channel<T>> {
    channels.iter().find(|c| c.contains(v))
}

/// Adjacency of `v` if the batch's lanes hold it.
fn resolve<'a, T: GraphIndex>(req: &BatchRequest<'a, T>, v: T) -> Result<Option<AccessPoint<'a, T>>, ExecutorError> {
    let channels: &'a [Channel<T>] = req.channels;
    if req.duplicate {
        let Some(graph) = channels.first().map(|c| c.partition().graph()) else {
            return Ok(None);
        };
        let i = v.index();
        return Ok((i < graph.node_count()).then(|| AccessPoint {
            vertex: v,
            neighbors: graph.neighbors(i),
        }));
    }
    owner(channels, v).map(|c| c.lookup(v)).transpose().map_err(failure)
}

fn holds<T: GraphIndex>(req: &BatchRequest<'_, T>, v: T) -> bool {
    if req.duplicate {
        req.channels
            .first()
            .is_some_and(|c| v.index() < c.partition().graph().node_count())
    } else {
        owner(req.channels, v).is_some()
    }
}

fn failure(e: impl ToString) -> ExecutorError {
    ExecutorError::new(STATUS_FAILURE, e.to_string())
}

fn overflow(e: BufferFull) -> ExecutorError {
    ExecutorError::new(STATUS_ALLOCATION, e.to_string())
}

impl<T: GraphIndex> BatchExecutor<T> for ReferenceExecutor {
    fn run_batch(&self, req: &BatchRequest<'_, T>) -> Result<BatchResponse, ExecutorError> {
        let records = wire::decode(&req.pairs, req.pair_count).map_err(failure)?;
        let alloc = |e: AllocationError| ExecutorError::new(STATUS_ALLOCATION, e.to_string());
        let mut frontier = PackBuffer::<HopPack<T>>::try_with_capacity(self.capacity).map_err(alloc)?;
        let mut expanded = PackBuffer::<HopPack<T>>::try_with_capacity(self.capacity).map_err(alloc)?;

        for record in &records {
            frontier.push(record.to_pack().map_err(failure)?).map_err(overflow)?;
        }

        let mut matches = Vec::new();
        let mut switch = Vec::new();
        while let Some(pack) = frontier.pop() {
            // Packets at the limit have no hop left; with zero hops that is every seed.
            if pack.hop >= req.num_hops {
                continue;
            }
            let Some(access) = resolve(req, pack.idx)? else {
                switch.push(pack);
                continue;
            };
            let template = HopPack { hop: pack.hop + 1, ..pack };
            expanded.push_expanded(&access, &template).map_err(overflow)?;

            while let Some(next) = expanded.pop() {
                if next.is_match() {
                    matches.push(next);
                } else if next.hop >= req.num_hops {
                    continue;
                } else if holds(req, next.idx) {
                    frontier.push(next).map_err(overflow)?;
                } else {
                    switch.push(next);
                }
            }
        }

        let local: Vec<WireRecord> = if req.bypass {
            matches
                .iter()
                .map(WireRecord::from_pack)
                .collect::<Result<_, _>>()
                .map_err(failure)?
        } else {
            let mut coalesced: BTreeMap<(T, T), u32> = BTreeMap::new();
            for m in &matches {
                let count = coalesced.entry((m.src, m.des)).or_default();
                *count = count
                    .checked_add(1)
                    .ok_or_else(|| failure(format!("match count of ({}, {}) overflows u32", m.src, m.des)))?;
            }
            coalesced
                .into_iter()
                .map(|((src, des), count)| {
                    let mut record = WireRecord::from_pack(&HopPack { src, des, idx: src, hop: req.num_hops })?;
                    record.idx.set(count);
                    Ok(record)
                })
                .collect::<Result<_, wire::WireError>>()
                .map_err(failure)?
        };
        let switch_bytes = wire::encode(&switch).map_err(failure)?;

        trace!(
            kernel = req.kernel,
            pairs = req.pair_count,
            matches = matches.len(),
            local = local.len(),
            switch = switch.len(),
            "reference batch"
        );
        Ok(BatchResponse {
            local_count: local.len(),
            local: wire::encode_records(&local),
            switch_count: switch.len(),
            switch: switch_bytes,
        })
    }
}
