//! # `nhop` - Partitioned Multi-Hop Traversal Engine
//!
//! Host-side graph partitioning and multi-kernel work distribution for n-hop
//! path counting on accelerator cards. A CSR graph is split into size-bounded
//! channel partitions, channels are grouped into kernels, and query packets are
//! switched between kernels through bounded ring buffers until every buffer
//! drains.
//!
//! ## Architecture
//!
//! Components, leaf-first:
//!
//! 1. **CSR graph and partitioner** ([`graph`]): contiguous vertex-range
//!    sub-partitions whose offset and index arrays fit caller byte limits.
//! 2. **Channel** ([`channel`]): one sub-partition bound to a processing lane.
//! 3. **Dispatch table** ([`dispatch`]): vertex → partition lookup with
//!    round-robin spreading over replicated partitions.
//! 4. **Pack buffer** ([`buffer`]): bounded FIFO ring of fixed-size packets.
//! 5. **Kernel** ([`kernel`]): channels plus five pack buffers; runs one
//!    multi-hop round.
//! 6. **Coordinator** ([`coordinator`]): dispatch, compute, switch, repeat
//!    until quiescent.
//! 7. **Merger** ([`merge`]): deterministic `(src, des) → count` accumulation.
//!
//! The accelerator itself is reached through the [`executor::BatchExecutor`]
//! trait; [`executor::ReferenceExecutor`] is an in-memory model of the device.
//!
//! ## Guarantees
//!
//! - **Fail-fast sizing**: a full buffer aborts the run with
//!   [`HopError::BufferFull`], never a silent drop.
//! - **Deterministic dispatch**: replica selection is strictly cyclic per table.
//! - **Round barrier**: no kernel reads an input buffer while switching is in
//!   flight; compute may run in parallel under the `parallel` feature.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use nhop::{Coordinator, CsrGraph, HopConfig};
//!
//! // 0 -> 1, 2 ; 1 -> 3 ; 2 -> 3
//! let graph = CsrGraph::<u32>::from_csr_parts(vec![0, 2, 3, 4, 4], vec![1, 2, 3, 3]).unwrap();
//! let mut config = HopConfig::default();
//! config.num_kernels = 1;
//! config.channels_per_kernel = 2;
//! config.buffers = nhop::config::BufferConfig::uniform(64);
//!
//! let mut coordinator = Coordinator::new(Arc::new(graph), config).unwrap();
//! coordinator.run(&[(0, 3)], 2).unwrap();
//! assert_eq!(coordinator.merge().get(0, 3), 2);
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod buffer;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod graph;
pub mod io;
pub mod kernel;
pub mod merge;

pub use buffer::{AccessPoint, AggPack, HopPack, PackBuffer};
pub use channel::Channel;
pub use config::{ExecutionMode, HopConfig};
pub use coordinator::{Coordinator, RunSummary};
pub use dispatch::DispatchTable;
pub use error::{HopError, Result, StatusCode};
pub use executor::{BatchExecutor, ReferenceExecutor};
pub use graph::{CsrGraph, CsrPartition, GraphIndex};
pub use kernel::Kernel;
pub use merge::MergedResult;

// Wire records and packets must stay fixed-width.
const _: () = {
    use core::mem;

    assert!(mem::size_of::<executor::wire::WireRecord>() == executor::wire::RECORD_BYTES);
    assert!(mem::size_of::<HopPack<u32>>() == 16);
};
