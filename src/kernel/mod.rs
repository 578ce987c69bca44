//! A hop unit: lanes, dispatch tables and five pack buffers.
//!
//! Per round a kernel runs `num_hops` iterations of Pop → Expand → Classify.
//! Iteration 0 pops from the input buffer; iteration `i > 0` pops from
//! ping-pong buffer `i & 1`, and packets that stay local go to `(i + 1) & 1`.
//! Expanded packets are classified in this order:
//!
//! 1. `idx == des`: a match, written to the aggregation buffer. Terminal.
//! 2. `hop >= num_hops`: dropped.
//! 3. owned by this kernel partition: next ping-pong buffer.
//! 4. otherwise: output buffer, for the coordinator to switch.
//!
//! Any full buffer aborts the round.

mod stats;

use tracing::{debug, error, trace};

use crate::buffer::{AggPack, HopPack, PackBuffer};
use crate::channel::Channel;
use crate::config::BufferConfig;
use crate::coordinator::{BufferReport, KernelBuffers};
use crate::dispatch::DispatchTable;
use crate::error::{AllocationError, BufferFull, HopError, Result, Stage};
use crate::executor::{wire, BatchExecutor, BatchRequest};
use crate::graph::{CsrPartition, GraphIndex};

pub use stats::{BufferStatus, HopStats};

/// Per-round knobs shared by every kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundParams {
    /// Packets popped from the input buffer per round.
    pub batch_size: usize,
    /// Hop limit.
    pub num_hops: u32,
    /// Report every device match separately.
    pub bypass: bool,
    /// Device lanes hold whole-graph copies. The host backend ignores it.
    pub duplicate: bool,
}

/// Where expansion runs.
#[derive(Clone, Copy)]
pub enum Backend<'a, T: GraphIndex> {
    /// The host state machine.
    Host,
    /// An accelerator behind a [`BatchExecutor`].
    Device(&'a dyn BatchExecutor<T>),
}

impl<T: GraphIndex> core::fmt::Debug for Backend<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Host => "Host",
            Self::Device(_) => "Device",
        })
    }
}

/// One physical kernel.
#[derive(Debug)]
pub struct Kernel<T> {
    id: usize,
    partition_id: usize,
    channels: Vec<Channel<T>>,
    lanes: DispatchTable<T>,
    routes: DispatchTable<T>,
    input: PackBuffer<HopPack<T>>,
    output: PackBuffer<HopPack<T>>,
    ping_pong: [PackBuffer<HopPack<T>>; 2],
    aggregation: PackBuffer<AggPack<T>>,
    batch: Vec<HopPack<T>>,
    stats: HopStats,
}

fn alloc<P: Copy + Default>(kernel: usize, stage: Stage, capacity: usize) -> Result<PackBuffer<P>> {
    PackBuffer::try_with_capacity(capacity).map_err(|source: AllocationError| HopError::Allocation {
        kernel,
        stage,
        source,
    })
}

impl<T: GraphIndex> Kernel<T> {
    /// Deploys kernel `id` serving kernel partition `partition_id`.
    ///
    /// `local` are the kernel partition's channel partitions, the first with
    /// global id `first_channel`. Lane `l` holds `local[l % local.len()]`.
    /// `routes` is this kernel's own copy of the inter-kernel table.
    ///
    /// # Errors
    /// An empty `local`, more partitions than lanes, or a failed allocation.
    pub fn new(
        id: usize,
        partition_id: usize,
        first_channel: usize,
        local: &[CsrPartition<T>],
        channels_per_kernel: usize,
        routes: DispatchTable<T>,
        buffers: &BufferConfig,
    ) -> Result<Self> {
        let lanes = DispatchTable::for_lanes(local, channels_per_kernel)
            .map_err(|source| HopError::Dispatch { kernel: Some(id), source })?;
        let channels = (0..channels_per_kernel)
            .map(|lane| {
                let i = lane % local.len();
                Channel::new(first_channel + i, local[i].clone())
            })
            .collect();

        Ok(Self {
            id,
            partition_id,
            channels,
            lanes,
            routes,
            input: alloc(id, Stage::Input, buffers.input)?,
            output: alloc(id, Stage::Output, buffers.output)?,
            ping_pong: [
                alloc(id, Stage::Ping, buffers.ping_pong)?,
                alloc(id, Stage::Pong, buffers.ping_pong)?,
            ],
            aggregation: alloc(id, Stage::Aggregation, buffers.aggregation)?,
            batch: Vec::new(),
            stats: HopStats::default(),
        })
    }

    /// Physical kernel index.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Kernel partition served.
    pub fn partition_id(&self) -> usize {
        self.partition_id
    }

    /// Lanes, indexed by lane number.
    pub fn channels(&self) -> &[Channel<T>] {
        &self.channels
    }

    /// Intra-kernel dispatch table.
    pub fn lanes(&self) -> &DispatchTable<T> {
        &self.lanes
    }

    /// This kernel's copy of the inter-kernel table.
    pub fn routes(&self) -> &DispatchTable<T> {
        &self.routes
    }

    /// Counters accumulated since deployment or the last reset.
    pub fn stats(&self) -> &HopStats {
        &self.stats
    }

    /// Whether the input buffer holds work.
    pub fn has_input(&self) -> bool {
        !self.input.is_empty()
    }

    /// Packets waiting in the input buffer.
    pub fn input_len(&self) -> usize {
        self.input.len()
    }

    /// Packets waiting in the output buffer.
    pub fn output_len(&self) -> usize {
        self.output.len()
    }

    /// Matches recorded so far.
    pub fn aggregation(&self) -> &PackBuffer<AggPack<T>> {
        &self.aggregation
    }

    /// Appends a packet to the input buffer.
    ///
    /// # Errors
    /// [`HopError::BufferFull`] when the input buffer is full.
    pub fn push_input(&mut self, pack: HopPack<T>, round: usize) -> Result<()> {
        self.input.push(pack).map_err(|source| self.overflow(round, Stage::Input, source))?;
        self.stats.pushed += 1;
        Ok(())
    }

    /// Pops every packet of the output buffer, oldest first.
    pub fn drain_output(&mut self) -> impl Iterator<Item = HopPack<T>> + '_ {
        self.output.drain()
    }

    /// Occupancy of all five buffers.
    pub fn buffer_status(&self) -> [BufferStatus; 5] {
        [
            BufferStatus::of(Stage::Input, &self.input),
            BufferStatus::of(Stage::Ping, &self.ping_pong[0]),
            BufferStatus::of(Stage::Pong, &self.ping_pong[1]),
            BufferStatus::of(Stage::Output, &self.output),
            BufferStatus::of(Stage::Aggregation, &self.aggregation),
        ]
    }

    /// Empties every buffer, rewinds both tables and clears the counters.
    pub fn reset(&mut self) {
        self.input.reset();
        self.output.reset();
        self.ping_pong.iter_mut().for_each(PackBuffer::reset);
        self.aggregation.reset();
        self.lanes.reset_rotation();
        self.routes.reset_rotation();
        self.stats = HopStats::default();
    }

    fn overflow(&self, round: usize, stage: Stage, source: BufferFull) -> HopError {
        error!(
            kernel = self.id,
            round,
            %stage,
            capacity = source.capacity,
            len = source.len,
            buffers = ?self.buffer_status(),
            "buffer overflow"
        );
        HopError::BufferFull {
            kernel: self.id,
            round,
            stage,
            source,
            report: Box::new(BufferReport {
                round,
                kernels: vec![KernelBuffers {
                    kernel: self.id,
                    buffers: self.buffer_status(),
                }],
            }),
        }
    }

    fn log_status(&self, round: usize, when: &str) {
        let [input, ping, pong, output, agg] = self.buffer_status();
        debug!(
            kernel = self.id,
            round,
            when,
            input = input.len,
            ping = ping.len,
            pong = pong.len,
            output = output.len,
            agg = agg.len,
            "buffer status"
        );
    }

    /// Runs one round. Returns `false` without doing anything if the input
    /// buffer is empty.
    ///
    /// # Errors
    /// Overflow of any buffer, a dispatch or range failure, or a device error.
    pub fn run_round(&mut self, round: usize, params: &RoundParams, backend: Backend<'_, T>) -> Result<bool> {
        if self.input.is_empty() {
            return Ok(false);
        }
        self.log_status(round, "before");
        self.stats.rounds += 1;
        match backend {
            Backend::Host => self.hop_host(round, params)?,
            Backend::Device(executor) => self.hop_device(round, params, executor)?,
        }
        self.log_status(round, "after");
        Ok(true)
    }

    fn hop_host(&mut self, round: usize, params: &RoundParams) -> Result<()> {
        if params.num_hops == 0 {
            let dropped = self.input.drain().count();
            self.stats.visited += dropped as u64;
            self.stats.dropped += dropped as u64;
            return Ok(());
        }

        for iter in 0..params.num_hops as usize {
            let mut batch = std::mem::take(&mut self.batch);
            batch.clear();
            if iter == 0 {
                let n = params.batch_size.min(self.input.len());
                batch.extend((0..n).map_while(|_| self.input.pop()));
            } else {
                batch.extend(self.ping_pong[iter & 1].drain());
            }
            if batch.is_empty() {
                self.batch = batch;
                continue;
            }
            trace!(kernel = self.id, round, iter, batch = batch.len(), "hop iteration");

            let next = (iter + 1) & 1;
            let result = batch.iter().try_for_each(|pack| self.expand(round, params, pack, next));
            self.batch = batch;
            result?;
        }
        Ok(())
    }

    fn expand(&mut self, round: usize, params: &RoundParams, pack: &HopPack<T>, next: usize) -> Result<()> {
        self.stats.visited += 1;
        let lane = self
            .lanes
            .select(pack.idx)
            .map_err(|source| HopError::Dispatch { kernel: Some(self.id), source })?;
        let channel = self.channels.get(lane).ok_or(HopError::MissingLane {
            kernel: self.id,
            lane,
            lanes: self.channels.len(),
        })?;
        let access = channel.lookup(pack.idx).map_err(|source| HopError::VertexOutOfRange {
            kernel: self.id,
            lane,
            source,
        })?;

        for &neighbor in access.neighbors {
            let child = pack.advance(neighbor);
            self.stats.expanded += 1;
            if child.is_match() {
                self.aggregation
                    .push(AggPack::from_match(&child))
                    .map_err(|source| self.overflow(round, Stage::Aggregation, source))?;
                self.stats.aggregated += 1;
            } else if child.hop >= params.num_hops {
                self.stats.dropped += 1;
            } else if self.routes.find(child.idx) == self.partition_id {
                self.ping_pong[next]
                    .push(child)
                    .map_err(|source| self.overflow(round, Stage::ping_pong(next), source))?;
                self.stats.local += 1;
            } else {
                self.output
                    .push(child)
                    .map_err(|source| self.overflow(round, Stage::Output, source))?;
                self.stats.sent += 1;
            }
        }
        Ok(())
    }

    fn hop_device(&mut self, round: usize, params: &RoundParams, executor: &dyn BatchExecutor<T>) -> Result<()> {
        let n = params.batch_size.min(self.input.len());
        let batch: Vec<HopPack<T>> = (0..n).map_while(|_| self.input.pop()).collect();
        self.stats.visited += batch.len() as u64;
        self.stats.batches += 1;

        let (offset_table, index_table) = if params.duplicate {
            let (nv, ne) = self.channels.first().map_or((0, 0), |c| {
                let g = c.partition().graph();
                (g.node_count(), g.edge_count())
            });
            (self.boundary_table(|_| (0, nv))?, self.boundary_table(|_| (0, ne))?)
        } else {
            (
                self.boundary_table(|c| (c.partition().v_start(), c.partition().v_end()))?,
                self.boundary_table(|c| (c.partition().e_start(), c.partition().e_end()))?,
            )
        };
        let request = BatchRequest {
            kernel: self.id,
            offset_table,
            index_table,
            channels: &self.channels,
            pairs: wire::encode(&batch)?,
            pair_count: batch.len(),
            batch_size: params.batch_size,
            num_hops: params.num_hops,
            bypass: params.bypass,
            duplicate: params.duplicate,
        };
        let response = executor.run_batch(&request).map_err(|source| {
            error!(kernel = self.id, round, status = source.status, "device batch failed");
            HopError::Executor { kernel: self.id, round, source }
        })?;

        if self.aggregation.is_full(response.local_count) {
            let source = BufferFull {
                capacity: self.aggregation.capacity(),
                len: self.aggregation.len(),
                incoming: response.local_count,
            };
            return Err(self.overflow(round, Stage::Aggregation, source));
        }
        for record in wire::decode(&response.local, response.local_count)? {
            let pack: HopPack<T> = record.to_pack()?;
            let count = if params.bypass { 1 } else { pack.idx.to_wide() };
            let count = u32::try_from(count).map_err(|_| wire::WireError::FieldOverflow(count))?;
            self.aggregation
                .push(AggPack { src: pack.src, des: pack.des, count })
                .map_err(|source| self.overflow(round, Stage::Aggregation, source))?;
            self.stats.aggregated += u64::from(count);
        }
        for record in wire::decode(&response.switch, response.switch_count)? {
            self.output
                .push(record.to_pack()?)
                .map_err(|source| self.overflow(round, Stage::Output, source))?;
            self.stats.sent += 1;
        }
        trace!(
            kernel = self.id,
            round,
            local = response.local_count,
            switch = response.switch_count,
            "device batch"
        );
        Ok(())
    }

    fn boundary_table(&self, bounds: impl Fn(&Channel<T>) -> (usize, usize)) -> Result<Vec<T>> {
        let mut table = Vec::with_capacity(self.channels.len() * 2);
        for channel in &self.channels {
            let (lo, hi) = bounds(channel);
            for v in [lo, hi] {
                let id = T::from_index(v)
                    .ok_or_else(|| wire::WireError::FieldOverflow(u64::try_from(v).unwrap_or(u64::MAX)))?;
                table.push(id);
            }
        }
        Ok(table)
    }
}
