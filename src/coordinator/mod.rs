//! Multi-kernel convergence loop.
//!
//! ```text
//! dispatch ─► [ compute ─► switch ]* ─► merge
//!               ▲   all kernels   │
//!               └──── barrier ────┘
//! ```
//!
//! Round 0 seeds one hop-0 packet per query pair into the kernel owning its
//! source. Each round every kernel with input runs its hop iterations, then
//! every output packet is routed into the input buffer of the kernel owning
//! its frontier vertex. The loop ends in the first round where no kernel had
//! input. Compute may run kernels in parallel under the `parallel` feature;
//! switching is always sequential.

mod report;

use std::path::Path;
use std::sync::Arc;

use crossbeam_utils::CachePadded;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, error, info, info_span, trace};

use crate::buffer::HopPack;
use crate::config::{ConfigError, ExecutionMode, HopConfig};
use crate::dispatch::DispatchTable;
use crate::error::{HopError, Result};
use crate::executor::{BatchExecutor, ReferenceExecutor};
use crate::graph::{plan_deployment, CsrGraph, DeploymentPlan, GraphIndex, Layout};
use crate::io;
use crate::kernel::{Backend, HopStats, Kernel, RoundParams};
use crate::merge::MergedResult;

pub use report::{BufferReport, KernelBuffers, KernelSummary, RunSummary};

/// Owns the deployment: plan, inter-kernel table, kernels and executor.
pub struct Coordinator<T: GraphIndex> {
    graph: Arc<CsrGraph<T>>,
    config: HopConfig,
    plan: DeploymentPlan<T>,
    routes: DispatchTable<T>,
    kernels: Vec<CachePadded<Kernel<T>>>,
    executor: Option<Box<dyn BatchExecutor<T>>>,
    rounds: usize,
}

impl<T: GraphIndex> core::fmt::Debug for Coordinator<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Coordinator")
            .field("plan", &self.plan)
            .field("routes", &self.routes)
            .field("kernels", &self.kernels.len())
            .field("offload", &self.executor.is_some())
            .field("rounds", &self.rounds)
            .finish_non_exhaustive()
    }
}

impl<T: GraphIndex> Coordinator<T> {
    /// Validates `config`, partitions `graph` and deploys every kernel.
    ///
    /// In [`ExecutionMode::Offload`] batches go to a [`ReferenceExecutor`]
    /// until [`Coordinator::with_executor`] installs a device.
    ///
    /// # Errors
    /// - invalid configuration
    /// - partitioning failures
    /// - [`HopError::InsufficientDevices`] when the graph spans more kernel
    ///   partitions than `num_kernels`
    /// - `duplicate` on a multi-kernel layout
    /// - buffer allocation failures
    pub fn new(graph: Arc<CsrGraph<T>>, config: HopConfig) -> Result<Self> {
        config.validate()?;
        let plan = plan_deployment(&graph, config.channels_per_kernel, config.limits())?;
        if config.num_kernels < plan.kernel_partitions {
            return Err(HopError::InsufficientDevices {
                required: plan.kernel_partitions,
                available: config.num_kernels,
            });
        }
        if config.duplicate && plan.layout == Layout::MultiKernel {
            return Err(ConfigError::DuplicateMultiKernel(plan.kernel_partitions).into());
        }
        let routes = DispatchTable::for_kernels(&plan.partitions, config.channels_per_kernel, config.num_kernels)
            .map_err(|source| HopError::Dispatch { kernel: None, source })?;
        info!(
            kernels = config.num_kernels,
            kernel_partitions = plan.kernel_partitions,
            channel_partitions = plan.partitions.len(),
            layout = ?plan.layout,
            "deployment planned"
        );
        for (i, (start, copies)) in routes.rows().enumerate() {
            debug!(partition = i, start = %start, copies, "inter-kernel route");
        }

        let kernels = (0..config.num_kernels)
            .map(|id| {
                let partition_id = routes.logical_of(id);
                Kernel::new(
                    id,
                    partition_id,
                    plan.first_channel_of(partition_id),
                    plan.kernel_slice(partition_id),
                    config.channels_per_kernel,
                    routes.clone(),
                    &config.buffers,
                )
                .map(CachePadded::new)
            })
            .collect::<Result<Vec<_>>>()?;

        let executor: Option<Box<dyn BatchExecutor<T>>> = match config.mode {
            ExecutionMode::Host => None,
            ExecutionMode::Offload => Some(Box::new(ReferenceExecutor::new(config.buffers.ping_pong))),
        };

        Ok(Self {
            graph,
            config,
            plan,
            routes,
            kernels,
            executor,
            rounds: 0,
        })
    }

    /// Sends batches to `executor` instead of expanding on the host.
    #[must_use]
    pub fn with_executor(mut self, executor: Box<dyn BatchExecutor<T>>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// The source graph.
    pub fn graph(&self) -> &Arc<CsrGraph<T>> {
        &self.graph
    }

    /// The configuration in use.
    pub fn config(&self) -> &HopConfig {
        &self.config
    }

    /// The deployment plan.
    pub fn plan(&self) -> &DeploymentPlan<T> {
        &self.plan
    }

    /// The coordinator's inter-kernel table.
    pub fn routes(&self) -> &DispatchTable<T> {
        &self.routes
    }

    /// Deployed kernels, by physical index.
    pub fn kernels(&self) -> impl ExactSizeIterator<Item = &Kernel<T>> + '_ {
        self.kernels.iter().map(|k| &**k)
    }

    /// Rounds completed by the last [`Coordinator::run`].
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    fn kernel_mut(&mut self, kernel: usize) -> Result<&mut Kernel<T>> {
        let kernels = self.kernels.len();
        self.kernels
            .get_mut(kernel)
            .map(|k| &mut **k)
            .ok_or(HopError::MissingKernel { kernel, kernels })
    }

    /// Replaces an overflow's single-kernel snapshot with every kernel's.
    fn with_report(&self, mut err: HopError) -> HopError {
        if let HopError::BufferFull { round, report, .. } = &mut err {
            let full = self.buffer_report(*round);
            error!(round = *round, peak = full.peak_ratio(), report = ?full, "buffer occupancy at overflow");
            **report = full;
        }
        err
    }

    fn route(&mut self, pack: HopPack<T>, round: usize) -> Result<usize> {
        let target = self
            .routes
            .select(pack.idx)
            .map_err(|source| HopError::Dispatch { kernel: None, source })?;
        trace!(src = %pack.src, des = %pack.des, idx = %pack.idx, hop = pack.hop, target, "route");
        let pushed = self.kernel_mut(target)?.push_input(pack, round);
        pushed.map_err(|e| self.with_report(e))?;
        Ok(target)
    }

    /// Seeds one hop-0 packet per pair into the kernel owning `src`.
    ///
    /// # Errors
    /// A full input buffer or a dispatch failure.
    pub fn dispatch(&mut self, pairs: &[(T, T)]) -> Result<()> {
        for &(src, des) in pairs {
            self.route(HopPack::seed(src, des), 0)?;
        }
        info!(pairs = pairs.len(), "dispatched query pairs");
        Ok(())
    }

    /// Runs one round on every kernel with input. Returns whether any
    /// kernel worked.
    ///
    /// # Errors
    /// The failure of the lowest-indexed failing kernel.
    pub fn compute(&mut self, round: usize, num_hops: u32) -> Result<bool> {
        let params = RoundParams {
            batch_size: self.config.batch_size,
            num_hops,
            bypass: self.config.bypass,
            duplicate: self.config.duplicate,
        };
        let backend = match &self.executor {
            Some(exec) => Backend::Device(exec.as_ref()),
            None => Backend::Host,
        };

        #[cfg(feature = "parallel")]
        let outcomes: Vec<Result<bool>> = self
            .kernels
            .par_iter_mut()
            .map(|k| k.run_round(round, &params, backend))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<Result<bool>> = self
            .kernels
            .iter_mut()
            .map(|k| k.run_round(round, &params, backend))
            .collect();

        outcomes
            .into_iter()
            .try_fold(false, |worked, r| Ok(r? || worked))
            .map_err(|e| self.with_report(e))
    }

    /// Moves every output packet into the input buffer of its owning kernel.
    /// Returns the number of packets moved.
    ///
    /// # Errors
    /// A full input buffer or a dispatch failure.
    pub fn switch(&mut self, round: usize) -> Result<usize> {
        let mut outgoing = Vec::new();
        for kernel in &mut self.kernels {
            outgoing.extend(kernel.drain_output());
        }
        for &pack in &outgoing {
            self.route(pack, round)?;
        }
        Ok(outgoing.len())
    }

    /// Answers `pairs` with walks of at most `num_hops` edges.
    ///
    /// Persists per-kernel and merged results when the configuration names
    /// an output path.
    ///
    /// # Errors
    /// Any dispatch, compute, switch or persistence failure.
    pub fn run(&mut self, pairs: &[(T, T)], num_hops: u32) -> Result<RunSummary> {
        let span = info_span!("nhop_run", pairs = pairs.len(), num_hops);
        let _guard = span.enter();

        self.dispatch(pairs)?;
        let mut round = 0;
        loop {
            let _round = info_span!("round", round).entered();
            if !self.compute(round, num_hops)? {
                break;
            }
            let switched = self.switch(round)?;
            debug!(report = ?self.buffer_report(round), "buffer report");
            info!(round, switched, "round complete");
            round += 1;
        }
        self.rounds = round;

        if let Some(output) = self.config.output.clone() {
            self.persist_kernel_results(&output)?;
            io::write_results(&output, &self.merge())?;
        }
        let summary = self.summary();
        info!(
            rounds = summary.rounds,
            matched_pairs = summary.matched_pairs,
            total_paths = summary.total_paths,
            "run complete"
        );
        Ok(summary)
    }

    /// Accumulates every kernel's aggregation buffer.
    pub fn merge(&self) -> MergedResult<T> {
        MergedResult::merge(self.kernels())
    }

    /// Occupancy of every kernel's buffers.
    pub fn buffer_report(&self, round: usize) -> BufferReport {
        BufferReport {
            round,
            kernels: self
                .kernels()
                .map(|k| KernelBuffers {
                    kernel: k.id(),
                    buffers: k.buffer_status(),
                })
                .collect(),
        }
    }

    /// `(kernel, lane)` of every lane holding channel partition `id`.
    pub fn locate_channel_partition(&self, id: usize) -> Vec<(usize, usize)> {
        self.kernels()
            .flat_map(|k| {
                k.channels()
                    .iter()
                    .enumerate()
                    .filter(move |(_, c)| c.partition_id() == id)
                    .map(move |(lane, _)| (k.id(), lane))
            })
            .collect()
    }

    /// Writes each kernel's aggregation records to `<base>_<kernel>`.
    ///
    /// # Errors
    /// Any I/O failure.
    pub fn persist_kernel_results(&self, base: &Path) -> Result<()> {
        for kernel in self.kernels() {
            let path = io::kernel_path(base, kernel.id());
            io::write_aggregation(&path, kernel.aggregation().iter())?;
            debug!(kernel = kernel.id(), path = %path.display(), records = kernel.aggregation().len(), "persisted kernel results");
        }
        Ok(())
    }

    /// Clears every kernel and rewinds the coordinator's table.
    pub fn reset(&mut self) {
        for kernel in &mut self.kernels {
            kernel.reset();
        }
        self.routes.reset_rotation();
        self.rounds = 0;
    }

    /// Figures for the last run.
    pub fn summary(&self) -> RunSummary {
        let merged = self.merge();
        let mut totals = HopStats::default();
        let kernels: Vec<KernelSummary> = self
            .kernels()
            .map(|k| {
                totals += *k.stats();
                KernelSummary {
                    kernel: k.id(),
                    partition: k.partition_id(),
                    aggregation_records: k.aggregation().len(),
                    stats: *k.stats(),
                }
            })
            .collect();
        RunSummary {
            rounds: self.rounds,
            node_count: self.graph.node_count(),
            edge_count: self.graph.edge_count(),
            channel_partitions: self.plan.partitions.len(),
            kernel_partitions: self.plan.kernel_partitions,
            num_kernels: self.kernels.len(),
            layout: self.plan.layout,
            matched_pairs: merged.len(),
            total_paths: merged.total(),
            edge_accesses: totals.expanded,
            totals,
            kernels,
        }
    }
}
