mod common;

use std::sync::Arc;

use common::*;
use nhop::config::{BufferConfig, ConfigError};
use nhop::error::Stage;
use nhop::executor::{BatchRequest, BatchResponse, ExecutorError};
use nhop::graph::Layout;
use nhop::{
    io, BatchExecutor, Coordinator, CsrGraph, ExecutionMode, HopConfig, HopError, ReferenceExecutor, StatusCode,
};

#[test]
fn two_hop_walks_match_adjacency_square() {
    let mut c = Coordinator::new(walk_graph(), single_kernel_config()).unwrap();
    let summary = c.run(&[(0, 5)], 2).unwrap();

    // A^2[0][5]: 0 -> 1 -> 5 and 0 -> 2 -> 5.
    assert_eq!(c.merge().get(0, 5), 2);
    assert_eq!(summary.total_paths, 2);
    assert_eq!(summary.matched_pairs, 1);
    assert_eq!(summary.rounds, 1);
    assert_eq!(summary.totals.dropped, 1);
}

#[test]
fn unreachable_pair_reports_nothing() {
    let mut c = Coordinator::new(walk_graph(), single_kernel_config()).unwrap();
    c.run(&[(6, 0), (5, 0)], 4).unwrap();
    assert!(c.merge().is_empty());
}

#[test]
fn multi_kernel_counts_match_reference() {
    let adjacency = random_adjacency(24, 4, 7);
    let graph = Arc::new(CsrGraph::<u32>::from_adjacency(&adjacency).unwrap());
    let pairs: Vec<(u32, u32)> = (0..24u32).flat_map(|s| [(s, (s * 7 + 3) % 24), (s, (s + 11) % 24)]).collect();

    let mut c = Coordinator::new(graph, multi_kernel_config(12)).unwrap();
    assert_eq!(c.plan().layout, Layout::MultiKernel);
    assert!(c.plan().kernel_partitions > 1);
    let summary = c.run(&pairs, 4).unwrap();

    let merged: Vec<((u32, u32), u64)> = c.merge().iter().collect();
    let expected: Vec<((u32, u32), u64)> = reference_counts(&adjacency, &pairs, 4).into_iter().collect();
    assert_eq!(merged, expected);
    assert!(summary.totals.sent > 0, "packets never crossed kernels");
    assert!(summary.rounds > 1);
}

#[test]
fn offload_matches_host() {
    let adjacency = random_adjacency(30, 4, 11);
    let graph = Arc::new(CsrGraph::<u32>::from_adjacency(&adjacency).unwrap());
    let pairs: Vec<(u32, u32)> = (0..30u32).map(|s| (s, (s * 13 + 5) % 30)).collect();

    let mut host = Coordinator::new(Arc::clone(&graph), multi_kernel_config(12)).unwrap();
    host.run(&pairs, 3).unwrap();

    for bypass in [false, true] {
        let config = HopConfig {
            mode: ExecutionMode::Offload,
            bypass,
            ..multi_kernel_config(12)
        };
        let mut device = Coordinator::new(Arc::clone(&graph), config)
            .unwrap()
            .with_executor(Box::new(ReferenceExecutor::new(1 << 12)));
        let summary = device.run(&pairs, 3).unwrap();
        assert_eq!(device.merge(), host.merge(), "bypass = {bypass}");
        assert!(summary.totals.batches > 0);
    }
}

#[test]
fn too_few_kernels_is_insufficient_devices() {
    let adjacency = random_adjacency(24, 3, 5);
    let graph = Arc::new(CsrGraph::<u32>::from_adjacency(&adjacency).unwrap());
    let err = Coordinator::new(graph, multi_kernel_config(1)).unwrap_err();
    assert!(matches!(err, HopError::InsufficientDevices { available: 1, .. }));
    assert_eq!(err.status_code(), StatusCode::InsufficientDevices);
}

#[test]
fn replicated_kernels_share_dispatch_round_robin() {
    let config = HopConfig { num_kernels: 3, ..single_kernel_config() };
    let mut c = Coordinator::new(walk_graph(), config).unwrap();
    assert_eq!(c.plan().kernel_partitions, 1);
    assert_eq!(c.routes().copy_count(0), 3);

    let pairs = vec![(0, 5); 6];
    c.dispatch(&pairs).unwrap();
    let pushed: Vec<u64> = c.kernels().map(|k| k.stats().pushed).collect();
    assert_eq!(pushed, vec![2, 2, 2]);

    c.reset();
    let summary = c.run(&pairs, 2).unwrap();
    assert_eq!(c.merge().get(0, 5), 12);
    assert!(summary.kernels.iter().all(|k| k.aggregation_records == 4));
}

#[test]
fn input_overflow_aborts_dispatch() {
    let config = HopConfig {
        buffers: BufferConfig { input: 1, ..BufferConfig::uniform(64) },
        ..single_kernel_config()
    };
    let mut c = Coordinator::new(walk_graph(), config).unwrap();
    let err = c.run(&[(0, 5), (1, 5)], 2).unwrap_err();
    assert!(matches!(err, HopError::BufferFull { kernel: 0, round: 0, stage: Stage::Input, .. }));
    assert_eq!(err.status_code(), StatusCode::AllocationFailed);
}

/// 12 vertices in four 3-vertex channel partitions; kernel 0 owns `0..6`.
/// Vertex 0 fans out to four vertices of kernel 1.
fn fan_out_graph() -> Arc<CsrGraph<u32>> {
    let mut adjacency = vec![Vec::new(); 12];
    adjacency[0] = vec![6, 7, 8, 9];
    Arc::new(CsrGraph::from_adjacency(&adjacency).unwrap())
}

#[test]
fn switch_overflow_reports_every_kernel() {
    let config = HopConfig {
        buffers: BufferConfig { input: 3, ..BufferConfig::uniform(64) },
        ..multi_kernel_config(2)
    };
    let mut c = Coordinator::new(fan_out_graph(), config).unwrap();
    assert_eq!(c.plan().kernel_partitions, 2);

    let err = c.run(&[(0, 11)], 3).unwrap_err();
    assert_eq!(err.status_code().code(), -8);
    match err {
        HopError::BufferFull { kernel, round, stage, source, report } => {
            assert_eq!((kernel, round, stage), (1, 0, Stage::Input));
            assert_eq!(source.capacity, 3);
            assert_eq!(report.round, 0);
            let kernels: Vec<usize> = report.kernels.iter().map(|k| k.kernel).collect();
            assert_eq!(kernels, vec![0, 1]);
            assert_eq!(report.kernels[1].buffers[0].len, 3);
        }
        other => panic!("unexpected error {other}"),
    }
}

struct FailingDevice;

impl BatchExecutor<u32> for FailingDevice {
    fn run_batch(&self, _: &BatchRequest<'_, u32>) -> Result<BatchResponse, ExecutorError> {
        Err(ExecutorError::new(-5, "device lost"))
    }
}

#[test]
fn device_failure_aborts_the_round() {
    let config = HopConfig { mode: ExecutionMode::Offload, ..single_kernel_config() };
    let mut c = Coordinator::new(walk_graph(), config)
        .unwrap()
        .with_executor(Box::new(FailingDevice));
    let err = c.run(&[(0, 5)], 2).unwrap_err();
    match &err {
        HopError::Executor { kernel, round, source } => {
            assert_eq!((*kernel, *round), (0, 0));
            assert_eq!(source.status, -5);
            assert_eq!(source.message, "device lost");
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(err.status_code(), StatusCode::Failure);
}

#[test]
fn zero_hops_find_nothing_on_either_backend() {
    let pairs = [(4, 5), (0, 1)];
    let mut host = Coordinator::new(walk_graph(), single_kernel_config()).unwrap();
    host.run(&pairs, 0).unwrap();
    assert!(host.merge().is_empty());

    let config = HopConfig { mode: ExecutionMode::Offload, ..single_kernel_config() };
    let mut device = Coordinator::new(walk_graph(), config).unwrap();
    device.run(&pairs, 0).unwrap();
    assert_eq!(device.merge(), host.merge());
}

#[test]
fn duplicate_lanes_need_one_kernel() {
    let adjacency = random_adjacency(24, 3, 5);
    let graph = Arc::new(CsrGraph::<u32>::from_adjacency(&adjacency).unwrap());
    let config = HopConfig { duplicate: true, ..multi_kernel_config(12) };
    let err = Coordinator::new(graph, config).unwrap_err();
    assert!(matches!(err, HopError::Config(ConfigError::DuplicateMultiKernel(n)) if n > 1), "{err}");
}

#[test]
fn duplicate_lanes_match_host_counts() {
    let pairs = [(0, 5), (0, 6), (1, 6), (4, 6)];
    let mut host = Coordinator::new(walk_graph(), single_kernel_config()).unwrap();
    host.run(&pairs, 3).unwrap();

    let config = HopConfig {
        mode: ExecutionMode::Offload,
        duplicate: true,
        ..single_kernel_config()
    };
    let mut device = Coordinator::new(walk_graph(), config).unwrap();
    let summary = device.run(&pairs, 3).unwrap();
    assert_eq!(device.merge(), host.merge());
    assert_eq!(summary.totals.sent, 0);
    // 0 -> 1 -> 5, 0 -> 2 -> 5 and 0 -> 1 -> 3 -> 5.
    assert_eq!(device.merge().get(0, 5), 3);
}

#[test]
fn invalid_config_is_rejected_before_deployment() {
    let config = HopConfig { request_load: 101, ..single_kernel_config() };
    let err = Coordinator::new(walk_graph(), config).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::ComputeUnitSetup);
}

#[test]
fn locate_channel_partition_lists_every_lane() {
    let config = HopConfig { channels_per_kernel: 4, ..single_kernel_config() };
    let c = Coordinator::new(walk_graph(), config).unwrap();
    assert_eq!(c.plan().partitions.len(), 1);
    assert_eq!(c.locate_channel_partition(0), vec![(0, 0), (0, 1), (0, 2), (0, 3)]);
    assert!(c.locate_channel_partition(1).is_empty());
}

#[test]
fn results_persist_per_kernel_and_merged() {
    let dir = std::env::temp_dir().join(format!("nhop-persist-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let output = dir.join("result.txt");

    let adjacency = random_adjacency(24, 4, 3);
    let graph = Arc::new(CsrGraph::<u32>::from_adjacency(&adjacency).unwrap());
    let pairs: Vec<(u32, u32)> = (0..24u32).map(|s| (s, (s + 5) % 24)).collect();
    let config = HopConfig { output: Some(output.clone()), ..multi_kernel_config(12) };
    let mut c = Coordinator::new(graph, config).unwrap();
    c.run(&pairs, 4).unwrap();

    let merged: Vec<(u64, u64, u64)> = c
        .merge()
        .iter()
        .map(|((s, d), n)| (u64::from(s), u64::from(d), n))
        .collect();
    assert_eq!(io::read_results(&output).unwrap(), merged);

    let mut per_kernel_total = 0;
    for k in 0..c.kernels().len() {
        let records = io::read_results(io::kernel_path(&output, k)).unwrap();
        per_kernel_total += records.iter().map(|r| r.2).sum::<u64>();
    }
    assert_eq!(per_kernel_total, c.merge().total());
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn summary_serializes_to_json() {
    let mut c = Coordinator::new(walk_graph(), single_kernel_config()).unwrap();
    let summary = c.run(&[(0, 5)], 2).unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["total_paths"], 2);
    assert_eq!(json["layout"], "single-kernel/1");
    assert_eq!(json["kernels"][0]["stats"]["aggregated"], 2);

    let report = serde_json::to_value(c.buffer_report(summary.rounds)).unwrap();
    assert_eq!(report["kernels"][0]["buffers"][4]["stage"], "agg");
    assert_eq!(report["kernels"][0]["buffers"][4]["len"], 2);
}

#[test]
fn reset_allows_identical_rerun() {
    let mut c = Coordinator::new(walk_graph(), single_kernel_config()).unwrap();
    let first = c.run(&[(0, 5), (0, 6)], 3).unwrap();
    let merged = c.merge();
    c.reset();
    assert!(c.merge().is_empty());
    let second = c.run(&[(0, 5), (0, 6)], 3).unwrap();
    assert_eq!(c.merge(), merged);
    assert_eq!(first, second);
}
