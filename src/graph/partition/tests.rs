//! Tests for partitioning and deployment sizing.

use super::*;

fn chain(n: usize) -> Arc<CsrGraph<u32>> {
    // i -> i + 1, last vertex has no edges
    let adj: Vec<Vec<usize>> = (0..n)
        .map(|i| if i + 1 < n { vec![i + 1] } else { vec![] })
        .collect();
    Arc::new(CsrGraph::from_adjacency(&adj).unwrap())
}

fn ranges(parts: &[CsrPartition<u32>]) -> Vec<(usize, usize)> {
    parts.iter().map(|p| (p.v_start(), p.v_end())).collect()
}

#[test]
fn test_even_split_nine_vertices() {
    let g = chain(9);
    let parts = partition(&g, 3, SizeLimits::unbounded()).unwrap();
    assert_eq!(ranges(&parts), vec![(0, 3), (3, 6), (6, 9)]);
    assert_eq!(parts.iter().map(CsrPartition::ne).sum::<usize>(), g.edge_count());
}

#[test]
fn test_vertex_limit_caps_share() {
    let g = chain(9);
    // 4 offset elements → at most 3 vertices per partition.
    let parts = partition(&g, 1, SizeLimits::new(4 * 4, usize::MAX)).unwrap();
    assert_eq!(ranges(&parts), vec![(0, 3), (3, 6), (6, 9)]);
    for p in &parts {
        assert!((p.nv() + 1) * 4 <= 16);
    }
}

#[test]
fn test_edge_limit_shrinks_boundary() {
    // 0 has four edges, everything else one.
    let adj = vec![vec![1, 2, 3, 4], vec![0], vec![0], vec![0], vec![0], vec![0]];
    let g = Arc::new(CsrGraph::<u32>::from_adjacency(&adj).unwrap());
    let limits = SizeLimits::new(usize::MAX, 4 * 4);
    let parts = partition(&g, 2, limits).unwrap();

    // Target is 3 vertices; [0, 3) holds 6 edges and shrinks to [0, 1).
    assert_eq!(parts[0].v_start(), 0);
    assert_eq!(parts[0].v_end(), 1);
    for p in &parts {
        assert!(limits.fits(p), "partition {:?} breaks limits", (p.v_start(), p.v_end()));
    }
    assert_eq!(parts.last().unwrap().v_end(), 6);
    assert!(parts.len() > 2);
}

#[test]
fn test_oversized_vertex_is_rejected() {
    let adj = vec![vec![1, 2, 3], vec![], vec![], vec![]];
    let g = Arc::new(CsrGraph::<u32>::from_adjacency(&adj).unwrap());
    let err = partition(&g, 1, SizeLimits::new(usize::MAX, 2 * 4)).unwrap_err();
    assert_eq!(err, PartitionError::VertexTooLarge { vertex: 0, degree: 3, max_edges: 2 });
}

#[test]
fn test_partition_argument_errors() {
    let g = chain(4);
    assert_eq!(partition(&g, 0, SizeLimits::unbounded()).unwrap_err(), PartitionError::ZeroPartitions);
    assert!(matches!(
        partition(&g, 1, SizeLimits::new(4, 1024)).unwrap_err(),
        PartitionError::LimitTooSmall { .. }
    ));
    let empty = Arc::new(CsrGraph::<u32>::default());
    assert_eq!(partition(&empty, 2, SizeLimits::unbounded()).unwrap_err(), PartitionError::Uninitialized);
    assert_eq!(partition_fixed(&empty, 2).unwrap_err(), PartitionError::Uninitialized);
}

#[test]
fn test_empty_graph_yields_one_empty_partition() {
    let g = Arc::new(CsrGraph::<u32>::from_csr_parts(vec![0], vec![]).unwrap());
    let parts = partition(&g, 4, SizeLimits::unbounded()).unwrap();
    assert_eq!(ranges(&parts), vec![(0, 0)]);
}

#[test]
fn test_partition_fixed_shares() {
    let g = chain(10);
    let parts = partition_fixed(&g, 4).unwrap();
    assert_eq!(ranges(&parts), vec![(0, 3), (3, 6), (6, 9), (9, 10)]);

    let parts = partition_fixed(&g, 20).unwrap();
    assert_eq!(parts.len(), 10);
}

#[test]
fn test_plan_single_kernel_uses_divisor() {
    let g = chain(12);
    // 12 vertices * 4 bytes = 48 bytes of offsets; 20 byte budget → 3 channels needed.
    let plan = plan_deployment(&g, 8, SizeLimits::new(20, 1024)).unwrap();
    assert_eq!(plan.channels_needed, 3);
    assert_eq!(plan.kernel_partitions, 1);
    match plan.layout {
        Layout::SingleKernel { divisor } => assert_eq!(divisor, 4),
        Layout::MultiKernel => panic!("expected single kernel layout"),
    }
    assert_eq!(plan.partitions.len(), 4);
    assert_eq!(plan.kernel_slice(0).len(), 4);
    for p in &plan.partitions {
        assert!(plan.limits.fits(p));
    }
}

#[test]
fn test_plan_multi_kernel() {
    let g = chain(40);
    // At most 3 vertices per channel.
    let plan = plan_deployment(&g, 4, SizeLimits::new(16, 1024)).unwrap();
    assert_eq!(plan.layout, Layout::MultiKernel);
    assert!(plan.partitions.len() <= plan.kernel_partitions * 4);
    assert_eq!(plan.kernel_partitions, plan.partitions.len().div_ceil(4));
    assert!(plan.kernel_partitions >= 4);

    // Kernel slices tile the partition list.
    let total: usize = (0..plan.kernel_partitions).map(|k| plan.kernel_slice(k).len()).sum();
    assert_eq!(total, plan.partitions.len());
    assert_eq!(plan.kernel_slice(1)[0].v_start(), plan.partitions[plan.first_channel_of(1)].v_start());
}

#[test]
fn test_plan_rejects_zero_channels() {
    let g = chain(3);
    assert_eq!(
        plan_deployment(&g, 0, SizeLimits::unbounded()).unwrap_err(),
        PartitionError::ZeroChannels
    );
}
