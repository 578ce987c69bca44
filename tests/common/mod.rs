#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use nhop::config::BufferConfig;
use nhop::{CsrGraph, HopConfig};
use petgraph::graph::{DiGraph, NodeIndex};

/// 0 -> 1, 2 ; 1 -> 3, 5 ; 2 -> 5 ; 3 -> 5 ; 4 -> 5 ; 5 -> 6 ; 6 ->
pub fn walk_graph() -> Arc<CsrGraph<u32>> {
    Arc::new(CsrGraph::from_csr_parts(vec![0, 2, 4, 5, 6, 7, 8, 8], vec![1, 2, 3, 5, 5, 5, 5, 6]).unwrap())
}

pub fn to_petgraph(adjacency: &[Vec<usize>]) -> DiGraph<(), ()> {
    let mut g = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..adjacency.len()).map(|_| g.add_node(())).collect();
    for (v, ns) in adjacency.iter().enumerate() {
        for &n in ns {
            g.add_edge(nodes[v], nodes[n], ());
        }
    }
    g
}

/// Walks from `src` of at most `hops` edges that end at their first visit to `des`.
pub fn reference_count(g: &DiGraph<(), ()>, src: usize, des: usize, hops: u32) -> u64 {
    let mut frontier: HashMap<NodeIndex, u64> = HashMap::from([(NodeIndex::new(src), 1)]);
    let mut total = 0;
    for h in 1..=hops {
        let mut next: HashMap<NodeIndex, u64> = HashMap::new();
        for (&v, &c) in &frontier {
            for n in g.neighbors(v) {
                if n.index() == des {
                    total += c;
                } else if h < hops {
                    *next.entry(n).or_insert(0) += c;
                }
            }
        }
        frontier = next;
    }
    total
}

pub fn reference_counts(adjacency: &[Vec<usize>], pairs: &[(u32, u32)], hops: u32) -> BTreeMap<(u32, u32), u64> {
    let g = to_petgraph(adjacency);
    let mut out = BTreeMap::new();
    for &(s, d) in pairs {
        let c = reference_count(&g, s as usize, d as usize, hops);
        if c > 0 {
            *out.entry((s, d)).or_insert(0) += c;
        }
    }
    out
}

/// Deterministic pseudo-random adjacency with out-degree below `max_degree`.
pub fn random_adjacency(nv: usize, max_degree: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    let mut next = move || {
        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        (state >> 33) as usize
    };
    (0..nv)
        .map(|_| {
            let d = next() % max_degree;
            (0..d).map(|_| next() % nv).collect()
        })
        .collect()
}

/// Small channels force a multi-kernel deployment: three vertices per channel.
pub fn multi_kernel_config(num_kernels: usize) -> HopConfig {
    HopConfig {
        num_kernels,
        channels_per_kernel: 2,
        limit_offset_bytes: 16,
        limit_index_bytes: 1 << 20,
        batch_size: 8,
        buffers: BufferConfig::uniform(4096),
        ..HopConfig::default()
    }
}

pub fn single_kernel_config() -> HopConfig {
    HopConfig {
        num_kernels: 1,
        channels_per_kernel: 2,
        buffers: BufferConfig::uniform(64),
        ..HopConfig::default()
    }
}
