//! Deterministic accumulation of per-kernel matches.

use std::collections::BTreeMap;

use crate::buffer::AggPack;
use crate::graph::GraphIndex;
use crate::kernel::Kernel;

/// Path counts keyed by `(src, des)`, ordered by `src` then `des`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedResult<T> {
    counts: BTreeMap<(T, T), u64>,
}

impl<T: GraphIndex> Default for MergedResult<T> {
    fn default() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }
}

impl<T: GraphIndex> MergedResult<T> {
    /// An empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates one aggregation record.
    pub fn add(&mut self, agg: &AggPack<T>) {
        *self.counts.entry((agg.src, agg.des)).or_insert(0) += u64::from(agg.count);
    }

    /// Merges the aggregation buffers of `kernels`. The result does not
    /// depend on kernel order.
    pub fn merge<'a, I>(kernels: I) -> Self
    where
        I: IntoIterator<Item = &'a Kernel<T>>,
    {
        let mut merged = Self::new();
        for kernel in kernels {
            merged.extend(kernel.aggregation().iter());
        }
        merged
    }

    /// Count for `(src, des)`, zero if no path was found.
    pub fn get(&self, src: T, des: T) -> u64 {
        self.counts.get(&(src, des)).copied().unwrap_or(0)
    }

    /// Distinct pairs with at least one path.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether no pair matched.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum over all pairs.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// `((src, des), count)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = ((T, T), u64)> + '_ {
        self.counts.iter().map(|(&k, &v)| (k, v))
    }
}

impl<'a, T: GraphIndex> Extend<&'a AggPack<T>> for MergedResult<T> {
    fn extend<I: IntoIterator<Item = &'a AggPack<T>>>(&mut self, iter: I) {
        for agg in iter {
            self.add(agg);
        }
    }
}

impl<'a, T: GraphIndex> FromIterator<&'a AggPack<T>> for MergedResult<T> {
    fn from_iter<I: IntoIterator<Item = &'a AggPack<T>>>(iter: I) -> Self {
        let mut merged = Self::new();
        merged.extend(iter);
        merged
    }
}
