//! CSR storage, partition views and the deployment partitioner.
//!
//! - `csr`: the immutable whole-graph store and its vertex-range views
//! - `partition`: size-bounded splitting and deployment sizing

pub mod csr;
pub mod partition;

use core::fmt::{Debug, Display};
use core::hash::Hash;

use num_traits::{PrimInt, Unsigned};

pub use csr::{CsrGraph, CsrPartition, Shift};
pub use partition::{partition, partition_fixed, plan_deployment, DeploymentPlan, Layout, SizeLimits};

/// Unsigned element type of the offset and index arrays.
///
/// Implemented for `u32` and `u64`. Vertex ids travel in packets as this type;
/// the element width drives all byte-limit arithmetic.
pub trait GraphIndex:
    PrimInt + Unsigned + Hash + Default + Debug + Display + Send + Sync + 'static
{
    /// Width of one element in bytes.
    const BYTES: usize;

    /// The value as a native index.
    fn index(self) -> usize;

    /// Converts a native index, `None` if it does not fit.
    fn from_index(i: usize) -> Option<Self>;

    /// The value widened to `u64` (for diagnostics and persistence).
    fn to_wide(self) -> u64;
}

macro_rules! impl_graph_index {
    ($($t:ty),*) => {
        $(
            impl GraphIndex for $t {
                const BYTES: usize = core::mem::size_of::<$t>();

                #[inline]
                #[allow(clippy::cast_possible_truncation)]
                fn index(self) -> usize {
                    // Host targets are 64-bit; u64 ids fit a usize there.
                    self as usize
                }

                #[inline]
                fn from_index(i: usize) -> Option<Self> {
                    <$t>::try_from(i).ok()
                }

                #[inline]
                fn to_wide(self) -> u64 {
                    u64::from(self)
                }
            }
        )*
    };
}

impl_graph_index!(u32, u64);
