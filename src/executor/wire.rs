//! Packed little-endian records exchanged with the accelerator.
//!
//! Every record is 16 bytes: `src`, `des`, `idx`, `hop` as little-endian
//! `u32`. Vertex ids wider than 32 bits cannot cross the boundary.

use thiserror::Error;
use zerocopy::byteorder::{LE, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::buffer::HopPack;
use crate::graph::GraphIndex;

/// Bytes per record.
pub const RECORD_BYTES: usize = 16;

/// One packed record.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, AsBytes, FromBytes, FromZeroes)]
pub struct WireRecord {
    /// Query source.
    pub src: U32<LE>,
    /// Query destination.
    pub des: U32<LE>,
    /// Frontier vertex, or a match count in coalesced local records.
    pub idx: U32<LE>,
    /// Hops walked.
    pub hop: U32<LE>,
}

/// Serialization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// A vertex id does not fit 32 bits.
    #[error("vertex id {0} does not fit a 32-bit wire field")]
    FieldOverflow(u64),
    /// A buffer is shorter than its declared record count.
    #[error("buffer of {len} bytes cannot hold {count} records")]
    Truncated {
        /// Buffer length.
        len: usize,
        /// Declared records.
        count: usize,
    },
}

fn narrow<T: GraphIndex>(v: T) -> Result<U32<LE>, WireError> {
    let wide = v.to_wide();
    u32::try_from(wide)
        .map(U32::new)
        .map_err(|_| WireError::FieldOverflow(wide))
}

fn widen<T: GraphIndex>(v: U32<LE>) -> Result<T, WireError> {
    let raw = v.get();
    usize::try_from(raw)
        .ok()
        .and_then(T::from_index)
        .ok_or(WireError::FieldOverflow(u64::from(raw)))
}

impl WireRecord {
    /// Packs a hop packet.
    ///
    /// # Errors
    /// [`WireError::FieldOverflow`] for ids above `u32::MAX`.
    pub fn from_pack<T: GraphIndex>(pack: &HopPack<T>) -> Result<Self, WireError> {
        Ok(Self {
            src: narrow(pack.src)?,
            des: narrow(pack.des)?,
            idx: narrow(pack.idx)?,
            hop: U32::new(pack.hop),
        })
    }

    /// Unpacks into a hop packet.
    ///
    /// # Errors
    /// [`WireError::FieldOverflow`] if `T` cannot hold a field.
    pub fn to_pack<T: GraphIndex>(&self) -> Result<HopPack<T>, WireError> {
        Ok(HopPack {
            src: widen(self.src)?,
            des: widen(self.des)?,
            idx: widen(self.idx)?,
            hop: self.hop.get(),
        })
    }
}

/// Packs `packs` into a contiguous byte buffer.
///
/// # Errors
/// [`WireError::FieldOverflow`] for ids above `u32::MAX`.
pub fn encode<T: GraphIndex>(packs: &[HopPack<T>]) -> Result<Vec<u8>, WireError> {
    let mut bytes = Vec::with_capacity(packs.len() * RECORD_BYTES);
    for pack in packs {
        bytes.extend_from_slice(WireRecord::from_pack(pack)?.as_bytes());
    }
    Ok(bytes)
}

/// Packs raw records, for device-side producers.
pub fn encode_records(records: &[WireRecord]) -> Vec<u8> {
    records.as_bytes().to_vec()
}

/// Reads the first `count` records of `bytes`.
///
/// # Errors
/// [`WireError::Truncated`] if `bytes` is shorter than `count` records.
pub fn decode(bytes: &[u8], count: usize) -> Result<Vec<WireRecord>, WireError> {
    let needed = count.checked_mul(RECORD_BYTES).unwrap_or(usize::MAX);
    if bytes.len() < needed {
        return Err(WireError::Truncated {
            len: bytes.len(),
            count,
        });
    }
    Ok(bytes[..needed]
        .chunks_exact(RECORD_BYTES)
        .filter_map(WireRecord::read_from)
        .collect())
}
