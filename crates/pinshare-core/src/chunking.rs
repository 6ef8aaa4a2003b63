//! Buffer sizing for the payload phase.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * KIB;
pub const GIB: usize = 1024 * MIB;

/// Largest explicit chunk size accepted.
pub const MAX_CHUNK_SIZE: usize = 64 * MIB;

/// The chunk size older callers passed when they meant "pick for me".
pub const LEGACY_DEFAULT_CHUNK_SIZE: usize = MIB;

/// Recommended buffer size for a payload of `total_size` bytes.
///
/// Small files keep memory low; large ones use bigger buffers to keep a
/// gigabit link busy.
pub fn optimal_chunk_size(total_size: u64) -> usize {
    const TEN_MIB: u64 = 10 * MIB as u64;
    const HUNDRED_MIB: u64 = 100 * MIB as u64;
    const ONE_GIB: u64 = GIB as u64;

    match total_size {
        s if s < TEN_MIB => 64 * KIB,
        s if s < HUNDRED_MIB => MIB,
        s if s < ONE_GIB => 4 * MIB,
        _ => 8 * MIB,
    }
}

/// How the caller wants the chunk size chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSizing {
    /// Use [`optimal_chunk_size`] for the payload size.
    #[default]
    Auto,
    /// Use exactly this many bytes.
    Fixed(usize),
}

impl ChunkSizing {
    /// Explicit size between 1 byte and [`MAX_CHUNK_SIZE`].
    pub fn fixed(bytes: usize) -> crate::Result<Self> {
        let sizing = ChunkSizing::Fixed(bytes);
        sizing.validate()?;
        Ok(sizing)
    }

    pub fn validate(self) -> crate::Result<()> {
        match self {
            ChunkSizing::Fixed(0) => Err(crate::TransferError::Validation(
                "chunk size must be positive".into(),
            )),
            ChunkSizing::Fixed(bytes) if bytes > MAX_CHUNK_SIZE => {
                Err(crate::TransferError::Validation(format!(
                    "chunk size {} exceeds the {} byte limit",
                    bytes, MAX_CHUNK_SIZE
                )))
            }
            _ => Ok(()),
        }
    }

    /// Interpret a bare number the way older callers did: the 1 MiB default
    /// means automatic, anything else is explicit.
    pub fn from_legacy(bytes: usize) -> crate::Result<Self> {
        if bytes == LEGACY_DEFAULT_CHUNK_SIZE {
            Ok(ChunkSizing::Auto)
        } else {
            Self::fixed(bytes)
        }
    }

    pub fn resolve(self, total_size: u64) -> usize {
        match self {
            ChunkSizing::Auto => optimal_chunk_size(total_size),
            ChunkSizing::Fixed(bytes) => bytes,
        }
    }

    pub fn is_auto(self) -> bool {
        matches!(self, ChunkSizing::Auto)
    }
}

impl fmt::Display for ChunkSizing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkSizing::Auto => f.write_str("auto"),
            ChunkSizing::Fixed(bytes) => write!(f, "{} bytes", bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        let mib = MIB as u64;
        assert_eq!(optimal_chunk_size(0), 64 * KIB);
        assert_eq!(optimal_chunk_size(5 * mib), 64 * KIB);
        assert_eq!(optimal_chunk_size(10 * mib - 1), 64 * KIB);
        assert_eq!(optimal_chunk_size(10 * mib), MIB);
        assert_eq!(optimal_chunk_size(50 * mib), MIB);
        assert_eq!(optimal_chunk_size(100 * mib), 4 * MIB);
        assert_eq!(optimal_chunk_size(500 * mib), 4 * MIB);
        assert_eq!(optimal_chunk_size(GIB as u64 - 1), 4 * MIB);
        assert_eq!(optimal_chunk_size(GIB as u64), 8 * MIB);
        assert_eq!(optimal_chunk_size(2 * GIB as u64), 8 * MIB);
        assert_eq!(optimal_chunk_size(u64::MAX), 8 * MIB);
    }

    #[test]
    fn test_non_decreasing() {
        let mut prev = 0;
        let mut size = 1u64;
        while size < u64::MAX / 4 {
            let chunk = optimal_chunk_size(size);
            assert!(chunk >= prev, "chunk size dropped at {size}");
            prev = chunk;
            size = size * 3 / 2 + 1;
        }
    }

    #[test]
    fn test_explicit_size_is_honoured() {
        let big = 2 * GIB as u64;
        assert_eq!(ChunkSizing::Auto.resolve(big), 8 * MIB);
        assert_eq!(ChunkSizing::fixed(MIB).unwrap().resolve(big), MIB);
        assert_eq!(ChunkSizing::fixed(4096).unwrap().resolve(10), 4096);
        assert!(ChunkSizing::fixed(0).is_err());
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        assert!(ChunkSizing::fixed(MAX_CHUNK_SIZE).is_ok());
        assert!(ChunkSizing::fixed(MAX_CHUNK_SIZE + 1).is_err());
        assert!(ChunkSizing::fixed(usize::MAX).is_err());
        assert!(ChunkSizing::Fixed(usize::MAX).validate().is_err());
        assert!(ChunkSizing::Auto.validate().is_ok());
    }

    #[test]
    fn test_legacy_sentinel() {
        assert_eq!(ChunkSizing::from_legacy(MIB).unwrap(), ChunkSizing::Auto);
        assert_eq!(ChunkSizing::from_legacy(8192).unwrap(), ChunkSizing::Fixed(8192));
    }

    #[test]
    fn test_serde_shape() {
        assert_eq!(serde_json::to_string(&ChunkSizing::Auto).unwrap(), "\"auto\"");
        let parsed: ChunkSizing = serde_json::from_str("{\"fixed\":65536}").unwrap();
        assert_eq!(parsed, ChunkSizing::Fixed(65536));
    }
}
