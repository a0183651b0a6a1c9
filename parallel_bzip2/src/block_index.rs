//! Block-offset index: maps bzip2 compressed-bitstream positions to
//! decompressed byte offsets, enabling O(1) seek into a bzip2 stream.
//!
//! Building the index requires decompressing every block once (bzip2 blocks
//! are independently compressed, so their decompressed length is not known
//! without doing the work), but the result can be persisted and reloaded so
//! later opens skip straight to random access.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{decompress_block_into, scan_blocks};

/// One bzip2 block's position in both the compressed bitstream and the
/// decompressed byte stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockEntry {
    pub start_bit: u64,
    pub end_bit: u64,
    /// Offset of this block's first decompressed byte.
    pub decompressed_start: u64,
    /// Number of decompressed bytes this block expands to.
    pub decompressed_len: u64,
}

/// Ordered table of block positions for one bzip2 stream.
///
/// `entries` is sorted by `decompressed_start` (equivalently by `start_bit`,
/// since blocks appear in the bitstream in the order they decompress to).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockIndex {
    pub entries: Vec<BlockEntry>,
    /// Current format version, bumped whenever the serialised shape changes.
    /// A sidecar written by a different version is treated as corrupt.
    pub version: u32,
}

const FORMAT_VERSION: u32 = 1;

impl BlockIndex {
    /// Scans `data` and decompresses every block once to learn its
    /// decompressed length, building the full offset table.
    ///
    /// This is the expensive, one-time path (driven in parallel over all
    /// available cores); `load`/`save` exist so it only has to run once per
    /// archive.
    pub fn build(data: &[u8]) -> anyhow::Result<Self> {
        let boundaries: Vec<(u64, u64)> = scan_blocks(data).into_iter().collect();

        let mut entries: Vec<BlockEntry> = boundaries
            .into_par_iter()
            .map(|(start_bit, end_bit)| -> anyhow::Result<BlockEntry> {
                let mut out = Vec::new();
                let mut scratch = Vec::new();
                decompress_block_into(data, start_bit, end_bit, &mut out, &mut scratch)?;
                Ok(BlockEntry {
                    start_bit,
                    end_bit,
                    decompressed_start: 0, // filled in below once ordering is known
                    decompressed_len: out.len() as u64,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        entries.sort_by_key(|e| e.start_bit);

        let mut cursor = 0u64;
        for entry in entries.iter_mut() {
            entry.decompressed_start = cursor;
            cursor += entry.decompressed_len;
        }

        Ok(Self {
            entries,
            version: FORMAT_VERSION,
        })
    }

    /// Total decompressed length of the stream this index describes.
    pub fn decompressed_size(&self) -> u64 {
        self.entries
            .last()
            .map(|e| e.decompressed_start + e.decompressed_len)
            .unwrap_or(0)
    }

    /// Returns the contiguous run of blocks covering `[start, start+len)`.
    ///
    /// Empty if the range is out of bounds or `len == 0`.
    pub fn blocks_covering(&self, start: u64, len: u64) -> &[BlockEntry] {
        if len == 0 || self.entries.is_empty() {
            return &[];
        }
        let end = start + len;

        let first = self
            .entries
            .partition_point(|e| e.decompressed_start + e.decompressed_len <= start);
        if first >= self.entries.len() {
            return &[];
        }
        let last = self
            .entries
            .partition_point(|e| e.decompressed_start < end);
        &self.entries[first..last]
    }

    /// Serialises the table to the opaque sidecar format. Stable within one
    /// `FORMAT_VERSION`; bumping the version invalidates old sidecars.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialises a sidecar, rejecting anything written by a different
    /// format version so the caller can rebuild instead of trusting stale
    /// data (spec's `CorruptBlockIndex` recovery policy).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlockIndexError> {
        let index: Self = serde_json::from_slice(bytes)?;
        if index.version != FORMAT_VERSION {
            return Err(BlockIndexError::VersionMismatch {
                found: index.version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(index)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BlockIndexError {
    #[error("block index sidecar is not valid: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("block index sidecar version {found} does not match expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;

    fn bzip2_compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn build_single_block_roundtrip() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let compressed = bzip2_compress(&payload);

        let index = BlockIndex::build(&compressed).unwrap();
        assert_eq!(index.decompressed_size(), payload.len() as u64);
        assert!(!index.entries.is_empty());

        for entry in &index.entries {
            let mut scratch = Vec::new();
            let mut out = Vec::new();
            super::decompress_block_into(
                &compressed,
                entry.start_bit,
                entry.end_bit,
                &mut out,
                &mut scratch,
            )
            .unwrap();
            assert_eq!(out.len() as u64, entry.decompressed_len);
            let start = entry.decompressed_start as usize;
            let end = start + out.len();
            assert_eq!(&payload[start..end], &out[..]);
        }
    }

    #[test]
    fn blocks_covering_is_contiguous_and_bounds_checked() {
        let payload = vec![42u8; 2_000_000];
        let compressed = bzip2_compress(&payload);
        let index = BlockIndex::build(&compressed).unwrap();

        if index.entries.len() < 2 {
            // bzip2 may keep small-enough payloads in a single block; nothing
            // more to exercise here.
            return;
        }

        let mid = index.decompressed_size() / 2;
        let covering = index.blocks_covering(mid, 10);
        assert!(!covering.is_empty());
        assert!(covering[0].decompressed_start <= mid);

        assert!(index.blocks_covering(index.decompressed_size(), 1).is_empty());
    }

    #[test]
    fn serialisation_round_trips() {
        let payload = b"round trip me please".repeat(50);
        let compressed = bzip2_compress(&payload);
        let index = BlockIndex::build(&compressed).unwrap();

        let bytes = index.to_bytes().unwrap();
        let restored = BlockIndex::from_bytes(&bytes).unwrap();
        assert_eq!(index.entries, restored.entries);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let payload = b"short".to_vec();
        let compressed = bzip2_compress(&payload);
        let mut index = BlockIndex::build(&compressed).unwrap();
        index.version = FORMAT_VERSION + 1;
        let bytes = index.to_bytes().unwrap();
        assert!(matches!(
            BlockIndex::from_bytes(&bytes),
            Err(BlockIndexError::VersionMismatch { .. })
        ));
    }
}
