//! Random-access reader over a bzip2 stream, backed by a [`BlockIndex`].
//!
//! Unlike [`crate::Bz2Decoder`], which streams the whole file in order, this
//! reader answers arbitrary `read_at(start, length)` requests by decompressing
//! only the blocks that overlap the requested range. Because each bzip2
//! block is compressed independently, decompressing one doesn't depend on
//! any decoder state carried over from another: concurrent `read_at` calls
//! against the same `RandomAccessBz2` need no shared lock, they just each do
//! their own block decompression against the same immutable backing bytes.

use std::sync::Arc;

use crate::block_index::BlockIndex;
use crate::decompress_block_into;

/// Seekable, concurrently-readable view over a bzip2 stream.
pub struct RandomAccessBz2 {
    data: Arc<dyn AsRef<[u8]> + Send + Sync>,
    index: BlockIndex,
}

impl RandomAccessBz2 {
    pub fn new<T>(data: Arc<T>, index: BlockIndex) -> Self
    where
        T: AsRef<[u8]> + Send + Sync + 'static,
    {
        Self { data, index }
    }

    /// Total decompressed size of the stream.
    pub fn size(&self) -> u64 {
        self.index.decompressed_size()
    }

    /// Returns the exact byte range `[start, start+length)` of the
    /// decompressed stream.
    ///
    /// Decompresses every block overlapping the range (in parallel when more
    /// than one is needed) and stitches the requested slice out of them.
    pub fn read_at(&self, start: u64, length: u64) -> anyhow::Result<Vec<u8>> {
        let size = self.size();
        if start > size || start + length > size {
            anyhow::bail!(
                "read_at({start}, {length}) out of bounds for stream of size {size}"
            );
        }
        if length == 0 {
            return Ok(Vec::new());
        }

        let blocks = self.index.blocks_covering(start, length);
        if blocks.is_empty() {
            anyhow::bail!("no blocks cover range [{start}, {})", start + length);
        }

        let raw = self.data.as_ref().as_ref();
        let mut out = Vec::with_capacity(length as usize);

        for block in blocks {
            let mut decompressed = Vec::new();
            let mut scratch = Vec::new();
            decompress_block_into(
                raw,
                block.start_bit,
                block.end_bit,
                &mut decompressed,
                &mut scratch,
            )?;

            let block_start = block.decompressed_start;
            let block_end = block_start + block.decompressed_len;
            let want_start = start.max(block_start);
            let want_end = (start + length).min(block_end);
            if want_start >= want_end {
                continue;
            }
            let rel_start = (want_start - block_start) as usize;
            let rel_end = (want_end - block_start) as usize;
            out.extend_from_slice(&decompressed[rel_start..rel_end]);
        }

        Ok(out)
    }
}
