//! Uniform seekable byte-stream view over a source archive (C3), hiding
//! whether the bytes come from an in-memory 7z member (small shape) or an
//! indexed bzip2 stream wrapped in a 7z container (large shape, spec §3).

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parallel_bzip2::{BlockIndex, RandomAccessBz2};

use crate::error::ArchiveError;
use crate::magic_offset::MagicOffsetStream;

use super::digest::digest_file;
use super::extractor::{self, Row};

enum Backing {
    /// Small shape: the whole member was small enough to extract once and
    /// hold in memory (Posts.xml/Tags.xml inside a `*.com.7z`).
    Memory(Arc<Vec<u8>>),
    /// Large shape: an indexed bzip2 stream served by random access.
    Bzip2(RandomAccessBz2),
}

/// A seekable view over one archive member, plus the information needed to
/// compute its content digest.
pub struct ArchiveReader {
    backing: Backing,
    /// Path of the underlying archive file, used for `digest()`. `None` for
    /// reader instances built directly from bytes in tests.
    source_path: Option<PathBuf>,
}

impl ArchiveReader {
    /// Opens a small-shape member (`Posts.xml` or `Tags.xml`) by extracting
    /// it from the 7z container into memory.
    pub fn open_small_shape(archive_path: &Path, member: &str) -> Result<Self, ArchiveError> {
        let file = fs::File::open(archive_path).map_err(|source| ArchiveError::Io {
            path: archive_path.to_path_buf(),
            source,
        })?;
        let mut sz = sevenz_rust2::SevenZReader::new(file, sevenz_rust2::Password::empty())
            .map_err(|e| ArchiveError::SevenZ(e.to_string()))?;

        let mut found: Option<Vec<u8>> = None;
        sz.for_each_entries(|entry, reader| {
            if entry.name() == member {
                let mut buf = Vec::with_capacity(entry.size() as usize);
                reader.read_to_end(&mut buf)?;
                found = Some(buf);
            }
            Ok(true)
        })
        .map_err(|e| ArchiveError::SevenZ(e.to_string()))?;

        let bytes = found.ok_or_else(|| ArchiveError::MissingMember {
            archive: archive_path.to_path_buf(),
            member: member.to_string(),
        })?;

        Ok(Self {
            backing: Backing::Memory(Arc::new(bytes)),
            source_path: Some(archive_path.to_path_buf()),
        })
    }

    /// Opens a large-shape archive (a `*-Posts.7z`/`*-Tags.7z` file whose 7z
    /// member is itself a raw bzip2 stream), building or restoring the
    /// block-offset sidecar (C2, spec §4.2).
    pub fn open_large_shape(archive_path: &Path) -> Result<Self, ArchiveError> {
        let stream = Arc::new(MagicOffsetStream::open(archive_path)?);

        let sidecar_path = sidecar_path_for(archive_path);
        let index = match load_sidecar(&sidecar_path) {
            Some(index) => index,
            None => {
                let index = BlockIndex::build(stream.data()).map_err(ArchiveError::Decompress)?;
                save_sidecar(&sidecar_path, &index);
                index
            }
        };

        let random_access = RandomAccessBz2::new(stream, index);
        Ok(Self {
            backing: Backing::Bzip2(random_access),
            source_path: Some(archive_path.to_path_buf()),
        })
    }

    /// Builds a reader directly over in-memory bytes, bypassing any archive
    /// format; used by tests that exercise the extractor/query layers
    /// without a real 7z/bzip2 fixture.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            backing: Backing::Memory(Arc::new(data)),
            source_path: None,
        }
    }

    pub fn size(&self) -> u64 {
        match &self.backing {
            Backing::Memory(data) => data.len() as u64,
            Backing::Bzip2(ra) => ra.size(),
        }
    }

    /// Exact byte range `[start, start+length)`. `start + length` must not
    /// exceed `size()`.
    pub fn read_at(&self, start: u64, length: u64) -> Result<Vec<u8>, ArchiveError> {
        match &self.backing {
            Backing::Memory(data) => {
                let size = data.len() as u64;
                if start > size || start + length > size {
                    return Err(ArchiveError::Decompress(anyhow::anyhow!(
                        "read_at({start}, {length}) out of bounds for size {size}"
                    )));
                }
                let s = start as usize;
                let e = (start + length) as usize;
                Ok(data[s..e].to_vec())
            }
            Backing::Bzip2(ra) => ra.read_at(start, length).map_err(ArchiveError::Decompress),
        }
    }

    /// Streams `(offset, row_bytes)` pairs from `start`, via a bounded
    /// channel fed by a background producer thread (C4, spec §4.4).
    pub fn lines(self: &Arc<Self>, start: u64) -> crossbeam_channel::Receiver<Row> {
        extractor::lines(Arc::clone(self), start)
    }

    /// Stable content digest of the *source file* (spec §4.3), sampled from
    /// head and tail for large archives. Readers built via [`Self::from_bytes`]
    /// have no backing file and hash their in-memory bytes directly.
    pub fn digest(&self) -> Result<String, ArchiveError> {
        match &self.source_path {
            Some(path) => digest_file(path),
            None => match &self.backing {
                Backing::Memory(data) => Ok(blake3::hash(data).to_hex().to_string()),
                Backing::Bzip2(_) => unreachable!("Bzip2 backing always has a source_path"),
            },
        }
    }
}

/// `<archive-filename>-index.dat` next to the large-shape archive (the
/// archive's own filename already ends in `.7z`, so this yields e.g.
/// `stackoverflow.com-Posts.7z-index.dat`, matching
/// `archive_reader.py`'s `f"{path.name}-index.dat"`).
fn sidecar_path_for(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_os_string();
    name.push("-index.dat");
    PathBuf::from(name)
}

fn load_sidecar(path: &Path) -> Option<BlockIndex> {
    let bytes = fs::read(path).ok()?;
    match BlockIndex::from_bytes(&bytes) {
        Ok(index) => Some(index),
        Err(err) => {
            tracing::info!(?path, %err, "block index sidecar unreadable, rebuilding");
            let _ = fs::remove_file(path);
            None
        }
    }
}

fn save_sidecar(path: &Path, index: &BlockIndex) {
    if let Ok(bytes) = index.to_bytes() {
        if let Err(err) = fs::write(path, bytes) {
            tracing::warn!(?path, %err, "failed to persist block index sidecar");
        }
    }
}
