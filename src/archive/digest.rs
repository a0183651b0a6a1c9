//! Sampled content digest for a source archive file (spec §4.3).
//!
//! Hashing a multi-gigabyte dump in full on every index pass would dominate
//! the pass itself, so the digest only samples the head and a chunk near the
//! tail — enough to detect a whole-file replacement, not a mid-file edit
//! (spec §9 Open Questions, adopted deliberately).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::ArchiveError;

const SAMPLE_SIZE: u64 = 512 * 1024;
const TAIL_OFFSET: u64 = 4 * SAMPLE_SIZE;

/// Hashes the first `SAMPLE_SIZE` bytes and the `SAMPLE_SIZE` chunk located
/// `TAIL_OFFSET` bytes before end-of-file, combining both into one digest.
///
/// Files smaller than `TAIL_OFFSET + SAMPLE_SIZE` are hashed in full instead,
/// since head and tail samples would overlap or run past the start.
pub fn digest_file(path: &Path) -> Result<String, ArchiveError> {
    let io_err = |source: std::io::Error| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();

    let mut hasher = blake3::Hasher::new();

    if len <= TAIL_OFFSET + SAMPLE_SIZE {
        std::io::copy(&mut file, &mut hasher).map_err(io_err)?;
        return Ok(hasher.finalize().to_hex().to_string());
    }

    let mut head = vec![0u8; SAMPLE_SIZE as usize];
    file.read_exact(&mut head).map_err(io_err)?;
    hasher.update(&head);

    let tail_start = len - TAIL_OFFSET;
    file.seek(SeekFrom::Start(tail_start)).map_err(io_err)?;
    let mut tail = vec![0u8; SAMPLE_SIZE as usize];
    file.read_exact(&mut tail).map_err(io_err)?;
    hasher.update(&tail);

    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn small_files_are_hashed_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.bin");
        std::fs::write(&path, b"hello world").unwrap();
        let a = digest_file(&path).unwrap();
        let b = digest_file(&path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn differs_when_head_or_tail_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(&vec![0u8; (TAIL_OFFSET + SAMPLE_SIZE * 2) as usize]).unwrap();
        drop(f);
        let before = digest_file(&path).unwrap();

        let mut f = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f.write_all(b"X").unwrap();
        drop(f);
        let after_head = digest_file(&path).unwrap();
        assert_ne!(before, after_head);
    }

    #[test]
    fn unchanged_mid_file_bytes_are_not_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let total = (TAIL_OFFSET + SAMPLE_SIZE * 4) as usize;
        std::fs::write(&path, vec![7u8; total]).unwrap();
        let before = digest_file(&path).unwrap();

        let mut f = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        f.seek(SeekFrom::Start((total / 2) as u64)).unwrap();
        f.write_all(b"mutated-in-the-middle").unwrap();
        drop(f);
        let after = digest_file(&path).unwrap();
        assert_eq!(before, after);
    }
}
