//! Error types for the archive/index/query pipeline (spec §7).
//!
//! Row-level data errors (`RowParseError`) are swallowed at the point of
//! occurrence and never reach these enums; everything here is a
//! resource-level failure that aborts the caller's current operation.

use std::path::PathBuf;

/// Failures opening or reading a source archive (C1/C3/C4).
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("{0} is not a 7z archive")]
    NotAnArchive(PathBuf),

    #[error("archive {archive} is missing expected member {member}")]
    MissingMember { archive: PathBuf, member: String },

    #[error("block index sidecar for {0} is corrupt, rebuilding")]
    CorruptBlockIndex(PathBuf),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decompression failed: {0}")]
    Decompress(#[from] anyhow::Error),

    #[error("7z extraction failed: {0}")]
    SevenZ(String),
}

/// Failures in the relational store (C5).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Failures during a tag or post indexing pass (C6).
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures surfaced by the query layer / HTTP handlers (C7/C8).
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("archive {0} is not known")]
    UnknownArchive(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<IndexError> for QueryError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Archive(e) => QueryError::Archive(e),
            IndexError::Store(e) => QueryError::Store(e),
        }
    }
}
