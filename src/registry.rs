//! Process-wide map from archive name to a constructed, memoised reader /
//! indexer / query-engine trio (C8, spec §2, §4 table, §5 "Shared
//! resources").
//!
//! Entries are built once per archive name and cached for the process
//! lifetime. Each name gets its own [`OnceCell`], so concurrent
//! `get_or_create` calls for the *same* name are serialised onto one
//! construction (spec §5: "concurrent creation of the same entry must be
//! serialised to avoid double decoder construction") while calls for
//! *different* names proceed independently — the map's own lock is only
//! ever held long enough to look up or insert a cell, never across the
//! archive-opening `await`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::archive::{ArchiveReader, ArchiveShape};
use crate::config::Config;
use crate::error::{ArchiveError, QueryError};
use crate::indexer::Indexer;
use crate::query::QueryEngine;
use crate::store::IndexStore;

/// Glob patterns used for archive discovery (spec §6).
const SMALL_SHAPE_GLOB: &str = "*.com.7z";
const LARGE_SHAPE_GLOB: &str = "*-Posts.7z";

/// A constructed reader/indexer/query-engine trio for one archive,
/// memoised in the [`Registry`] for the process lifetime.
pub struct ArchiveEntry {
    pub indexer: Indexer,
    pub query_engine: QueryEngine,
}

type EntryCell = Arc<OnceCell<Arc<ArchiveEntry>>>;

pub struct Registry {
    config: Config,
    entries: Mutex<HashMap<String, EntryCell>>,
}

impl Registry {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Basenames of every archive discoverable under `archive_folder`
    /// (spec §6: `*.com.7z` small shape, `*-Posts.7z` large shape). The
    /// `-Tags.7z` companion of a large-shape archive is never listed on
    /// its own — it is only reachable as the posts archive's pair.
    pub fn discover(&self) -> Result<Vec<String>, ArchiveError> {
        let mut names = Vec::new();
        for pattern in [SMALL_SHAPE_GLOB, LARGE_SHAPE_GLOB] {
            let full_pattern = self.config.archive_folder.join(pattern);
            let full_pattern = full_pattern.to_string_lossy().into_owned();
            let paths = glob::glob(&full_pattern)
                .map_err(|e| ArchiveError::SevenZ(format!("invalid glob pattern: {e}")))?;
            for entry in paths {
                let path = entry.map_err(|e| ArchiveError::SevenZ(format!("glob read error: {e}")))?;
                if let Some(name) = path.file_name() {
                    names.push(name.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Returns the memoised entry for `name`, building it on first access.
    /// The map lock is only held to fetch or insert this name's cell; the
    /// (possibly slow) construction itself runs after the lock is dropped,
    /// so building one archive never blocks lookups for any other.
    pub async fn get_or_create(&self, name: &str) -> Result<Arc<ArchiveEntry>, QueryError> {
        let cell = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(name.to_string()).or_insert_with(|| Arc::new(OnceCell::new())))
        };

        let entry = cell
            .get_or_try_init(|| async {
                let archive_path = self.resolve_path(name)?;
                self.build_entry(name, &archive_path).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(entry))
    }

    /// Every currently memoised archive name whose entry has finished
    /// building, without triggering construction of any new ones.
    pub async fn loaded_names(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Runs the tag pass then the post pass for one archive (spec §6
    /// `PUT /indexing/process`), the two sequential per spec §4.6.
    pub async fn process(&self, name: &str) -> Result<(), QueryError> {
        let entry = self.get_or_create(name).await?;
        entry.indexer.run_tag_pass().await?;
        entry.indexer.run_post_pass().await?;
        Ok(())
    }

    /// Runs tag passes concurrently across every discovered archive, then
    /// post passes concurrently (spec §6 `PUT /indexing/process/all`,
    /// §4.6 "Parallelism": a single archive's passes stay sequential, but
    /// archives run independently of each other).
    pub async fn process_all(&self) -> Result<(), QueryError> {
        let names = self.discover()?;
        let mut entries = Vec::with_capacity(names.len());
        for name in &names {
            entries.push(self.get_or_create(name).await?);
        }

        let tag_handles: Vec<_> = entries
            .iter()
            .cloned()
            .map(|e| tokio::spawn(async move { e.indexer.run_tag_pass().await }))
            .collect();
        for handle in tag_handles {
            handle.await.expect("tag pass task panicked")?;
        }

        let post_handles: Vec<_> = entries
            .iter()
            .cloned()
            .map(|e| tokio::spawn(async move { e.indexer.run_post_pass().await }))
            .collect();
        for handle in post_handles {
            handle.await.expect("post pass task panicked")?;
        }

        Ok(())
    }

    /// Warm-loads every discovered archive into the registry without
    /// indexing it (spec §6 `GET /archive/load_all`).
    pub async fn load_all(&self) -> Result<(), QueryError> {
        for name in self.discover()? {
            self.get_or_create(&name).await?;
        }
        Ok(())
    }

    fn resolve_path(&self, name: &str) -> Result<PathBuf, QueryError> {
        let discovered = self.discover().map_err(QueryError::from)?;
        if !discovered.iter().any(|n| n == name) {
            return Err(QueryError::UnknownArchive(name.to_string()));
        }
        Ok(self.config.archive_folder.join(name))
    }

    async fn build_entry(&self, name: &str, archive_path: &Path) -> Result<ArchiveEntry, QueryError> {
        // Opening an archive means a 7z read (small shape) or an mmap plus a
        // full block-index build (large shape) — both synchronous and
        // potentially slow, so they run on the blocking pool rather than the
        // async executor (spec §5: only decompression and chunk reads run on
        // the worker pool).
        let (tags_reader, posts_reader) = match ArchiveShape::detect(archive_path) {
            ArchiveShape::Small { archive } => {
                let tags_path = archive.clone();
                let posts_path = archive;
                let tags = tokio::task::spawn_blocking(move || {
                    ArchiveReader::open_small_shape(&tags_path, "Tags.xml")
                })
                .await
                .expect("archive open worker panicked")?;
                let posts = tokio::task::spawn_blocking(move || {
                    ArchiveReader::open_small_shape(&posts_path, "Posts.xml")
                })
                .await
                .expect("archive open worker panicked")?;
                (tags, posts)
            }
            ArchiveShape::Large { posts, tags } => {
                let tags_reader =
                    tokio::task::spawn_blocking(move || ArchiveReader::open_large_shape(&tags))
                        .await
                        .expect("archive open worker panicked")?;
                let posts_reader =
                    tokio::task::spawn_blocking(move || ArchiveReader::open_large_shape(&posts))
                        .await
                        .expect("archive open worker panicked")?;
                (tags_reader, posts_reader)
            }
        };

        let db_path = self.db_path_for(name);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ArchiveError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let store = Arc::new(IndexStore::open(&db_path).await?);

        let tags_reader = Arc::new(tags_reader);
        let posts_reader = Arc::new(posts_reader);

        tracing::info!(archive = %name, db = %db_path.display(), "archive registered");

        Ok(ArchiveEntry {
            indexer: Indexer::new(
                name.to_string(),
                Arc::clone(&tags_reader),
                Arc::clone(&posts_reader),
                Arc::clone(&store),
            ),
            query_engine: QueryEngine::new(posts_reader, store),
        })
    }

    /// `<basename>.db` next to the archive, stored under `database_folder`
    /// rather than literally beside the archive file (spec §6 names both a
    /// per-archive config directory and a "next to it" sidecar convention;
    /// `database_folder` is treated as that directory, see DESIGN.md).
    fn db_path_for(&self, name: &str) -> PathBuf {
        let basename = name.strip_suffix(".7z").unwrap_or(name);
        self.config.database_folder.join(format!("{basename}.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(archive_folder: PathBuf, database_folder: PathBuf) -> Config {
        Config {
            count_workers: 2,
            archive_folder,
            database_folder,
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }

    #[test]
    fn discover_lists_small_and_large_shapes_but_not_tags_companion() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["askubuntu.com.7z", "stackoverflow.com-Posts.7z", "stackoverflow.com-Tags.7z"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let registry = Registry::new(test_config(dir.path().to_path_buf(), dir.path().to_path_buf()));
        let mut names = registry.discover().unwrap();
        names.sort();
        assert_eq!(names, vec!["askubuntu.com.7z", "stackoverflow.com-Posts.7z"]);
    }

    #[tokio::test]
    async fn get_or_create_rejects_unknown_archive() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(test_config(dir.path().to_path_buf(), dir.path().to_path_buf()));
        let err = registry.get_or_create("nope.com.7z").await.unwrap_err();
        assert!(matches!(err, QueryError::UnknownArchive(_)));
    }
}
