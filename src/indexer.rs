//! Tag pass then post pass over one archive's two readers (C6, spec §4.6).
//!
//! Row classification and batch construction are plain synchronous code
//! (spec §5: "only decompression and chunk reads run on the worker pool"),
//! so the whole pass runs inside [`tokio::task::spawn_blocking`] and drives
//! the store's async calls through the current runtime's `Handle::block_on`
//! — the extractor's producer thread is the only place that ever blocks on
//! decompression.

use std::collections::HashMap;
use std::sync::Arc;

use crate::archive::ArchiveReader;
use crate::error::IndexError;
use crate::store::{AnswerInsert, IndexStatus, IndexStore, QuestionInsert, TagInsert};
use crate::xml::{self, split_tags_attribute};

/// Tag batch flush size (spec §4.6 step 2).
const TAG_BATCH_SIZE: usize = 1_000;
/// Combined question+answer batch flush size (spec §4.6 step 4).
const POST_BATCH_SIZE: usize = 4_096;
/// Tail window pre-scanned purely for progress logging (spec §4.6 step 2).
const PROGRESS_SCAN_WINDOW: u64 = 512 * 1024;

pub struct Indexer {
    name: String,
    tags_reader: Arc<ArchiveReader>,
    posts_reader: Arc<ArchiveReader>,
    store: Arc<IndexStore>,
}

impl Indexer {
    pub fn new(
        name: String,
        tags_reader: Arc<ArchiveReader>,
        posts_reader: Arc<ArchiveReader>,
        store: Arc<IndexStore>,
    ) -> Self {
        Self { name, tags_reader, posts_reader, store }
    }

    /// Tag pass (spec §4.6 "Tag pass"). Clears tags *and* posts when the
    /// tags archive's digest has changed, since question_tag references
    /// tag ids that are about to be dropped.
    pub async fn run_tag_pass(&self) -> Result<(), IndexError> {
        let digest = self.tags_reader.digest()?;
        if self.store.index_status("tags", &digest).await? == IndexStatus::Done {
            return Ok(());
        }

        tracing::info!(archive = %self.name, "tag pass starting");
        self.store.clear_tags().await?;
        self.store.clear_posts().await?;

        let reader = Arc::clone(&self.tags_reader);
        let store = Arc::clone(&self.store);
        let digest_for_task = digest.clone();

        tokio::task::spawn_blocking(move || -> Result<(), IndexError> {
            let handle = tokio::runtime::Handle::current();
            let rx = reader.lines(0);
            let mut batch: Vec<TagInsert> = Vec::with_capacity(TAG_BATCH_SIZE);

            for (_, bytes) in rx {
                match xml::parse_row_attributes(&bytes) {
                    Ok(attrs) => {
                        if let Some(tag) = parse_tag_row(&attrs) {
                            batch.push(tag);
                        }
                    }
                    Err(err) => tracing::debug!(%err, "tag row skipped"),
                }
                if batch.len() >= TAG_BATCH_SIZE {
                    handle.block_on(store.insert_tags(&batch))?;
                    batch.clear();
                }
            }
            if !batch.is_empty() {
                handle.block_on(store.insert_tags(&batch))?;
            }
            handle.block_on(store.mark_index("tags", &digest_for_task, true))?;
            Ok(())
        })
        .await
        .expect("tag pass worker panicked")?;

        tracing::info!(archive = %self.name, "tag pass done");
        Ok(())
    }

    /// Post pass (spec §4.6 "Post pass"), resumable from the last
    /// committed batch via `resume_checkpoint`.
    pub async fn run_post_pass(&self) -> Result<(), IndexError> {
        let digest = self.posts_reader.digest()?;
        let status = self.store.index_status("posts", &digest).await?;
        if status == IndexStatus::Done {
            return Ok(());
        }

        let resume_byte = match status {
            IndexStatus::Unknown => {
                self.store.clear_posts().await?;
                self.store.mark_index("posts", &digest, false).await?;
                0
            }
            IndexStatus::InProgress => {
                let (last_id, next_byte) = self.store.resume_checkpoint().await?;
                if next_byte == 0 {
                    self.store.clear_posts().await?;
                } else {
                    tracing::info!(archive = %self.name, last_id, next_byte, "resuming post pass");
                }
                next_byte as u64
            }
            IndexStatus::Done => unreachable!(),
        };

        self.log_progress_estimate();

        let reader = Arc::clone(&self.posts_reader);
        let store = Arc::clone(&self.store);
        let digest_for_task = digest.clone();

        tokio::task::spawn_blocking(move || -> Result<(), IndexError> {
            let handle = tokio::runtime::Handle::current();
            let rx = reader.lines(resume_byte);

            let mut questions: Vec<QuestionInsert> = Vec::new();
            let mut answers: Vec<AnswerInsert> = Vec::new();
            let mut question_tags: Vec<(i64, i64)> = Vec::new();
            let mut pending = 0usize;

            for (offset, bytes) in rx {
                let attrs = match xml::parse_row_attributes(&bytes) {
                    Ok(attrs) => attrs,
                    Err(err) => {
                        tracing::debug!(%err, "post row skipped");
                        continue;
                    }
                };

                let Some(post_type) = attrs.get("PostTypeId") else {
                    continue;
                };
                let Some(id) = attrs.get("Id").and_then(|v| v.parse::<i64>().ok()) else {
                    continue;
                };
                let score = attrs.get("Score").and_then(|v| v.parse::<i64>().ok()).unwrap_or(0);
                let length = bytes.len() as i64;

                match post_type.as_str() {
                    "1" => {
                        let accepted_answer_id =
                            attrs.get("AcceptedAnswerId").and_then(|v| v.parse::<i64>().ok());
                        if let Some(tags_attr) = attrs.get("Tags") {
                            let tag_names = split_tags_attribute(tags_attr);
                            if !tag_names.is_empty() {
                                let tag_ids = handle.block_on(store.tags_by_name(&tag_names))?;
                                for tag_id in tag_ids {
                                    question_tags.push((id, tag_id));
                                }
                            }
                        }
                        questions.push(QuestionInsert {
                            id,
                            start: offset as i64,
                            length,
                            score,
                            accepted_answer_id,
                        });
                        pending += 1;
                    }
                    "2" => {
                        let Some(question_id) =
                            attrs.get("ParentId").and_then(|v| v.parse::<i64>().ok())
                        else {
                            continue;
                        };
                        answers.push(AnswerInsert {
                            id,
                            start: offset as i64,
                            length,
                            score,
                            question_id,
                        });
                        pending += 1;
                    }
                    _ => continue,
                }

                if pending >= POST_BATCH_SIZE {
                    handle.block_on(store.insert_posts(&questions, &answers, &question_tags))?;
                    questions.clear();
                    answers.clear();
                    question_tags.clear();
                    pending = 0;
                }
            }

            if pending > 0 {
                handle.block_on(store.insert_posts(&questions, &answers, &question_tags))?;
            }
            handle.block_on(store.mark_index("posts", &digest_for_task, true))?;
            Ok(())
        })
        .await
        .expect("post pass worker panicked")?;

        tracing::info!(archive = %self.name, "post pass done");
        Ok(())
    }

    /// Reads the last `PROGRESS_SCAN_WINDOW` bytes and logs the highest
    /// `Id` found, purely as an operator-facing progress hint (spec §4.6
    /// step 2; no effect on indexing behaviour).
    fn log_progress_estimate(&self) {
        let size = self.posts_reader.size();
        let start = size.saturating_sub(PROGRESS_SCAN_WINDOW);
        let Ok(tail) = self.posts_reader.read_at(start, size - start) else {
            return;
        };
        let last_id = tail
            .split(|&b| b == b'\n')
            .rev()
            .find_map(|line| xml::parse_row_attributes(line).ok())
            .and_then(|attrs| attrs.get("Id").cloned());
        if let Some(last_id) = last_id {
            tracing::info!(archive = %self.name, last_id, "post pass tail estimate");
        }
    }
}

fn parse_tag_row(attrs: &HashMap<String, String>) -> Option<TagInsert> {
    let id = attrs.get("Id")?.parse::<i64>().ok()?;
    let name = attrs.get("TagName")?.clone();
    let count_usage = attrs.get("Count")?.parse::<i64>().ok()?;
    Some(TagInsert { id, name, count_usage })
}
