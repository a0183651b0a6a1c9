//! Serves the three read-only operations the HTTP layer exposes (C7, spec
//! §4.7): tag listing, single-post assembly, and tag-filtered post search.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::archive::ArchiveReader;
use crate::error::QueryError;
use crate::store::{IndexStore, QuestionRecord};
use crate::xml;

#[derive(Debug, Clone, Serialize)]
pub struct TagSummary {
    pub count_usage: i64,
}

/// A fully assembled post document: the question's own fields plus its
/// tags and its answers, with the accepted answer promoted to its own key
/// (spec §4.7 `get_post` step 3).
#[derive(Debug, Clone, Serialize, Default)]
pub struct PostDocument {
    pub fields: HashMap<String, String>,
    pub tags: Vec<String>,
    pub answers: HashMap<i64, HashMap<String, String>>,
    pub accepted_answer: Option<HashMap<String, String>>,
}

pub struct QueryEngine {
    posts_reader: Arc<ArchiveReader>,
    store: Arc<IndexStore>,
}

impl QueryEngine {
    pub fn new(posts_reader: Arc<ArchiveReader>, store: Arc<IndexStore>) -> Self {
        Self { posts_reader, store }
    }

    pub async fn tags_list(&self, offset: i64, limit: i64) -> Result<HashMap<String, TagSummary>, QueryError> {
        let tags = self.store.tags_page(offset, limit).await?;
        Ok(tags
            .into_iter()
            .map(|t| (t.name, TagSummary { count_usage: t.count_usage }))
            .collect())
    }

    pub async fn get_post(&self, post_id: i64) -> Result<Option<PostDocument>, QueryError> {
        let Some(question) = self.store.question(post_id).await? else {
            return Ok(None);
        };
        let answers = self.store.answers_for_question(post_id).await?;
        let tags = self.store.tags_for_question(post_id).await?;

        let mut ranges: Vec<(i64, i64, i64)> = Vec::with_capacity(1 + answers.len());
        ranges.push((question.start, question.length, question.id));
        for a in &answers {
            ranges.push((a.start, a.length, a.id));
        }
        ranges.sort_by_key(|(start, _, _)| *start);

        let mut parsed: HashMap<i64, HashMap<String, String>> = HashMap::new();
        for (start, length, id) in ranges {
            let bytes = read_range(&self.posts_reader, start as u64, length as u64).await?;
            if let Ok(attrs) = xml::parse_row_attributes(&bytes) {
                parsed.insert(id, attrs);
            }
        }

        let mut doc = PostDocument {
            fields: parsed.remove(&question.id).unwrap_or_default(),
            tags,
            answers: HashMap::new(),
            accepted_answer: None,
        };

        for a in &answers {
            let Some(fields) = parsed.remove(&a.id) else { continue };
            if Some(a.id) == question.accepted_answer_id {
                doc.accepted_answer = Some(fields);
            } else {
                doc.answers.insert(a.id, fields);
            }
        }

        Ok(Some(doc))
    }

    pub async fn query_posts(
        &self,
        offset: i64,
        limit: i64,
        tags: &[String],
    ) -> Result<HashMap<i64, PostDocument>, QueryError> {
        let questions = self.store.questions(offset, limit, tags).await?;

        let mut per_question: HashMap<i64, (QuestionRecord, Vec<String>, Vec<crate::store::AnswerRecord>)> =
            HashMap::new();
        let mut ranges: Vec<(i64, i64, i64)> = Vec::new();
        for q in questions {
            let q_tags = self.store.tags_for_question(q.id).await?;
            let q_answers = self.store.answers_for_question(q.id).await?;
            ranges.push((q.start, q.length, q.id));
            for a in &q_answers {
                ranges.push((a.start, a.length, a.id));
            }
            per_question.insert(q.id, (q, q_tags, q_answers));
        }
        // Sort all ranges across every matched question ascending by start
        // to maximise decompressor locality (spec §4.7 step 3).
        ranges.sort_by_key(|(start, _, _)| *start);

        let mut parsed: HashMap<i64, HashMap<String, String>> = HashMap::new();
        for (start, length, id) in ranges {
            let bytes = read_range(&self.posts_reader, start as u64, length as u64).await?;
            if let Ok(attrs) = xml::parse_row_attributes(&bytes) {
                parsed.insert(id, attrs);
            }
        }

        let mut out = HashMap::with_capacity(per_question.len());
        for (question_id, (question, q_tags, q_answers)) in per_question {
            let mut doc = PostDocument {
                fields: parsed.remove(&question_id).unwrap_or_default(),
                tags: q_tags,
                answers: HashMap::new(),
                accepted_answer: None,
            };
            for a in &q_answers {
                let Some(fields) = parsed.remove(&a.id) else { continue };
                if Some(a.id) == question.accepted_answer_id {
                    doc.accepted_answer = Some(fields);
                } else {
                    doc.answers.insert(a.id, fields);
                }
            }
            out.insert(question_id, doc);
        }

        Ok(out)
    }
}

/// Offloads the archive read (decompression or memory copy) onto a
/// blocking-pool thread and suspends the caller until it completes (spec
/// §5: "every call into ArchiveReader hands off the blocking work to the
/// worker pool").
async fn read_range(reader: &Arc<ArchiveReader>, start: u64, length: u64) -> Result<Vec<u8>, QueryError> {
    let reader = Arc::clone(reader);
    tokio::task::spawn_blocking(move || reader.read_at(start, length))
        .await
        .expect("archive read worker panicked")
        .map_err(QueryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AnswerInsert, QuestionInsert, TagInsert};

    async fn build_fixture() -> (tempfile::TempDir, QueryEngine) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("fixture.db");
        let store = Arc::new(IndexStore::open(&db_path).await.unwrap());

        let question_row = b"<row Id=\"10\" PostTypeId=\"1\" Score=\"7\" Title=\"q\"/>\r\n".to_vec();
        let answer_row = b"<row Id=\"11\" PostTypeId=\"2\" Score=\"3\" Title=\"a\"/>\r\n".to_vec();
        let mut bytes = question_row.clone();
        bytes.extend_from_slice(&answer_row);
        let reader = Arc::new(ArchiveReader::from_bytes(bytes));

        store
            .insert_tags(&[
                TagInsert { id: 1, name: "python".into(), count_usage: 10 },
                TagInsert { id: 2, name: "rust".into(), count_usage: 5 },
            ])
            .await
            .unwrap();
        store
            .insert_posts(
                &[QuestionInsert {
                    id: 10,
                    start: 0,
                    length: question_row.len() as i64,
                    score: 7,
                    accepted_answer_id: Some(11),
                }],
                &[AnswerInsert {
                    id: 11,
                    start: question_row.len() as i64,
                    length: answer_row.len() as i64,
                    score: 3,
                    question_id: 10,
                }],
                &[(10, 1), (10, 2)],
            )
            .await
            .unwrap();

        (dir, QueryEngine::new(reader, store))
    }

    #[tokio::test]
    async fn get_post_promotes_accepted_answer() {
        let (_dir, engine) = build_fixture().await;
        let doc = engine.get_post(10).await.unwrap().unwrap();
        assert_eq!(doc.tags.len(), 2);
        assert!(doc.accepted_answer.is_some());
        assert!(doc.answers.is_empty());
        assert_eq!(doc.fields.get("Title").unwrap(), "q");
    }

    #[tokio::test]
    async fn query_posts_applies_and_semantics() {
        let (_dir, engine) = build_fixture().await;
        let hits = engine.query_posts(0, 10, &["python".to_string()]).await.unwrap();
        assert!(hits.contains_key(&10));

        let none = engine
            .query_posts(0, 10, &["python".to_string(), "c++".to_string()])
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
