//! Transactional relational persistence for one archive's tags, questions
//! and answers (C5, spec §4.5), backed by a single-file SQLite database.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;

use super::schema::CREATE_TABLES;

/// Resume threshold below which the post pass restarts from scratch rather
/// than resuming (spec §4.5 `resume_checkpoint`, §9: preserved as a
/// batch-alignment heuristic from the original source).
const RESUME_MIN_QUESTIONS: i64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Unknown,
    InProgress,
    Done,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TagRecord {
    pub id: i64,
    pub name: String,
    pub count_usage: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuestionRecord {
    pub id: i64,
    pub start: i64,
    pub length: i64,
    pub score: i64,
    pub accepted_answer_id: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnswerRecord {
    pub id: i64,
    pub start: i64,
    pub length: i64,
    pub score: i64,
    pub question_id: i64,
}

/// A tag row staged for `insert_tags`.
pub struct TagInsert {
    pub id: i64,
    pub name: String,
    pub count_usage: i64,
}

/// A question row staged for `insert_posts`.
pub struct QuestionInsert {
    pub id: i64,
    pub start: i64,
    pub length: i64,
    pub score: i64,
    pub accepted_answer_id: Option<i64>,
}

/// An answer row staged for `insert_posts`.
pub struct AnswerInsert {
    pub id: i64,
    pub start: i64,
    pub length: i64,
    pub score: i64,
    pub question_id: i64,
}

pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    /// Opens (creating if absent) the SQLite file at `path` and ensures the
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        // SQLite serialises writers regardless; capping the pool at one
        // connection avoids SQLITE_BUSY retries under concurrent batches.
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
        sqlx::query(CREATE_TABLES).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn clear_tags(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM question_tag").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM tag").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Clears questions, answers and the join table (cascades are declared
    /// on the schema, but SQLite only enforces them when `foreign_keys` is
    /// on, which `open` sets).
    pub async fn clear_posts(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM question_tag").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM answer").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM question").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_tags(&self, tags: &[TagInsert]) -> Result<(), StoreError> {
        if tags.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for tag in tags {
            sqlx::query("INSERT INTO tag (id, name, count_usage) VALUES (?, ?, ?)")
                .bind(tag.id)
                .bind(&tag.name)
                .bind(tag.count_usage)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_posts(
        &self,
        questions: &[QuestionInsert],
        answers: &[AnswerInsert],
        question_tags: &[(i64, i64)],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for q in questions {
            sqlx::query(
                "INSERT INTO question (id, start, length, score, accepted_answer_id) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(q.id)
            .bind(q.start)
            .bind(q.length)
            .bind(q.score)
            .bind(q.accepted_answer_id)
            .execute(&mut *tx)
            .await?;
        }
        for a in answers {
            sqlx::query(
                "INSERT INTO answer (id, start, length, score, question_id) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(a.id)
            .bind(a.start)
            .bind(a.length)
            .bind(a.score)
            .bind(a.question_id)
            .execute(&mut *tx)
            .await?;
        }
        for (question_id, tag_id) in question_tags {
            sqlx::query("INSERT OR IGNORE INTO question_tag (question_id, tag_id) VALUES (?, ?)")
                .bind(question_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn tags_by_name(&self, names: &[String]) -> Result<Vec<i64>, StoreError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let row = sqlx::query("SELECT id FROM tag WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = row {
                ids.push(row.get::<i64, _>("id"));
            }
        }
        Ok(ids)
    }

    pub async fn tags_page(&self, offset: i64, limit: i64) -> Result<Vec<TagRecord>, StoreError> {
        let rows = sqlx::query_as::<_, TagRecord>(
            "SELECT id, name, count_usage FROM tag ORDER BY count_usage DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn question(&self, id: i64) -> Result<Option<QuestionRecord>, StoreError> {
        let row = sqlx::query_as::<_, QuestionRecord>(
            "SELECT id, start, length, score, accepted_answer_id FROM question WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn answers_for_question(&self, question_id: i64) -> Result<Vec<AnswerRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AnswerRecord>(
            "SELECT id, start, length, score, question_id FROM answer WHERE question_id = ?",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn tags_for_question(&self, question_id: i64) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT tag.name AS name FROM tag JOIN question_tag ON tag.id = question_tag.tag_id WHERE question_tag.question_id = ?",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("name")).collect())
    }

    /// Returns questions carrying *all* of `required_tags` (AND semantics,
    /// spec §4.5). `offset`/`limit` apply after the tag filter.
    pub async fn questions(
        &self,
        offset: i64,
        limit: i64,
        required_tags: &[String],
    ) -> Result<Vec<QuestionRecord>, StoreError> {
        if required_tags.is_empty() {
            return self.questions_unfiltered(offset, limit).await;
        }

        let placeholders = required_tags.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT q.id, q.start, q.length, q.score, q.accepted_answer_id
             FROM question q
             JOIN question_tag qt ON qt.question_id = q.id
             JOIN tag t ON t.id = qt.tag_id
             WHERE t.name IN ({placeholders})
             GROUP BY q.id
             HAVING COUNT(DISTINCT t.name) = ?
             LIMIT ? OFFSET ?"
        );

        let mut query = sqlx::query_as::<_, QuestionRecord>(&sql);
        for tag in required_tags {
            query = query.bind(tag);
        }
        query = query
            .bind(required_tags.len() as i64)
            .bind(limit)
            .bind(offset);

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn questions_unfiltered(&self, offset: i64, limit: i64) -> Result<Vec<QuestionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, QuestionRecord>(
            "SELECT id, start, length, score, accepted_answer_id FROM question LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// `(last_id, next_byte_offset)` for resuming the post pass (spec
    /// §4.5). Below `RESUME_MIN_QUESTIONS` questions the caller is expected
    /// to clear and restart instead of resuming.
    pub async fn resume_checkpoint(&self) -> Result<(i64, i64), StoreError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM question")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        if count <= RESUME_MIN_QUESTIONS {
            return Ok((0, 0));
        }

        let row = sqlx::query(
            "SELECT id, start, length FROM (
                SELECT id, start, length FROM question
                UNION ALL
                SELECT id, start, length FROM answer
             ) ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let id: i64 = row.get("id");
                let start: i64 = row.get("start");
                let length: i64 = row.get("length");
                Ok((id, start + length))
            }
            None => Ok((0, 0)),
        }
    }

    pub async fn index_status(&self, name: &str, hash: &str) -> Result<IndexStatus, StoreError> {
        let row = sqlx::query("SELECT index_done FROM index_state WHERE name = ? AND hash_file = ?")
            .bind(name)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            None => IndexStatus::Unknown,
            Some(row) if row.get::<i64, _>("index_done") != 0 => IndexStatus::Done,
            Some(_) => IndexStatus::InProgress,
        })
    }

    /// Records `name`'s index state under `hash`, dropping any row left
    /// over from a previous hash first so `index_state` never holds more
    /// than one row per `name` (a changed archive digest means a new row
    /// would otherwise sit alongside the stale one under a different key).
    pub async fn mark_index(&self, name: &str, hash: &str, done: bool) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM index_state WHERE name = ? AND hash_file != ?")
            .bind(name)
            .bind(hash)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO index_state (name, hash_file, index_done) VALUES (?, ?, ?)
             ON CONFLICT (name, hash_file) DO UPDATE SET index_done = excluded.index_done",
        )
        .bind(name)
        .bind(hash)
        .bind(done as i64)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
