//! Table definitions for the per-archive relational store (spec §3).
//!
//! `accepted_answer_id` deliberately carries no foreign key: the answer it
//! names may not have been indexed yet within the same post pass (spec §9
//! Open Questions — no hard FK on accepted answers).

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS tag (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    count_usage INTEGER NOT NULL CHECK (count_usage >= 0)
);

CREATE TABLE IF NOT EXISTS question (
    id INTEGER PRIMARY KEY,
    start INTEGER NOT NULL CHECK (start >= 0),
    length INTEGER NOT NULL CHECK (length > 0),
    score INTEGER NOT NULL,
    accepted_answer_id INTEGER
);

CREATE TABLE IF NOT EXISTS answer (
    id INTEGER PRIMARY KEY,
    start INTEGER NOT NULL CHECK (start >= 0),
    length INTEGER NOT NULL CHECK (length > 0),
    score INTEGER NOT NULL,
    question_id INTEGER NOT NULL REFERENCES question(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS question_tag (
    question_id INTEGER NOT NULL REFERENCES question(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tag(id) ON DELETE CASCADE,
    PRIMARY KEY (question_id, tag_id)
);

CREATE TABLE IF NOT EXISTS index_state (
    name TEXT NOT NULL,
    hash_file TEXT NOT NULL,
    index_done INTEGER NOT NULL,
    PRIMARY KEY (name, hash_file)
);

CREATE INDEX IF NOT EXISTS idx_answer_question_id ON answer(question_id);
CREATE INDEX IF NOT EXISTS idx_question_tag_tag_id ON question_tag(tag_id);
"#;
