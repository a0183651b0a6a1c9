//! Per-archive relational persistence (C5, spec §4.5).

pub mod schema;
pub mod store;

pub use store::{
    AnswerInsert, AnswerRecord, IndexStatus, IndexStore, QuestionInsert, QuestionRecord, TagInsert,
    TagRecord,
};
