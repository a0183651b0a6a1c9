//! Random-access indexer and query engine over Stack-Exchange-style data
//! dump archives.
//!
//! Leaf-first, matching the component table: [`archive`] (C1/C3/C4, with
//! C2's block index living in the [`parallel_bzip2`] path dependency),
//! [`store`] (C5), [`indexer`] (C6), [`query`] (C7) and [`registry`] (C8).
//! [`http`] is the thin external collaborator that wires the core onto
//! `axum`; [`config`] and [`error`] are the ambient configuration and error
//! types shared by every layer above.

pub mod archive;
pub mod config;
pub mod error;
pub mod http;
pub mod indexer;
pub mod magic_offset;
pub mod query;
pub mod registry;
pub mod store;
pub mod xml;

pub use config::Config;
pub use registry::Registry;
