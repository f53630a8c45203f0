//! Faculty Finder - semantic faculty recommendation
//!
//! Embeds cleaned faculty biographies with a local sentence-embedding model,
//! persists the vectors next to their faculty ids, and answers free-text
//! queries with cosine-ranked faculty details read back from the SQLite store.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod search;
pub mod storage;

pub use error::{FinderError, Result};
