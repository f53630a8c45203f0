//! Storage layer for faculty-finder
//!
//! Read access to the faculty store and durable vector index snapshots

pub mod database;
pub mod records;
pub mod snapshot;

use crate::error::Result;

pub use database::{Database, DbPool, DbStats};
pub use records::{FacultyDetail, IndexableText, ScoredFaculty};
pub use snapshot::{SnapshotData, SnapshotError, SnapshotManifest, SnapshotStore};

/// Read-only view of the relational faculty store
pub trait FacultyStore: Send + Sync {
    /// Rows with non-empty embedding text, ordered by id
    fn fetch_indexable(&self) -> Result<Vec<IndexableText>>;

    /// Detail rows for the given ids, in no particular order; unknown ids are absent
    fn fetch_details(&self, ids: &[i64]) -> Result<Vec<FacultyDetail>>;
}
