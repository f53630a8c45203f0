//! Ranked search and detail lookup over the vector index and faculty store

use crate::embedding::{BuildOutcome, VectorIndex};
use crate::error::{FinderError, Result};
use crate::search::SearchQuery;
use crate::storage::{FacultyDetail, FacultyStore, ScoredFaculty};
use std::collections::HashMap;
use std::sync::Arc;

/// How `warm_up` got the index ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmUp {
    Loaded,
    Built(BuildOutcome),
}

/// Public search operations consumed by the command layer
pub struct FacultySearch {
    index: Arc<VectorIndex>,
    store: Arc<dyn FacultyStore>,
    max_limit: usize,
}

impl FacultySearch {
    pub fn new(index: Arc<VectorIndex>, store: Arc<dyn FacultyStore>, max_limit: usize) -> Self {
        Self {
            index,
            store,
            max_limit,
        }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Load the persisted index, or build it when there is none usable
    pub fn warm_up(&self) -> Result<WarmUp> {
        if self.index.load() {
            return Ok(WarmUp::Loaded);
        }

        tracing::info!("Building index on startup");
        Ok(WarmUp::Built(self.index.build()?))
    }

    /// Rank faculty against the query and attach details in rank order
    ///
    /// Ids the store no longer knows are dropped.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<ScoredFaculty>> {
        query.validate(self.max_limit)?;

        let hits = self
            .index
            .search(&query.text, query.limit, query.threshold)?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = hits.iter().map(|hit| hit.id).collect();
        let mut details = self.details_by_id(&ids)?;

        let results: Vec<ScoredFaculty> = hits
            .into_iter()
            .filter_map(|hit| match details.remove(&hit.id) {
                Some(detail) => Some(ScoredFaculty {
                    detail,
                    score: hit.score,
                }),
                None => {
                    tracing::debug!("Dropping stale index entry {}", hit.id);
                    None
                }
            })
            .collect();

        Ok(results)
    }

    /// Fetch details in the caller's order, skipping unknown ids
    pub fn get_details(&self, ids: &[i64]) -> Result<Vec<FacultyDetail>> {
        details_in_order(self.store.as_ref(), ids)
    }

    /// Fetch a single faculty member
    pub fn get_detail(&self, id: i64) -> Result<FacultyDetail> {
        self.get_details(&[id])?
            .pop()
            .ok_or(FinderError::FacultyNotFound { id })
    }

    fn details_by_id(&self, ids: &[i64]) -> Result<HashMap<i64, FacultyDetail>> {
        details_by_id(self.store.as_ref(), ids)
    }
}

fn details_by_id(store: &dyn FacultyStore, ids: &[i64]) -> Result<HashMap<i64, FacultyDetail>> {
    Ok(store
        .fetch_details(ids)?
        .into_iter()
        .map(|detail| (detail.id, detail))
        .collect())
}

/// Fetch details from `store` in the order of `ids`, skipping unknown ids
///
/// A repeated id is returned once, at its first position.
pub fn details_in_order(store: &dyn FacultyStore, ids: &[i64]) -> Result<Vec<FacultyDetail>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut details = details_by_id(store, ids)?;
    Ok(ids.iter().filter_map(|id| details.remove(id)).collect())
}
