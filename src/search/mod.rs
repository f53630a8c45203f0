//! Faculty search façade
//!
//! Joins ranked index hits back to faculty details from the store.

mod facade;

pub use facade::{details_in_order, FacultySearch, WarmUp};

use crate::error::{FinderError, Result};
use serde::{Deserialize, Serialize};

/// Search request as handed over by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Query text
    pub text: String,

    /// Maximum number of results
    pub limit: usize,

    /// Minimum cosine similarity a result must reach
    pub threshold: f32,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, limit: usize, threshold: f32) -> Self {
        Self {
            text: text.into(),
            limit,
            threshold,
        }
    }

    /// Reject malformed input before it reaches the index
    pub fn validate(&self, max_limit: usize) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(FinderError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }

        if self.limit == 0 {
            return Err(FinderError::InvalidQuery(
                "Limit must be greater than 0".to_string(),
            ));
        }

        if self.limit > max_limit {
            return Err(FinderError::InvalidQuery(format!(
                "Limit {} exceeds the maximum of {}",
                self.limit, max_limit
            )));
        }

        if !self.threshold.is_finite() || !(-1.0..=1.0).contains(&self.threshold) {
            return Err(FinderError::InvalidQuery(format!(
                "Threshold must be between -1.0 and 1.0, got {}",
                self.threshold
            )));
        }

        Ok(())
    }
}
