//! Row shapes read from the `faculty` table

use serde::{Deserialize, Serialize};

/// Text eligible for embedding, keyed by faculty id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexableText {
    pub id: i64,
    pub text: String,
}

/// Presentable projection of a faculty row (everything except `bio_text_clean`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacultyDetail {
    pub id: i64,
    pub name: String,
    pub department: Option<String>,
    pub bio: Option<String>,
    pub research_interests: Option<String>,
    pub education: Option<String>,
    pub profile_url: Option<String>,
    pub image_url: Option<String>,
}

/// A faculty detail ranked by a search, with its cosine score attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFaculty {
    #[serde(flatten)]
    pub detail: FacultyDetail,
    pub score: f32,
}
