//! Similarity search over processed videos.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default number of results.
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

/// Largest accepted result limit.
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// Default minimum similarity.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// A search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub limit: u32,
    pub threshold: f64,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: DEFAULT_SEARCH_LIMIT,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::validation("search query must not be empty"));
        }
        if self.limit == 0 || self.limit > MAX_SEARCH_LIMIT {
            return Err(Error::validation(format!(
                "search limit must be between 1 and {}, got {}",
                MAX_SEARCH_LIMIT, self.limit
            )));
        }
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::validation(format!(
                "similarity threshold must be between 0 and 1, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// What matched in a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchContent {
    /// A transcript passage.
    Text {
        matched_text: String,
        speaker: Option<String>,
    },
    /// A video frame.
    Image { image_reference: String },
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub source_artifact_id: String,
    pub source_name: String,
    /// Offset into the source video.
    pub timestamp_seconds: f64,
    pub content: SearchContent,
    /// Similarity in `0.0..=1.0`.
    pub similarity: f64,
}

impl SearchHit {
    /// Similarity as a whole percentage.
    pub fn similarity_percent(&self) -> u32 {
        (self.similarity.clamp(0.0, 1.0) * 100.0).round() as u32
    }
}

/// Drop hits below the threshold, order by descending similarity and keep at
/// most `limit`. Ties keep the backend's order.
pub fn rank_hits(mut hits: Vec<SearchHit>, query: &SearchQuery) -> Vec<SearchHit> {
    hits.retain(|hit| hit.similarity.is_finite() && hit.similarity >= query.threshold);
    hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    hits.truncate(query.limit as usize);
    hits
}
