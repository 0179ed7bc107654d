//! Semantic fallback seam
//!
//! The rule table stays self-contained; anything embedding-based sits
//! behind [`SemanticIndex`] so deployments can disable or replace it
//! without touching classification.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use sentinel_core::IntentCategory;

#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Neighbor lookup error: {0}")]
    Store(String),
}

/// Nearest-neighbor lookup over previously classified messages
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Categories of the nearest stored neighbors above the similarity
    /// threshold, best first. An empty result means no usable neighbor.
    async fn nearest_categories(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<IntentCategory>, SemanticError>;
}

/// Most common category in the neighbor list; earlier entries break ties
pub fn majority_category(neighbors: &[IntentCategory]) -> Option<IntentCategory> {
    let mut counts: HashMap<IntentCategory, usize> = HashMap::new();
    for cat in neighbors {
        *counts.entry(*cat).or_insert(0) += 1;
    }

    let mut best: Option<(IntentCategory, usize)> = None;
    for cat in neighbors {
        let count = counts[cat];
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((*cat, count));
        }
    }
    best.map(|(cat, _)| cat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_majority_vote() {
        let neighbors = [
            IntentCategory::Billing,
            IntentCategory::Medical,
            IntentCategory::Billing,
        ];
        assert_eq!(majority_category(&neighbors), Some(IntentCategory::Billing));
    }

    #[test]
    fn test_tie_prefers_nearest() {
        let neighbors = [IntentCategory::Medical, IntentCategory::Billing];
        assert_eq!(majority_category(&neighbors), Some(IntentCategory::Medical));
    }

    #[test]
    fn test_empty_neighbors() {
        assert_eq!(majority_category(&[]), None);
    }
}
