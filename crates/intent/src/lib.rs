//! Intent classification for advisor messages
//!
//! Classification is an ordered rule table: each rule carries keywords
//! (substring match over the lowercased text) and optional compiled regex
//! patterns; the first matching rule wins. Nothing here errors - a message
//! that matches nothing resolves to the default category at low confidence,
//! optionally upgraded by a nearest-neighbor vote over stored embeddings
//! behind the [`SemanticIndex`] seam.
//!
//! Sentiment and topic annotations ride along with every classification and
//! end up on the conversation log row.

pub mod classifier;
pub mod semantic;
pub mod sentiment;
pub mod topics;

pub use classifier::{IntentClassifier, IntentRule};
pub use semantic::{majority_category, SemanticError, SemanticIndex};
pub use sentiment::analyze_sentiment;
pub use topics::extract_topics;

/// Confidence assigned to a keyword/pattern rule match
pub const RULE_CONFIDENCE: f32 = 0.9;
/// Confidence assigned to a semantic-neighbor match
pub const SEMANTIC_CONFIDENCE: f32 = 0.7;
/// Confidence of the default category when nothing matches
pub const DEFAULT_CONFIDENCE: f32 = 0.5;
