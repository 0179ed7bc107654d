//! Ordered keyword rule table

use regex::Regex;
use std::sync::Arc;

use sentinel_core::{Classification, ClassificationSource, IntentCategory};

use crate::semantic::{majority_category, SemanticIndex};
use crate::sentiment::analyze_sentiment;
use crate::topics::extract_topics;
use crate::{DEFAULT_CONFIDENCE, RULE_CONFIDENCE, SEMANTIC_CONFIDENCE};

/// One classification rule. Keywords are matched as substrings of the
/// lowercased message; patterns run against the same lowercased text.
pub struct IntentRule {
    pub category: IntentCategory,
    pub keywords: Vec<&'static str>,
    pub patterns: Vec<Regex>,
}

impl IntentRule {
    fn matched_keyword(&self, lower: &str) -> Option<String> {
        if let Some(keyword) = self.keywords.iter().find(|k| lower.contains(*k)) {
            return Some((*keyword).to_string());
        }
        self.patterns
            .iter()
            .find(|p| p.is_match(lower))
            .map(|p| p.as_str().to_string())
    }
}

/// Rule-table classifier with an optional semantic fallback
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
    semantic: Option<Arc<dyn SemanticIndex>>,
    /// Neighbors consulted per fallback lookup
    neighbors: usize,
}

impl IntentClassifier {
    /// Classifier with the built-in SENTINEL rule table
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<IntentRule>) -> Self {
        Self {
            rules,
            semantic: None,
            neighbors: 3,
        }
    }

    /// Attach a semantic fallback consulted only when no rule matches
    pub fn with_semantic_index(mut self, index: Arc<dyn SemanticIndex>, neighbors: usize) -> Self {
        self.semantic = Some(index);
        self.neighbors = neighbors.max(1);
        self
    }

    /// Rule-table pass only. Never fails; fills in sentiment and topics.
    pub fn classify_rules(&self, text: &str) -> Classification {
        let lower = text.to_lowercase();
        let sentiment = analyze_sentiment(&lower);
        let topics = extract_topics(&lower);

        for rule in &self.rules {
            if let Some(matched) = rule.matched_keyword(&lower) {
                return Classification {
                    category: rule.category,
                    confidence: RULE_CONFIDENCE,
                    source: ClassificationSource::Rule,
                    matched: Some(matched),
                    sentiment,
                    topics,
                };
            }
        }

        Classification {
            category: IntentCategory::General,
            confidence: DEFAULT_CONFIDENCE,
            source: ClassificationSource::Default,
            matched: None,
            sentiment,
            topics,
        }
    }

    /// Full classification: rules first, then the semantic vote when no
    /// rule matched. Fallback errors degrade to the default category.
    pub async fn classify(&self, text: &str) -> Classification {
        let mut classification = self.classify_rules(text);

        if classification.source != ClassificationSource::Default {
            return classification;
        }

        if let Some(index) = &self.semantic {
            match index.nearest_categories(text, self.neighbors).await {
                Ok(neighbors) => {
                    if let Some(category) = majority_category(&neighbors) {
                        tracing::debug!(
                            category = %category,
                            neighbors = neighbors.len(),
                            "semantic fallback resolved intent"
                        );
                        classification.category = category;
                        classification.confidence = SEMANTIC_CONFIDENCE;
                        classification.source = ClassificationSource::Semantic;
                        classification.matched = None;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "semantic fallback unavailable");
                }
            }
        }

        classification
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// The built-in SENTINEL rule table, highest priority first.
///
/// Emergency outranks everything so mixed messages ("chest pain and a
/// billing question") route to the safety path. The remaining order mirrors
/// how specific each vocabulary is.
pub fn default_rules() -> Vec<IntentRule> {
    vec![
        IntentRule {
            category: IntentCategory::Emergency,
            keywords: vec![
                "emergency",
                "911",
                "chest pain",
                "can't breathe",
                "cannot breathe",
                "unconscious",
                "unresponsive",
                "choking",
            ],
            patterns: vec![
                // "isn't breathing", "not responding", "stopped breathing"
                Regex::new(r"(isn'?t|not|stopped)\s+(breathing|responding)").unwrap(),
            ],
        },
        IntentRule {
            category: IntentCategory::Billing,
            keywords: vec![
                "bill", "payment", "invoice", "charge", "insurance", "cost", "price",
            ],
            patterns: vec![Regex::new(r"how much (does|is|will|would)").unwrap()],
        },
        IntentRule {
            category: IntentCategory::Medical,
            keywords: vec![
                "medication",
                "medicine",
                "prescription",
                "doctor",
                "nurse",
                "pain",
                "symptom",
                "treatment",
            ],
            patterns: vec![],
        },
        IntentRule {
            category: IntentCategory::Admission,
            keywords: vec![
                "admission",
                "admit",
                "enroll",
                "join",
                "tour",
                "availability",
                "new patient",
                "move in",
                "considering",
            ],
            patterns: vec![],
        },
        IntentRule {
            category: IntentCategory::Outreach,
            keywords: vec![
                "referral",
                "refer a patient",
                "physician",
                "discharge planner",
                "partnership",
                "collaborate",
            ],
            patterns: vec![],
        },
        IntentRule {
            category: IntentCategory::Wellness,
            keywords: vec![
                "lonely", "alone", "sad", "depressed", "anxious", "isolated",
            ],
            patterns: vec![],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_core::Sentiment;

    use crate::semantic::SemanticError;

    #[test]
    fn test_billing_keyword() {
        let classifier = IntentClassifier::new();
        let c = classifier.classify_rules("How much does a monthly stay cost?");
        assert_eq!(c.category, IntentCategory::Billing);
        assert_eq!(c.source, ClassificationSource::Rule);
        assert!((c.confidence - RULE_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_billing_pattern_without_keyword() {
        let classifier = IntentClassifier::new();
        let c = classifier.classify_rules("How much would respite care be for a week?");
        assert_eq!(c.category, IntentCategory::Billing);
    }

    #[test]
    fn test_medical_keyword() {
        let classifier = IntentClassifier::new();
        let c = classifier.classify_rules("Did dad get his medication this morning?");
        assert_eq!(c.category, IntentCategory::Medical);
    }

    #[test]
    fn test_admission_keyword() {
        let classifier = IntentClassifier::new();
        let c = classifier.classify_rules("We'd like to schedule a tour next week");
        assert_eq!(c.category, IntentCategory::Admission);
    }

    #[test]
    fn test_emergency_outranks_billing() {
        let classifier = IntentClassifier::new();
        let c = classifier.classify_rules("Emergency! Also I have a question about my bill");
        assert_eq!(c.category, IntentCategory::Emergency);
    }

    #[test]
    fn test_emergency_pattern() {
        let classifier = IntentClassifier::new();
        let c = classifier.classify_rules("My mom fell and isn't responding");
        assert_eq!(c.category, IntentCategory::Emergency);
    }

    #[test]
    fn test_case_insensitive() {
        let classifier = IntentClassifier::new();
        let c = classifier.classify_rules("INVOICE QUESTION");
        assert_eq!(c.category, IntentCategory::Billing);
    }

    #[test]
    fn test_default_category() {
        let classifier = IntentClassifier::new();
        let c = classifier.classify_rules("Hi");
        assert_eq!(c.category, IntentCategory::General);
        assert_eq!(c.source, ClassificationSource::Default);
        assert!((c.confidence - DEFAULT_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn test_annotations_ride_along() {
        let classifier = IntentClassifier::new();
        let c = classifier.classify_rules("I'm worried about the bill");
        assert_eq!(c.category, IntentCategory::Billing);
        assert_eq!(c.sentiment, Sentiment::Negative);
        assert!(c.topics.contains(&"billing".to_string()));
    }

    struct FixedIndex(Vec<IntentCategory>);

    #[async_trait]
    impl SemanticIndex for FixedIndex {
        async fn nearest_categories(
            &self,
            _text: &str,
            _limit: usize,
        ) -> Result<Vec<IntentCategory>, SemanticError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenIndex;

    #[async_trait]
    impl SemanticIndex for BrokenIndex {
        async fn nearest_categories(
            &self,
            _text: &str,
            _limit: usize,
        ) -> Result<Vec<IntentCategory>, SemanticError> {
            Err(SemanticError::Store("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_semantic_fallback_upgrades_default() {
        let classifier = IntentClassifier::new().with_semantic_index(
            Arc::new(FixedIndex(vec![
                IntentCategory::Wellness,
                IntentCategory::Wellness,
                IntentCategory::General,
            ])),
            3,
        );
        let c = classifier.classify("grandma seems off lately").await;
        assert_eq!(c.category, IntentCategory::Wellness);
        assert_eq!(c.source, ClassificationSource::Semantic);
        assert!((c.confidence - SEMANTIC_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_semantic_fallback_never_overrides_rule_match() {
        let classifier = IntentClassifier::new().with_semantic_index(
            Arc::new(FixedIndex(vec![IntentCategory::Wellness])),
            3,
        );
        let c = classifier.classify("question about an invoice").await;
        assert_eq!(c.category, IntentCategory::Billing);
        assert_eq!(c.source, ClassificationSource::Rule);
    }

    #[tokio::test]
    async fn test_semantic_error_degrades_to_default() {
        let classifier =
            IntentClassifier::new().with_semantic_index(Arc::new(BrokenIndex), 3);
        let c = classifier.classify("completely unmatched text").await;
        assert_eq!(c.category, IntentCategory::General);
        assert_eq!(c.source, ClassificationSource::Default);
    }
}
