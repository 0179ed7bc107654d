//! Intent categories and classification annotations
//!
//! The category set is closed: routing is a dispatch table, not an open
//! taxonomy. New categories require a persona that serves them, so both
//! live in configuration reviewed together.

use serde::{Deserialize, Serialize};

/// Coarse message category used to pick a persona
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum IntentCategory {
    /// Life-safety language; short-circuits to the escalation path
    Emergency,
    /// Invoices, payments, insurance
    Billing,
    /// Medication, symptoms, clinical questions
    Medical,
    /// Tours, enrollment, availability
    Admission,
    /// Referrals and partner facilities
    Outreach,
    /// Loneliness and emotional wellbeing
    Wellness,
    /// Everything else
    #[default]
    General,
}

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::Emergency => "emergency",
            IntentCategory::Billing => "billing",
            IntentCategory::Medical => "medical",
            IntentCategory::Admission => "admission",
            IntentCategory::Outreach => "outreach",
            IntentCategory::Wellness => "wellness",
            IntentCategory::General => "general",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "emergency" => Some(IntentCategory::Emergency),
            "billing" => Some(IntentCategory::Billing),
            "medical" => Some(IntentCategory::Medical),
            "admission" => Some(IntentCategory::Admission),
            "outreach" => Some(IntentCategory::Outreach),
            "wellness" => Some(IntentCategory::Wellness),
            "general" => Some(IntentCategory::General),
            _ => None,
        }
    }
}

impl std::fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message sentiment, annotated on every log row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum Sentiment {
    Urgent,
    Negative,
    Positive,
    #[default]
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Urgent => "urgent",
            Sentiment::Negative => "negative",
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "urgent" => Some(Sentiment::Urgent),
            "negative" => Some(Sentiment::Negative),
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the classifier arrived at its category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// A keyword/pattern rule matched
    Rule,
    /// Nearest-neighbor vote over stored embeddings
    Semantic,
    /// Nothing matched; default category
    Default,
}

impl ClassificationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationSource::Rule => "rule",
            ClassificationSource::Semantic => "semantic",
            ClassificationSource::Default => "default",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rule" => Some(ClassificationSource::Rule),
            "semantic" => Some(ClassificationSource::Semantic),
            "default" => Some(ClassificationSource::Default),
            _ => None,
        }
    }
}

/// Full classifier output for one message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub category: IntentCategory,
    /// Heuristic in [0, 1]: 0.9 rule match, 0.7 semantic, 0.5 default
    pub confidence: f32,
    pub source: ClassificationSource,
    /// Keyword or rule name that decided the category, when one did
    pub matched: Option<String>,
    pub sentiment: Sentiment,
    /// Topic labels from the fixed keyword map
    pub topics: Vec<String>,
}

impl Classification {
    /// The low-confidence default used when no rule or neighbor matches
    pub fn general() -> Self {
        Self {
            category: IntentCategory::General,
            confidence: 0.5,
            source: ClassificationSource::Default,
            matched: None,
            sentiment: Sentiment::Neutral,
            topics: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for cat in [
            IntentCategory::Emergency,
            IntentCategory::Billing,
            IntentCategory::Medical,
            IntentCategory::Admission,
            IntentCategory::Outreach,
            IntentCategory::Wellness,
            IntentCategory::General,
        ] {
            assert_eq!(IntentCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(IntentCategory::parse("bogus"), None);
    }

    #[test]
    fn test_default_classification() {
        let c = Classification::general();
        assert_eq!(c.category, IntentCategory::General);
        assert_eq!(c.source, ClassificationSource::Default);
        assert!((c.confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&IntentCategory::Emergency).unwrap();
        assert_eq!(json, "\"emergency\"");
        let s: Sentiment = serde_json::from_str("\"urgent\"").unwrap();
        assert_eq!(s, Sentiment::Urgent);
    }
}
