//! Escalation policy
//!
//! A fixed, ordered rule list scanned against every message before any
//! model call. A hit short-circuits generation: the caller returns the
//! rule's canned safety response, records an escalation event against the
//! conversation-log row, and notifies out of band. Notification failures
//! are logged and swallowed; the family already has the safety response.

use async_trait::async_trait;

use sentinel_config::EscalationRuleConfig;
use sentinel_core::{Classification, IntentCategory, Sentiment};
use sentinel_persistence::EscalationEvent;

use crate::AdvisorError;

/// One compiled rule: lowercased keywords plus an optional sentiment trigger
struct CompiledRule {
    name: String,
    keywords: Vec<String>,
    sentiment: Option<Sentiment>,
    escalation_type: String,
    targets: Vec<String>,
    auto_response: String,
}

/// What fired and what to send back
#[derive(Debug, Clone)]
pub struct EscalationMatch {
    /// Name of the rule that fired
    pub rule: String,
    pub escalation_type: String,
    /// Keyword that tripped the rule; None for sentiment or category hits
    pub matched: Option<String>,
    pub targets: Vec<String>,
    /// Canned, persona-independent safety response
    pub auto_response: String,
}

/// Ordered escalation rules; first match wins
pub struct EscalationPolicy {
    rules: Vec<CompiledRule>,
}

impl EscalationPolicy {
    pub fn from_config(rules: &[EscalationRuleConfig]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| CompiledRule {
                name: rule.name.clone(),
                keywords: rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
                sentiment: rule.sentiment.as_deref().and_then(Sentiment::parse),
                escalation_type: rule.escalation_type.clone(),
                targets: rule.targets.clone(),
                auto_response: rule.auto_response.clone(),
            })
            .collect();
        Self { rules }
    }

    /// First rule the message trips, if any.
    ///
    /// A rule fires on a case-insensitive keyword hit or a sentiment match.
    /// An Emergency classification that tripped no keyword still escalates
    /// through the first rule, so the safety response never hinges on exact
    /// phrasing.
    pub fn check(
        &self,
        message: &str,
        classification: &Classification,
    ) -> Option<EscalationMatch> {
        let lower = message.to_lowercase();

        for rule in &self.rules {
            if let Some(keyword) = rule.keywords.iter().find(|k| lower.contains(k.as_str())) {
                return Some(Self::hit(rule, Some(keyword.clone())));
            }
            if rule.sentiment == Some(classification.sentiment) {
                return Some(Self::hit(rule, None));
            }
        }

        if classification.category == IntentCategory::Emergency {
            return self.rules.first().map(|rule| Self::hit(rule, None));
        }

        None
    }

    fn hit(rule: &CompiledRule, matched: Option<String>) -> EscalationMatch {
        EscalationMatch {
            rule: rule.name.clone(),
            escalation_type: rule.escalation_type.clone(),
            matched,
            targets: rule.targets.clone(),
            auto_response: rule.auto_response.clone(),
        }
    }
}

/// Out-of-band escalation delivery
#[async_trait]
pub trait EscalationNotifier: Send + Sync {
    async fn notify(&self, event: &EscalationEvent) -> Result<(), AdvisorError>;
}

/// Writes the notification to the log stream. Stands in for pager or SMS
/// delivery until the facility wires one up.
pub struct TracingNotifier;

#[async_trait]
impl EscalationNotifier for TracingNotifier {
    async fn notify(&self, event: &EscalationEvent) -> Result<(), AdvisorError> {
        tracing::warn!(
            session_id = %event.session_id,
            rule = %event.rule,
            escalation_type = %event.escalation_type,
            targets = ?event.targets,
            "ESCALATION: care team notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_config::EscalationConfig;

    fn policy() -> EscalationPolicy {
        EscalationPolicy::from_config(&EscalationConfig::default().rules)
    }

    fn classified(category: IntentCategory, sentiment: Sentiment) -> Classification {
        Classification {
            category,
            confidence: 0.9,
            source: sentinel_core::ClassificationSource::Rule,
            matched: None,
            sentiment,
            topics: Vec::new(),
        }
    }

    #[test]
    fn test_keyword_hit_is_case_insensitive() {
        let hit = policy()
            .check(
                "My mom FELL and isn't responding",
                &classified(IntentCategory::Emergency, Sentiment::Urgent),
            )
            .unwrap();
        assert_eq!(hit.rule, "medical_emergency");
        assert_eq!(hit.matched.as_deref(), Some("fell"));
        assert!(hit.auto_response.contains("911"));
        assert!(hit.auto_response.contains("(215) 774-0743"));
    }

    #[test]
    fn test_benign_message_does_not_escalate() {
        let result = policy().check(
            "What time is bingo on Thursday?",
            &classified(IntentCategory::General, Sentiment::Neutral),
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_emergency_category_escalates_without_keyword() {
        // Classifier regexes can reach Emergency on phrasings the keyword
        // list misses; the category alone must still trip the policy.
        let hit = policy()
            .check(
                "She stopped breathing for a moment",
                &classified(IntentCategory::Emergency, Sentiment::Neutral),
            )
            .unwrap();
        assert_eq!(hit.rule, "medical_emergency");
    }

    #[test]
    fn test_sentiment_trigger() {
        let rules = vec![EscalationRuleConfig {
            name: "distress".to_string(),
            keywords: Vec::new(),
            sentiment: Some("urgent".to_string()),
            escalation_type: "wellbeing".to_string(),
            targets: vec!["social_worker".to_string()],
            auto_response: "A team member will reach out shortly.".to_string(),
        }];
        let policy = EscalationPolicy::from_config(&rules);

        let hit = policy
            .check(
                "I need someone right away",
                &classified(IntentCategory::General, Sentiment::Urgent),
            )
            .unwrap();
        assert_eq!(hit.escalation_type, "wellbeing");
        assert!(hit.matched.is_none());

        assert!(policy
            .check(
                "All fine here",
                &classified(IntentCategory::General, Sentiment::Neutral),
            )
            .is_none());
    }

    #[test]
    fn test_first_rule_wins() {
        let rules = vec![
            EscalationRuleConfig {
                name: "first".to_string(),
                keywords: vec!["pain".to_string()],
                sentiment: None,
                escalation_type: "a".to_string(),
                targets: Vec::new(),
                auto_response: "first response".to_string(),
            },
            EscalationRuleConfig {
                name: "second".to_string(),
                keywords: vec!["pain".to_string()],
                sentiment: None,
                escalation_type: "b".to_string(),
                targets: Vec::new(),
                auto_response: "second response".to_string(),
            },
        ];
        let policy = EscalationPolicy::from_config(&rules);

        let hit = policy
            .check(
                "severe pain since lunch",
                &classified(IntentCategory::Medical, Sentiment::Urgent),
            )
            .unwrap();
        assert_eq!(hit.rule, "first");
    }
}
