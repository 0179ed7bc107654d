//! Agent persona definitions
//!
//! A persona is static configuration: prompt text, sampling parameters,
//! the intent categories it serves, and the data scopes it may read.
//! Selection never mutates a persona.

use serde::{Deserialize, Serialize};

use crate::intent::IntentCategory;

/// Data the context builder may attach for a persona
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataScopes {
    /// Care events and patient details
    #[serde(default)]
    pub patient_data: bool,
    /// Outstanding invoices
    #[serde(default)]
    pub financial_data: bool,
}

/// A virtual agent persona
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPersona {
    /// Display name, returned to callers (e.g. "Billing Specialist")
    pub name: String,
    /// Stable identifier used in log rows and lookups
    pub agent_type: String,
    /// One-line capability summary for the listing endpoint
    #[serde(default)]
    pub description: String,
    /// System prompt sent to the model
    pub system_prompt: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Output token budget
    pub max_tokens: u32,
    /// Intent categories this persona serves
    #[serde(default)]
    pub categories: Vec<IntentCategory>,
    #[serde(default)]
    pub scopes: DataScopes,
    /// Returned verbatim when the model call fails; always carries the
    /// facility phone number
    pub fallback_message: String,
    /// Exactly one persona in a registry should set this
    #[serde(default)]
    pub is_default: bool,
}

impl AgentPersona {
    pub fn serves(&self, category: IntentCategory) -> bool {
        self.categories.contains(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serves() {
        let persona = AgentPersona {
            name: "Billing Specialist".to_string(),
            agent_type: "billing_specialist".to_string(),
            description: String::new(),
            system_prompt: "You handle billing questions.".to_string(),
            temperature: 0.3,
            max_tokens: 400,
            categories: vec![IntentCategory::Billing],
            scopes: DataScopes {
                patient_data: false,
                financial_data: true,
            },
            fallback_message: "Please call us.".to_string(),
            is_default: false,
        };
        assert!(persona.serves(IntentCategory::Billing));
        assert!(!persona.serves(IntentCategory::Medical));
    }

    #[test]
    fn test_yaml_defaults() {
        let yaml = r#"
name: "Test"
agent_type: "test"
system_prompt: "prompt"
temperature: 0.7
max_tokens: 500
fallback_message: "call us"
"#;
        let persona: AgentPersona = serde_yaml::from_str(yaml).unwrap();
        assert!(persona.categories.is_empty());
        assert!(!persona.scopes.patient_data);
        assert!(!persona.is_default);
    }
}
