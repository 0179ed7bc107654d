//! Persona catalog
//!
//! The compiled-in catalog is the authoritative default set; a YAML file
//! (one `personas:` list) replaces it wholesale when present so care staff
//! can review prompt text as data, not code. Validation runs on whichever
//! set wins.

use serde::{Deserialize, Serialize};
use std::path::Path;

use sentinel_core::{AgentPersona, DataScopes, IntentCategory};

use crate::ConfigError;

/// The full persona set the advisor selects from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaCatalog {
    pub personas: Vec<AgentPersona>,
}

impl Default for PersonaCatalog {
    fn default() -> Self {
        Self {
            personas: builtin_personas(),
        }
    }
}

impl PersonaCatalog {
    /// Load from a YAML file, replacing the compiled-in set
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|_| ConfigError::FileNotFound(path.as_ref().display().to_string()))?;

        let catalog: PersonaCatalog =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        catalog.validate()?;
        Ok(catalog)
    }

    /// Load from the configured path, falling back to the compiled-in set
    /// when the file does not exist
    pub fn load_or_default(path: &str) -> Result<Self, ConfigError> {
        if Path::new(path).exists() {
            let catalog = Self::load(path)?;
            tracing::info!(path = %path, personas = catalog.personas.len(), "Persona catalog loaded");
            Ok(catalog)
        } else {
            tracing::debug!(path = %path, "No persona catalog file; using built-in personas");
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.personas.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "personas".to_string(),
                message: "Catalog cannot be empty".to_string(),
            });
        }

        let defaults = self.personas.iter().filter(|p| p.is_default).count();
        if defaults != 1 {
            return Err(ConfigError::InvalidValue {
                field: "personas".to_string(),
                message: format!("Exactly one persona must be the default, found {}", defaults),
            });
        }

        for persona in &self.personas {
            if persona.agent_type.is_empty() || persona.name.is_empty() {
                return Err(ConfigError::MissingField(
                    "personas[].name / agent_type".to_string(),
                ));
            }

            if self
                .personas
                .iter()
                .filter(|p| p.agent_type == persona.agent_type)
                .count()
                > 1
            {
                return Err(ConfigError::InvalidValue {
                    field: format!("personas.{}", persona.agent_type),
                    message: "Duplicate agent_type".to_string(),
                });
            }

            if !(0.0..=2.0).contains(&persona.temperature) {
                return Err(ConfigError::InvalidValue {
                    field: format!("personas.{}.temperature", persona.agent_type),
                    message: format!("Must be between 0.0 and 2.0, got {}", persona.temperature),
                });
            }

            if persona.max_tokens == 0 || persona.max_tokens > 4096 {
                return Err(ConfigError::InvalidValue {
                    field: format!("personas.{}.max_tokens", persona.agent_type),
                    message: format!("Must be between 1 and 4096, got {}", persona.max_tokens),
                });
            }

            if persona.fallback_message.is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "personas.{}.fallback_message",
                    persona.agent_type
                )));
            }
        }

        Ok(())
    }

    pub fn default_persona(&self) -> &AgentPersona {
        // validate() guarantees exactly one
        self.personas
            .iter()
            .find(|p| p.is_default)
            .unwrap_or(&self.personas[0])
    }

    pub fn find_by_type(&self, agent_type: &str) -> Option<&AgentPersona> {
        self.personas.iter().find(|p| p.agent_type == agent_type)
    }

    pub fn find_for_category(&self, category: IntentCategory) -> Option<&AgentPersona> {
        self.personas.iter().find(|p| p.serves(category))
    }
}

/// The six SENTINEL personas
fn builtin_personas() -> Vec<AgentPersona> {
    vec![
        AgentPersona {
            name: "SENTINEL Advisor".to_string(),
            agent_type: "care_coordinator".to_string(),
            description: "General care coordination for families and residents".to_string(),
            system_prompt: "You are the SENTINEL Advisor, a compassionate care coordinator \
                for SENTINEL Senior Care. You help families navigate senior care with empathy \
                and expertise, coordinating between families, caregivers, and facility staff. \
                Keep responses warm, clear, and focused on the family's needs. If you do not \
                know an answer, say so and offer to connect the family with a staff member \
                rather than guessing."
                .to_string(),
            temperature: 0.7,
            max_tokens: 500,
            categories: vec![IntentCategory::General, IntentCategory::Emergency],
            scopes: DataScopes {
                patient_data: true,
                financial_data: false,
            },
            fallback_message: "I apologize for the technical difficulty. A member of our care \
                team will follow up with you shortly. For immediate assistance, please call \
                (215) 774-0743."
                .to_string(),
            is_default: true,
        },
        AgentPersona {
            name: "Intake Coordinator".to_string(),
            agent_type: "intake_coordinator".to_string(),
            description: "Tours, enrollment, and admission guidance".to_string(),
            system_prompt: "You are the Intake Coordinator for SENTINEL Senior Care. You guide \
                prospective residents and their families through tours, enrollment, and \
                admission paperwork. Be welcoming and thorough: explain what to expect, which \
                documents are needed, and the next step. Never quote availability you were not \
                given in context."
                .to_string(),
            temperature: 0.6,
            max_tokens: 600,
            categories: vec![IntentCategory::Admission],
            scopes: DataScopes::default(),
            fallback_message: "I apologize for the trouble. Our admissions team would love to \
                help you directly - please call (215) 774-0743 to schedule a tour or ask about \
                availability."
                .to_string(),
            is_default: false,
        },
        AgentPersona {
            name: "Medical Assistant".to_string(),
            agent_type: "medical_assistant".to_string(),
            description: "Medication and care-plan questions from recorded observations".to_string(),
            system_prompt: "You are the Medical Assistant for SENTINEL Senior Care. You answer \
                questions about medications, care plans, and daily health observations using \
                only the context provided. You are not a doctor: never diagnose, never adjust \
                dosages, and direct clinical decisions to the care team or the resident's \
                physician."
                .to_string(),
            temperature: 0.5,
            max_tokens: 400,
            categories: vec![IntentCategory::Medical],
            scopes: DataScopes {
                patient_data: true,
                financial_data: false,
            },
            fallback_message: "I'm sorry, I can't access that information right now. For \
                questions about medications or care, please call our nursing station at \
                (215) 774-0743."
                .to_string(),
            is_default: false,
        },
        AgentPersona {
            name: "Billing Specialist".to_string(),
            agent_type: "billing_specialist".to_string(),
            description: "Invoices, payments, insurance, and cost questions".to_string(),
            system_prompt: "You are the Billing Specialist for SENTINEL Senior Care. You explain \
                invoices, payment options, insurance coverage, and monthly costs clearly and \
                patiently. Use the invoice context when it is provided. If an amount is not in \
                context, offer to have the billing office confirm it rather than estimating."
                .to_string(),
            temperature: 0.3,
            max_tokens: 400,
            categories: vec![IntentCategory::Billing],
            scopes: DataScopes {
                patient_data: false,
                financial_data: true,
            },
            fallback_message: "I apologize for the inconvenience. Our billing office can answer \
                your question directly at (215) 774-0743, Monday through Friday."
                .to_string(),
            is_default: false,
        },
        AgentPersona {
            name: "Outreach Coordinator".to_string(),
            agent_type: "outreach_coordinator".to_string(),
            description: "Referrals, physicians, and partner facilities".to_string(),
            system_prompt: "You are the Outreach Coordinator for SENTINEL Senior Care. You work \
                with referring physicians, discharge planners, and partner facilities. Be \
                professional and concise, and collect the information needed to route a \
                referral to the right team."
                .to_string(),
            temperature: 0.8,
            max_tokens: 500,
            categories: vec![IntentCategory::Outreach],
            scopes: DataScopes::default(),
            fallback_message: "I apologize for the difficulty. For referrals and partnerships, \
                please call (215) 774-0743 and ask for the outreach team."
                .to_string(),
            is_default: false,
        },
        AgentPersona {
            name: "Wellness Companion".to_string(),
            agent_type: "wellness_companion".to_string(),
            description: "Companionship and emotional support for residents".to_string(),
            system_prompt: "You are the Wellness Companion for SENTINEL Senior Care. You offer a \
                friendly ear to residents who feel lonely or anxious. Be warm, patient, and \
                encouraging, and suggest activities from the context when appropriate. If a \
                resident sounds like they are in crisis, gently encourage them to press their \
                call button or dial (215) 774-0743."
                .to_string(),
            temperature: 0.8,
            max_tokens: 500,
            categories: vec![IntentCategory::Wellness],
            scopes: DataScopes {
                patient_data: true,
                financial_data: false,
            },
            fallback_message: "I'm sorry, I'm having trouble right now. If you'd like to talk to \
                someone, please call us at (215) 774-0743 - we're always happy to hear from you."
                .to_string(),
            is_default: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = PersonaCatalog::default();
        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.personas.len(), 6);
        assert_eq!(catalog.default_persona().name, "SENTINEL Advisor");
    }

    #[test]
    fn test_every_builtin_fallback_has_phone_number() {
        for persona in PersonaCatalog::default().personas {
            assert!(
                persona.fallback_message.contains("(215) 774-0743"),
                "{} fallback is missing the phone number",
                persona.agent_type
            );
        }
    }

    #[test]
    fn test_category_lookup() {
        let catalog = PersonaCatalog::default();
        let billing = catalog.find_for_category(IntentCategory::Billing).unwrap();
        assert_eq!(billing.name, "Billing Specialist");
        assert!(billing.scopes.financial_data);
        assert!(!billing.scopes.patient_data);

        assert!(catalog.find_for_category(IntentCategory::Medical).is_some());
    }

    #[test]
    fn test_duplicate_agent_type_rejected() {
        let mut catalog = PersonaCatalog::default();
        let mut dup = catalog.personas[1].clone();
        dup.is_default = false;
        catalog.personas.push(dup);
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_exactly_one_default_enforced() {
        let mut catalog = PersonaCatalog::default();
        catalog.personas[1].is_default = true;
        assert!(catalog.validate().is_err());

        for p in &mut catalog.personas {
            p.is_default = false;
        }
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let catalog = PersonaCatalog::default();
        let yaml = serde_yaml::to_string(&catalog).unwrap();
        let parsed: PersonaCatalog = serde_yaml::from_str(&yaml).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.personas.len(), catalog.personas.len());
    }

    #[test]
    fn test_missing_file_falls_back_to_builtin() {
        let catalog = PersonaCatalog::load_or_default("does/not/exist.yaml").unwrap();
        assert_eq!(catalog.personas.len(), 6);
    }
}
