//! Operator-managed persona definitions
//!
//! Rows here override the YAML catalog when store-backed personas are
//! enabled. Definitions are stored as JSON so the persona shape can grow
//! without schema migrations.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;

use sentinel_core::AgentPersona;

use crate::{PersistenceError, ScyllaClient};

/// Persona definition store trait
#[async_trait]
pub trait PersonaStore: Send + Sync {
    async fn list(&self) -> Result<Vec<AgentPersona>, PersistenceError>;

    async fn upsert(&self, persona: &AgentPersona) -> Result<(), PersistenceError>;
}

/// ScyllaDB implementation of the persona store
#[derive(Clone)]
pub struct ScyllaPersonaStore {
    client: ScyllaClient,
}

impl ScyllaPersonaStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PersonaStore for ScyllaPersonaStore {
    async fn list(&self) -> Result<Vec<AgentPersona>, PersistenceError> {
        let query = format!(
            "SELECT agent_type, definition_json FROM {}.agent_definitions",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, &[]).await?;

        let mut personas = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (agent_type, definition_json): (String, String) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                match serde_json::from_str::<AgentPersona>(&definition_json) {
                    Ok(persona) => personas.push(persona),
                    Err(e) => {
                        // A bad row must not take down persona loading
                        tracing::warn!(
                            agent_type = %agent_type,
                            error = %e,
                            "Skipping unparseable persona definition"
                        );
                    }
                }
            }
        }

        Ok(personas)
    }

    async fn upsert(&self, persona: &AgentPersona) -> Result<(), PersistenceError> {
        let definition_json = serde_json::to_string(persona)
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        let query = format!(
            "INSERT INTO {}.agent_definitions (agent_type, definition_json, updated_at)
             VALUES (?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &persona.agent_type,
                    definition_json,
                    Utc::now().timestamp_millis(),
                ),
            )
            .await?;

        tracing::info!(agent_type = %persona.agent_type, "Persona definition stored");
        Ok(())
    }
}

/// In-memory persona store for tests
#[derive(Default)]
pub struct InMemoryPersonaStore {
    personas: RwLock<HashMap<String, AgentPersona>>,
}

impl InMemoryPersonaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersonaStore for InMemoryPersonaStore {
    async fn list(&self) -> Result<Vec<AgentPersona>, PersistenceError> {
        Ok(self.personas.read().values().cloned().collect())
    }

    async fn upsert(&self, persona: &AgentPersona) -> Result<(), PersistenceError> {
        self.personas
            .write()
            .insert(persona.agent_type.clone(), persona.clone());
        Ok(())
    }
}
