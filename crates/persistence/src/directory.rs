//! Care directory: family members and the patients they are linked to
//!
//! The directory is what connects a chat `user_id` to a patient record,
//! which in turn gates access to care events and invoices.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{PersistenceError, ScyllaClient};

/// A family member account, keyed by chat user id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyMember {
    pub user_id: String,
    pub name: String,
    /// e.g. daughter, son, spouse
    pub relationship: String,
    pub patient_id: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// A patient record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: String,
    pub name: String,
    pub room: Option<String>,
    pub care_level: Option<String>,
    pub admitted_at: Option<DateTime<Utc>>,
}

/// Directory store trait
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn family_member(&self, user_id: &str)
        -> Result<Option<FamilyMember>, PersistenceError>;

    async fn patient(&self, patient_id: &str) -> Result<Option<Patient>, PersistenceError>;

    async fn upsert_family_member(&self, member: &FamilyMember) -> Result<(), PersistenceError>;

    async fn upsert_patient(&self, patient: &Patient) -> Result<(), PersistenceError>;
}

/// ScyllaDB implementation of the directory store
#[derive(Clone)]
pub struct ScyllaDirectoryStore {
    client: ScyllaClient,
}

impl ScyllaDirectoryStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DirectoryStore for ScyllaDirectoryStore {
    async fn family_member(
        &self,
        user_id: &str,
    ) -> Result<Option<FamilyMember>, PersistenceError> {
        let query = format!(
            "SELECT user_id, name, relationship, patient_id, phone, email
             FROM {}.family_members WHERE user_id = ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id,))
            .await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let (user_id, name, relationship, patient_id, phone, email): (
                    String,
                    String,
                    String,
                    String,
                    Option<String>,
                    Option<String>,
                ) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                return Ok(Some(FamilyMember {
                    user_id,
                    name,
                    relationship,
                    patient_id,
                    phone,
                    email,
                }));
            }
        }

        Ok(None)
    }

    async fn patient(&self, patient_id: &str) -> Result<Option<Patient>, PersistenceError> {
        let query = format!(
            "SELECT patient_id, name, room, care_level, admitted_at
             FROM {}.patients WHERE patient_id = ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (patient_id,))
            .await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let (patient_id, name, room, care_level, admitted_at): (
                    String,
                    String,
                    Option<String>,
                    Option<String>,
                    Option<i64>,
                ) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                return Ok(Some(Patient {
                    patient_id,
                    name,
                    room,
                    care_level,
                    admitted_at: admitted_at.and_then(DateTime::from_timestamp_millis),
                }));
            }
        }

        Ok(None)
    }

    async fn upsert_family_member(&self, member: &FamilyMember) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.family_members (user_id, name, relationship, patient_id, phone, email)
             VALUES (?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &member.user_id,
                    &member.name,
                    &member.relationship,
                    &member.patient_id,
                    &member.phone,
                    &member.email,
                ),
            )
            .await?;

        Ok(())
    }

    async fn upsert_patient(&self, patient: &Patient) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.patients (patient_id, name, room, care_level, admitted_at)
             VALUES (?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &patient.patient_id,
                    &patient.name,
                    &patient.room,
                    &patient.care_level,
                    patient.admitted_at.map(|at| at.timestamp_millis()),
                ),
            )
            .await?;

        Ok(())
    }
}

/// In-memory directory store for tests
#[derive(Default)]
pub struct InMemoryDirectoryStore {
    members: RwLock<HashMap<String, FamilyMember>>,
    patients: RwLock<HashMap<String, Patient>>,
}

impl InMemoryDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectoryStore {
    async fn family_member(
        &self,
        user_id: &str,
    ) -> Result<Option<FamilyMember>, PersistenceError> {
        Ok(self.members.read().get(user_id).cloned())
    }

    async fn patient(&self, patient_id: &str) -> Result<Option<Patient>, PersistenceError> {
        Ok(self.patients.read().get(patient_id).cloned())
    }

    async fn upsert_family_member(&self, member: &FamilyMember) -> Result<(), PersistenceError> {
        self.members
            .write()
            .insert(member.user_id.clone(), member.clone());
        Ok(())
    }

    async fn upsert_patient(&self, patient: &Patient) -> Result<(), PersistenceError> {
        self.patients
            .write()
            .insert(patient.patient_id.clone(), patient.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_member_to_patient_link() {
        let store = InMemoryDirectoryStore::new();
        store
            .upsert_patient(&Patient {
                patient_id: "p-100".to_string(),
                name: "Eleanor Reyes".to_string(),
                room: Some("214".to_string()),
                care_level: Some("memory_care".to_string()),
                admitted_at: None,
            })
            .await
            .unwrap();
        store
            .upsert_family_member(&FamilyMember {
                user_id: "fm-1".to_string(),
                name: "Maria Reyes".to_string(),
                relationship: "daughter".to_string(),
                patient_id: "p-100".to_string(),
                phone: None,
                email: None,
            })
            .await
            .unwrap();

        let member = store.family_member("fm-1").await.unwrap().unwrap();
        let patient = store.patient(&member.patient_id).await.unwrap().unwrap();
        assert_eq!(patient.name, "Eleanor Reyes");
        assert!(store.family_member("unknown").await.unwrap().is_none());
    }
}
