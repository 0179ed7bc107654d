//! Invoice persistence

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{PersistenceError, ScyllaClient};

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Open,
    Paid,
    Overdue,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Void => "void",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "paid" => Self::Paid,
            "overdue" => Self::Overdue,
            "void" => Self::Void,
            _ => Self::Open,
        }
    }
}

/// One invoice for a patient's stay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Sortable id, e.g. INV-2025-0141
    pub invoice_id: String,
    pub patient_id: String,
    pub amount_cents: i64,
    pub status: InvoiceStatus,
    pub due_date: NaiveDate,
    pub issued_at: DateTime<Utc>,
    pub description: Option<String>,
}

/// Invoice store trait
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn upsert(&self, invoice: &Invoice) -> Result<(), PersistenceError>;

    /// Most recent invoices for a patient, newest id first
    async fn recent_for_patient(
        &self,
        patient_id: &str,
        limit: i32,
    ) -> Result<Vec<Invoice>, PersistenceError>;
}

/// ScyllaDB implementation of the invoice store
#[derive(Clone)]
pub struct ScyllaInvoiceStore {
    client: ScyllaClient,
}

impl ScyllaInvoiceStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InvoiceStore for ScyllaInvoiceStore {
    async fn upsert(&self, invoice: &Invoice) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.invoices (
                patient_id, invoice_id, amount_cents, status,
                due_date, issued_at, description
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &invoice.patient_id,
                    &invoice.invoice_id,
                    invoice.amount_cents,
                    invoice.status.as_str(),
                    invoice.due_date.to_string(),
                    invoice.issued_at.timestamp_millis(),
                    &invoice.description,
                ),
            )
            .await?;

        Ok(())
    }

    async fn recent_for_patient(
        &self,
        patient_id: &str,
        limit: i32,
    ) -> Result<Vec<Invoice>, PersistenceError> {
        let query = format!(
            "SELECT patient_id, invoice_id, amount_cents, status,
                    due_date, issued_at, description
             FROM {}.invoices WHERE patient_id = ? LIMIT ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (patient_id, limit))
            .await?;

        let mut invoices = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (patient_id, invoice_id, amount_cents, status, due_date, issued_at, description): (
                    String,
                    String,
                    i64,
                    String,
                    String,
                    i64,
                    Option<String>,
                ) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

                invoices.push(Invoice {
                    invoice_id,
                    patient_id,
                    amount_cents,
                    status: InvoiceStatus::parse(&status),
                    due_date: NaiveDate::parse_from_str(&due_date, "%Y-%m-%d")
                        .unwrap_or_else(|_| Utc::now().date_naive()),
                    issued_at: DateTime::from_timestamp_millis(issued_at)
                        .unwrap_or_else(Utc::now),
                    description,
                });
            }
        }

        Ok(invoices)
    }
}

/// In-memory invoice store for tests
#[derive(Default)]
pub struct InMemoryInvoiceStore {
    invoices: RwLock<Vec<Invoice>>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn upsert(&self, invoice: &Invoice) -> Result<(), PersistenceError> {
        let mut invoices = self.invoices.write();
        invoices.retain(|i| {
            !(i.patient_id == invoice.patient_id && i.invoice_id == invoice.invoice_id)
        });
        invoices.push(invoice.clone());
        Ok(())
    }

    async fn recent_for_patient(
        &self,
        patient_id: &str,
        limit: i32,
    ) -> Result<Vec<Invoice>, PersistenceError> {
        let invoices = self.invoices.read();
        let mut rows: Vec<Invoice> = invoices
            .iter()
            .filter(|i| i.patient_id == patient_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.invoice_id.cmp(&a.invoice_id));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}
