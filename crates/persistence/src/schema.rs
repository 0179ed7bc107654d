//! ScyllaDB schema creation
//!
//! All timestamps are stored as BIGINT epoch milliseconds so rows bind
//! directly to i64 without timezone surprises.

use crate::error::PersistenceError;
use scylla::Session;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // Conversation log, one row per handled message, newest first per session
    let conversation_log = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.conversation_log (
            session_id TEXT,
            timestamp BIGINT,
            id UUID,
            user_id TEXT,
            channel TEXT,
            message TEXT,
            response TEXT,
            agent_type TEXT,
            intent TEXT,
            confidence FLOAT,
            source TEXT,
            sentiment TEXT,
            topics LIST<TEXT>,
            escalated BOOLEAN,
            fallback BOOLEAN,
            latency_ms BIGINT,
            embedding LIST<FLOAT>,
            PRIMARY KEY ((session_id), timestamp, id)
        ) WITH CLUSTERING ORDER BY (timestamp DESC, id DESC)
    "#,
        keyspace
    );

    session.query_unpaged(conversation_log, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create conversation_log table: {}", e))
    })?;

    // Day-bucketed projection of the log for metrics windows. Written
    // best effort alongside the session row.
    let conversation_log_by_day = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.conversation_log_by_day (
            day TEXT,
            timestamp BIGINT,
            id UUID,
            session_id TEXT,
            agent_type TEXT,
            intent TEXT,
            confidence FLOAT,
            sentiment TEXT,
            topics LIST<TEXT>,
            escalated BOOLEAN,
            fallback BOOLEAN,
            latency_ms BIGINT,
            PRIMARY KEY ((day), timestamp, id)
        ) WITH CLUSTERING ORDER BY (timestamp DESC, id DESC)
    "#,
        keyspace
    );

    session.query_unpaged(conversation_log_by_day, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!(
            "Failed to create conversation_log_by_day table: {}",
            e
        ))
    })?;

    // Escalation events, each referencing the log row that triggered it
    let escalation_events = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.escalation_events (
            session_id TEXT,
            timestamp BIGINT,
            id UUID,
            log_id UUID,
            rule TEXT,
            escalation_type TEXT,
            matched TEXT,
            targets LIST<TEXT>,
            message TEXT,
            acknowledged BOOLEAN,
            PRIMARY KEY ((session_id), timestamp, id)
        ) WITH CLUSTERING ORDER BY (timestamp DESC, id DESC)
    "#,
        keyspace
    );

    session.query_unpaged(escalation_events, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create escalation_events table: {}", e))
    })?;

    // Conversation feedback
    let feedback = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.feedback (
            session_id TEXT,
            timestamp BIGINT,
            id UUID,
            user_id TEXT,
            rating INT,
            helpful BOOLEAN,
            comment TEXT,
            agent_type TEXT,
            PRIMARY KEY ((session_id), timestamp, id)
        ) WITH CLUSTERING ORDER BY (timestamp DESC, id DESC)
    "#,
        keyspace
    );

    session.query_unpaged(feedback, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create feedback table: {}", e))
    })?;

    // Family member directory, keyed by the chat user id
    let family_members = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.family_members (
            user_id TEXT,
            name TEXT,
            relationship TEXT,
            patient_id TEXT,
            phone TEXT,
            email TEXT,
            PRIMARY KEY (user_id)
        )
    "#,
        keyspace
    );

    session.query_unpaged(family_members, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create family_members table: {}", e))
    })?;

    // Patient directory
    let patients = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.patients (
            patient_id TEXT,
            name TEXT,
            room TEXT,
            care_level TEXT,
            admitted_at BIGINT,
            PRIMARY KEY (patient_id)
        )
    "#,
        keyspace
    );

    session.query_unpaged(patients, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create patients table: {}", e))
    })?;

    // Care events per patient, newest first
    let care_events = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.care_events (
            patient_id TEXT,
            timestamp BIGINT,
            id UUID,
            event_type TEXT,
            description TEXT,
            staff TEXT,
            PRIMARY KEY ((patient_id), timestamp, id)
        ) WITH CLUSTERING ORDER BY (timestamp DESC, id DESC)
    "#,
        keyspace
    );

    session.query_unpaged(care_events, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create care_events table: {}", e))
    })?;

    // Invoices per patient
    let invoices = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.invoices (
            patient_id TEXT,
            invoice_id TEXT,
            amount_cents BIGINT,
            status TEXT,
            due_date TEXT,
            issued_at BIGINT,
            description TEXT,
            PRIMARY KEY ((patient_id), invoice_id)
        ) WITH CLUSTERING ORDER BY (invoice_id DESC)
    "#,
        keyspace
    );

    session.query_unpaged(invoices, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create invoices table: {}", e))
    })?;

    // Operator-managed persona overrides, JSON per agent type
    let agent_definitions = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.agent_definitions (
            agent_type TEXT,
            definition_json TEXT,
            updated_at BIGINT,
            PRIMARY KEY (agent_type)
        )
    "#,
        keyspace
    );

    session.query_unpaged(agent_definitions, &[]).await.map_err(|e| {
        PersistenceError::SchemaError(format!("Failed to create agent_definitions table: {}", e))
    })?;

    tracing::info!("All tables created successfully");
    Ok(())
}
