//! libSQL-backed audit store. Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use super::migrations;
use super::{AuditOutcome, AuditStats, AuditStore, InteractionRecord};
use crate::error::DatabaseError;

pub struct LibSqlAuditStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlAuditStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;
        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Audit database opened");
        Ok(store)
    }

    /// In-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    async fn count(&self, where_clause: &str) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT COUNT(*) FROM interactions WHERE {where_clause}"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DatabaseError::Query(format!("count row parse: {e}"))),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count: {e}"))),
        }
    }
}

/// Parse an RFC 3339 or SQLite datetime string.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn row_to_record(row: &libsql::Row) -> Result<InteractionRecord, libsql::Error> {
    let outcome: String = row.get(6)?;
    let recorded_at: String = row.get(7)?;
    Ok(InteractionRecord {
        workflow_id: row.get(0)?,
        sender: row.get(1)?,
        subject: row.get(2)?,
        triage_decision: row.get(3)?,
        action_taken: row.get(4)?,
        human_approved: row.get::<i64>(5)? != 0,
        outcome: AuditOutcome::parse(&outcome).unwrap_or(AuditOutcome::Auto),
        recorded_at: parse_datetime(&recorded_at),
    })
}

#[async_trait]
impl AuditStore for LibSqlAuditStore {
    async fn record_interaction(&self, record: &InteractionRecord) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO interactions (workflow_id, sender, subject, triage_decision, action_taken, human_approved, outcome, recorded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.workflow_id.clone(),
                    record.sender.clone(),
                    record.subject.clone(),
                    record.triage_decision.clone(),
                    record.action_taken.clone(),
                    record.human_approved as i64,
                    record.outcome.as_str(),
                    record.recorded_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_interaction: {e}")))?;

        debug!(
            workflow_id = %record.workflow_id,
            outcome = record.outcome.as_str(),
            "Interaction recorded"
        );
        Ok(())
    }

    async fn stats(&self) -> Result<AuditStats, DatabaseError> {
        Ok(AuditStats {
            total_interactions: self.count("1 = 1").await?,
            approve_count: self.count("human_approved = 1").await?,
            deny_count: self.count("outcome = 'denied'").await?,
            ignore_count: self.count("outcome = 'ignored'").await?,
            auto_count: self.count("outcome = 'auto'").await?,
            error_count: self.count("outcome = 'error'").await?,
        })
    }

    async fn interactions_for(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<InteractionRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT workflow_id, sender, subject, triage_decision, action_taken, human_approved, outcome, recorded_at FROM interactions WHERE workflow_id = ?1 ORDER BY id ASC",
                params![workflow_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("interactions_for: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("interactions_for next row: {e}")))?
        {
            records.push(
                row_to_record(&row)
                    .map_err(|e| DatabaseError::Query(format!("interactions_for row parse: {e}")))?,
            );
        }
        Ok(records)
    }
}
