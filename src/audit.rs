//! An append only log of who changed what.
//!
//! Events are written with the same connection or database transaction as the change they
//! describe, so a rolled back change leaves no audit entry behind.

use rusqlite::{Connection, params};
use serde_json::Value;

use crate::{Error, auth::UserID, db::now_utc_seconds};

/// The kinds of change that are audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    LoanApplied,
    LoanApproved,
    LoanDisbursed,
    LoanRejected,
    LoanDefaulted,
    LoanPayment,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoanApplied => "loan_applied",
            AuditAction::LoanApproved => "loan_approved",
            AuditAction::LoanDisbursed => "loan_disbursed",
            AuditAction::LoanRejected => "loan_rejected",
            AuditAction::LoanDefaulted => "loan_defaulted",
            AuditAction::LoanPayment => "loan_payment",
        }
    }
}

/// A single audited change.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// The user who made the change.
    pub user_id: UserID,
    pub action: AuditAction,
    /// The kind of record that changed, e.g. "loan".
    pub entity: &'static str,
    pub entity_id: i64,
    /// Free form JSON describing the change.
    pub details: Value,
}

pub fn create_audit_log_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL REFERENCES user(id) ON UPDATE CASCADE,
            action TEXT NOT NULL,
            entity TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            details TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )",
        (),
    )?;

    Ok(())
}

/// Append `event` to the audit log.
///
/// Pass the open database transaction of the audited change as `connection`.
pub fn record_audit_event(event: AuditEvent, connection: &Connection) -> Result<(), Error> {
    connection.execute(
        "INSERT INTO audit_log (user_id, action, entity, entity_id, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.user_id.as_i64(),
            event.action.as_str(),
            event.entity,
            event.entity_id,
            event.details.to_string(),
            now_utc_seconds(),
        ],
    )?;

    Ok(())
}

/// The actions recorded against an entity, oldest first.
#[cfg(test)]
pub fn get_audit_actions(
    entity: &str,
    entity_id: i64,
    connection: &Connection,
) -> Result<Vec<String>, Error> {
    connection
        .prepare("SELECT action FROM audit_log WHERE entity = ?1 AND entity_id = ?2 ORDER BY id")?
        .query_map(params![entity, entity_id], |row| row.get(0))?
        .map(|maybe_action| maybe_action.map_err(Error::from))
        .collect()
}
