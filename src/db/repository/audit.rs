use std::str::FromStr;

use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{fmt_ts, parse_opt_uuid, parse_tenant, parse_ts};
use crate::db::DatabaseError;
use crate::models::enums::AuditAction;
use crate::models::AuditEntry;
use crate::tenancy::TenantId;

/// Append one entry to the audit log. Returns the assigned row id.
///
/// The table rejects UPDATE and DELETE at the schema level.
pub fn insert_audit_entry(conn: &Connection, entry: &AuditEntry) -> Result<i64, DatabaseError> {
    let changed = serde_json::to_string(&entry.changed_fields)?;
    conn.execute(
        "INSERT INTO audit_log (tenant_id, record_id, action, confidence, changed_fields, run_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.tenant_id.as_str(),
            entry.record_id.map(|id| id.to_string()),
            entry.action.as_str(),
            entry.confidence,
            changed,
            entry.run_id.map(|id| id.to_string()),
            fmt_ts(entry.created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Newest-first audit trail of one tenant.
pub fn list_audit_for_tenant(
    conn: &Connection,
    tenant_id: &TenantId,
    limit: u32,
) -> Result<Vec<AuditEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, record_id, action, confidence, changed_fields, run_id, created_at
         FROM audit_log WHERE tenant_id = ?1
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![tenant_id.as_str(), limit], read_row)?;
    collect_entries(rows)
}

/// Newest-first audit trail of one record.
pub fn list_audit_for_record(
    conn: &Connection,
    tenant_id: &TenantId,
    record_id: &Uuid,
) -> Result<Vec<AuditEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, record_id, action, confidence, changed_fields, run_id, created_at
         FROM audit_log WHERE tenant_id = ?1 AND record_id = ?2
         ORDER BY id DESC",
    )?;
    let rows = stmt.query_map(params![tenant_id.as_str(), record_id.to_string()], read_row)?;
    collect_entries(rows)
}

struct AuditRow {
    id: i64,
    tenant_id: String,
    record_id: Option<String>,
    action: String,
    confidence: Option<f64>,
    changed_fields: String,
    run_id: Option<String>,
    created_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<AuditRow> {
    Ok(AuditRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        record_id: row.get(2)?,
        action: row.get(3)?,
        confidence: row.get(4)?,
        changed_fields: row.get(5)?,
        run_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn collect_entries(
    rows: impl Iterator<Item = rusqlite::Result<AuditRow>>,
) -> Result<Vec<AuditEntry>, DatabaseError> {
    let mut entries = Vec::new();
    for row in rows {
        let row = row?;
        entries.push(AuditEntry {
            id: Some(row.id),
            tenant_id: parse_tenant(&row.tenant_id)?,
            record_id: parse_opt_uuid(row.record_id)?,
            action: AuditAction::from_str(&row.action)?,
            confidence: row.confidence,
            changed_fields: serde_json::from_str(&row.changed_fields)?,
            run_id: parse_opt_uuid(row.run_id)?,
            created_at: parse_ts(&row.created_at)?,
        });
    }
    Ok(entries)
}
