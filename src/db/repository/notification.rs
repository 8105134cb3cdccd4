use std::str::FromStr;

use rusqlite::{params, Connection};

use super::{fmt_ts, parse_opt_uuid, parse_tenant, parse_ts, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::ReasonCode;
use crate::models::Notification;
use crate::tenancy::TenantId;

/// Store a notification unless the user already has one with the same
/// dedupe key. Returns `true` when a row was written.
pub fn insert_notification(conn: &Connection, n: &Notification) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO notifications
         (id, tenant_id, user_id, record_id, reason, message, run_id, dedupe_key, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            n.id.to_string(),
            n.tenant_id.as_str(),
            n.user_id.to_string(),
            n.record_id.map(|id| id.to_string()),
            n.reason.as_str(),
            n.message,
            n.run_id.map(|id| id.to_string()),
            n.dedupe_key,
            fmt_ts(n.created_at),
        ],
    )?;
    Ok(inserted > 0)
}

/// All notifications of one tenant, oldest first.
pub fn list_notifications(
    conn: &Connection,
    tenant_id: &TenantId,
) -> Result<Vec<Notification>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, user_id, record_id, reason, message, run_id, dedupe_key, created_at
         FROM notifications WHERE tenant_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![tenant_id.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, String>(8)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, tenant, user, record, reason, message, run, dedupe_key, created_at) = row?;
        out.push(Notification {
            id: parse_uuid(&id)?,
            tenant_id: parse_tenant(&tenant)?,
            user_id: parse_uuid(&user)?,
            record_id: parse_opt_uuid(record)?,
            reason: ReasonCode::from_str(&reason)?,
            message,
            run_id: parse_opt_uuid(run)?,
            dedupe_key,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(out)
}
