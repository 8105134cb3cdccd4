use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{fmt_ts, parse_opt_ts, parse_opt_uuid, parse_tenant, parse_ts, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::PendingReview;
use crate::tenancy::TenantId;

const PENDING_COLUMNS: &str = "id, tenant_id, record_id, source, origin_ref, fields_json, confidence,
     extraction_hash, reason, storage_key, status, created_at, reviewed_at";

pub fn insert_pending(conn: &Connection, review: &PendingReview) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO pending_reviews (id, tenant_id, record_id, source, origin_ref, fields_json,
         confidence, extraction_hash, reason, storage_key, status, created_at, reviewed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            review.id.to_string(),
            review.tenant_id.as_str(),
            review.record_id.map(|id| id.to_string()),
            review.source.as_str(),
            review.origin_ref,
            serde_json::to_string(&review.fields)?,
            review.confidence,
            review.extraction_hash,
            review.reason.as_str(),
            review.storage_key,
            review.status.as_str(),
            fmt_ts(review.created_at),
            review.reviewed_at.map(fmt_ts),
        ],
    )?;
    Ok(())
}

/// Load a pending item by id alone. The caller must check ownership
/// against its own tenant scope before acting on the result.
pub fn get_pending_by_id(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<PendingReview>, DatabaseError> {
    let sql = format!("SELECT {PENDING_COLUMNS} FROM pending_reviews WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![id.to_string()], read_row)?;
    match rows.next() {
        Some(row) => Ok(Some(pending_from_row(row?)?)),
        None => Ok(None),
    }
}

/// Open review items of one tenant, oldest first.
pub fn list_pending(
    conn: &Connection,
    tenant_id: &TenantId,
) -> Result<Vec<PendingReview>, DatabaseError> {
    let sql = format!(
        "SELECT {PENDING_COLUMNS} FROM pending_reviews
         WHERE tenant_id = ?1 AND status = 'pending'
         ORDER BY created_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![tenant_id.as_str()], read_row)?;
    let mut items = Vec::new();
    for row in rows {
        items.push(pending_from_row(row?)?);
    }
    Ok(items)
}

/// Whether the same extraction was queued for this tenant at or after `since`.
pub fn pending_hash_exists(
    conn: &Connection,
    tenant_id: &TenantId,
    extraction_hash: &str,
    since: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pending_reviews
         WHERE tenant_id = ?1 AND extraction_hash = ?2 AND created_at >= ?3",
        params![tenant_id.as_str(), extraction_hash, fmt_ts(since)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Close a pending item. Only items still `pending` transition.
pub fn set_pending_status(
    conn: &Connection,
    tenant_id: &TenantId,
    id: &Uuid,
    status: ReviewStatus,
    reviewed_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE pending_reviews SET status = ?1, reviewed_at = ?2
         WHERE tenant_id = ?3 AND id = ?4 AND status = 'pending'",
        params![
            status.as_str(),
            fmt_ts(reviewed_at),
            tenant_id.as_str(),
            id.to_string()
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "pending_review".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

struct PendingRow {
    id: String,
    tenant_id: String,
    record_id: Option<String>,
    source: String,
    origin_ref: String,
    fields_json: String,
    confidence: f64,
    extraction_hash: String,
    reason: String,
    storage_key: Option<String>,
    status: String,
    created_at: String,
    reviewed_at: Option<String>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<PendingRow> {
    Ok(PendingRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        record_id: row.get(2)?,
        source: row.get(3)?,
        origin_ref: row.get(4)?,
        fields_json: row.get(5)?,
        confidence: row.get(6)?,
        extraction_hash: row.get(7)?,
        reason: row.get(8)?,
        storage_key: row.get(9)?,
        status: row.get(10)?,
        created_at: row.get(11)?,
        reviewed_at: row.get(12)?,
    })
}

fn pending_from_row(row: PendingRow) -> Result<PendingReview, DatabaseError> {
    Ok(PendingReview {
        id: parse_uuid(&row.id)?,
        tenant_id: parse_tenant(&row.tenant_id)?,
        record_id: parse_opt_uuid(row.record_id)?,
        source: CandidateSource::from_str(&row.source)?,
        origin_ref: row.origin_ref,
        fields: serde_json::from_str(&row.fields_json)?,
        confidence: row.confidence,
        extraction_hash: row.extraction_hash,
        reason: QueueReason::from_str(&row.reason)?,
        storage_key: row.storage_key,
        status: ReviewStatus::from_str(&row.status)?,
        created_at: parse_ts(&row.created_at)?,
        reviewed_at: parse_opt_ts(row.reviewed_at)?,
    })
}
