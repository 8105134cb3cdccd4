//! Idempotence ledgers: ingested mail attachments and applied extractions.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::fmt_ts;
use crate::db::DatabaseError;
use crate::models::enums::CandidateSource;
use crate::tenancy::TenantId;

pub fn attachment_ingested(
    conn: &Connection,
    tenant_id: &TenantId,
    message_id: &str,
    attachment_hash: &str,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM ingested_attachments
         WHERE tenant_id = ?1 AND message_id = ?2 AND attachment_hash = ?3",
        params![tenant_id.as_str(), message_id, attachment_hash],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Record an attachment's terminal outcome. Re-marking is a no-op.
pub fn mark_attachment_ingested(
    conn: &Connection,
    tenant_id: &TenantId,
    message_id: &str,
    attachment_hash: &str,
    outcome: &str,
    at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO ingested_attachments
         (tenant_id, message_id, attachment_hash, outcome, ingested_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![tenant_id.as_str(), message_id, attachment_hash, outcome, fmt_ts(at)],
    )?;
    Ok(())
}

/// Whether this exact extraction was applied to the record at or after `since`.
pub fn applied_update_exists(
    conn: &Connection,
    tenant_id: &TenantId,
    record_id: &Uuid,
    extraction_hash: &str,
    since: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM applied_updates
         WHERE tenant_id = ?1 AND record_id = ?2 AND extraction_hash = ?3 AND applied_at >= ?4",
        params![tenant_id.as_str(), record_id.to_string(), extraction_hash, fmt_ts(since)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn record_applied_update(
    conn: &Connection,
    tenant_id: &TenantId,
    record_id: &Uuid,
    extraction_hash: &str,
    source: CandidateSource,
    at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO applied_updates (tenant_id, record_id, extraction_hash, source, applied_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            tenant_id.as_str(),
            record_id.to_string(),
            extraction_hash,
            source.as_str(),
            fmt_ts(at)
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 2, 0, 0).unwrap()
    }

    #[test]
    fn attachment_marked_once() {
        let conn = setup_db();
        let tenant = seed_tenant(&conn, "acme");
        assert!(!attachment_ingested(&conn, &tenant, "m1", "abc").unwrap());

        mark_attachment_ingested(&conn, &tenant, "m1", "abc", "applied", now()).unwrap();
        mark_attachment_ingested(&conn, &tenant, "m1", "abc", "queued", now()).unwrap();
        assert!(attachment_ingested(&conn, &tenant, "m1", "abc").unwrap());
        assert!(!attachment_ingested(&conn, &tenant, "m2", "abc").unwrap());
    }

    #[test]
    fn attachment_ledger_is_per_tenant() {
        let conn = setup_db();
        let acme = seed_tenant(&conn, "acme");
        let globex = seed_tenant(&conn, "globex");
        mark_attachment_ingested(&conn, &acme, "m1", "abc", "applied", now()).unwrap();
        assert!(!attachment_ingested(&conn, &globex, "m1", "abc").unwrap());
    }

    #[test]
    fn applied_update_window() {
        let conn = setup_db();
        let tenant = seed_tenant(&conn, "acme");
        let record = Uuid::new_v4();
        record_applied_update(&conn, &tenant, &record, "h1", CandidateSource::SupplierApi, now())
            .unwrap();

        assert!(applied_update_exists(&conn, &tenant, &record, "h1", now() - Duration::days(7)).unwrap());
        assert!(!applied_update_exists(&conn, &tenant, &record, "h2", now() - Duration::days(7)).unwrap());
        assert!(!applied_update_exists(&conn, &tenant, &record, "h1", now() + Duration::seconds(1)).unwrap());
    }
}
