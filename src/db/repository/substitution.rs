use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{fmt_ts, parse_ts};
use crate::db::DatabaseError;
use crate::tenancy::TenantId;

/// Cached alternatives for a flagged record, with the time they were fetched.
pub fn get_substitution_suggestions(
    conn: &Connection,
    tenant_id: &TenantId,
    record_id: &Uuid,
) -> Result<Option<(Vec<String>, DateTime<Utc>)>, DatabaseError> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT alternatives, generated_at FROM substitution_suggestions
             WHERE tenant_id = ?1 AND record_id = ?2",
            params![tenant_id.as_str(), record_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        Some((alternatives, generated_at)) => Ok(Some((
            serde_json::from_str(&alternatives)?,
            parse_ts(&generated_at)?,
        ))),
        None => Ok(None),
    }
}

pub fn put_substitution_suggestions(
    conn: &Connection,
    tenant_id: &TenantId,
    record_id: &Uuid,
    alternatives: &[String],
    generated_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO substitution_suggestions (tenant_id, record_id, alternatives, generated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (tenant_id, record_id)
         DO UPDATE SET alternatives = excluded.alternatives, generated_at = excluded.generated_at",
        params![
            tenant_id.as_str(),
            record_id.to_string(),
            serde_json::to_string(alternatives)?,
            fmt_ts(generated_at)
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use chrono::TimeZone;

    #[test]
    fn put_replaces_previous_suggestions() {
        let conn = setup_db();
        let tenant = seed_tenant(&conn, "acme");
        let record = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();

        assert!(get_substitution_suggestions(&conn, &tenant, &record).unwrap().is_none());

        put_substitution_suggestions(&conn, &tenant, &record, &["Ethyl acetate".into()], t0).unwrap();
        put_substitution_suggestions(&conn, &tenant, &record, &["Cyrene".into(), "2-MeTHF".into()], t1)
            .unwrap();

        let (alts, at) = get_substitution_suggestions(&conn, &tenant, &record).unwrap().unwrap();
        assert_eq!(alts, vec!["Cyrene", "2-MeTHF"]);
        assert_eq!(at, t1);
    }
}
