use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{fmt_ts, parse_opt_ts, parse_tenant, parse_ts, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::{JobKind, RunStatus};
use crate::models::{RunCounts, SyncRun};
use crate::tenancy::TenantId;

/// Persist a run in the `running` state.
pub fn start_sync_run(conn: &Connection, run: &SyncRun) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sync_runs (id, tenant_id, job, started_at, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            run.id.to_string(),
            run.tenant_id.as_str(),
            run.job.as_str(),
            fmt_ts(run.started_at),
            RunStatus::Running.as_str(),
        ],
    )?;
    Ok(())
}

/// Write the terminal status and counters of a run.
pub fn finish_sync_run(conn: &Connection, run: &SyncRun) -> Result<(), DatabaseError> {
    let c = &run.counts;
    let updated = conn.execute(
        "UPDATE sync_runs SET finished_at = ?1, status = ?2, found = ?3, applied = ?4,
         queued = ?5, discarded = ?6, failed = ?7, deferred = ?8, error = ?9
         WHERE id = ?10 AND tenant_id = ?11",
        params![
            run.finished_at.map(fmt_ts),
            run.status.as_str(),
            c.found,
            c.applied,
            c.queued,
            c.discarded,
            c.failed,
            c.deferred,
            run.error,
            run.id.to_string(),
            run.tenant_id.as_str(),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "sync_run".into(),
            id: run.id.to_string(),
        });
    }
    Ok(())
}

/// Run history of one tenant and job, newest first.
pub fn list_sync_runs(
    conn: &Connection,
    tenant_id: &TenantId,
    job: JobKind,
) -> Result<Vec<SyncRun>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, tenant_id, job, started_at, finished_at, status, found, applied, queued,
                discarded, failed, deferred, error
         FROM sync_runs WHERE tenant_id = ?1 AND job = ?2
         ORDER BY started_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![tenant_id.as_str(), job.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
            RunCounts {
                found: row.get(6)?,
                applied: row.get(7)?,
                queued: row.get(8)?,
                discarded: row.get(9)?,
                failed: row.get(10)?,
                deferred: row.get(11)?,
            },
            row.get::<_, Option<String>>(12)?,
        ))
    })?;

    let mut runs = Vec::new();
    for row in rows {
        let (id, tenant, job, started_at, finished_at, status, counts, error) = row?;
        runs.push(SyncRun {
            id: parse_uuid(&id)?,
            tenant_id: parse_tenant(&tenant)?,
            job: JobKind::from_str(&job)?,
            started_at: parse_ts(&started_at)?,
            finished_at: parse_opt_ts(finished_at)?,
            status: RunStatus::from_str(&status)?,
            counts,
            error,
        });
    }
    Ok(runs)
}

/// Start time of the newest finished run, if any.
pub fn last_finished_run_at(
    conn: &Connection,
    tenant_id: &TenantId,
    job: JobKind,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    let raw: Option<String> = conn.query_row(
        "SELECT MAX(started_at) FROM sync_runs
         WHERE tenant_id = ?1 AND job = ?2 AND status IN ('completed', 'partial')",
        params![tenant_id.as_str(), job.as_str()],
        |row| row.get(0),
    )?;
    parse_opt_ts(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn run(tenant: &TenantId, started_at: DateTime<Utc>) -> SyncRun {
        SyncRun {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            job: JobKind::SupplierPoll,
            started_at,
            finished_at: None,
            status: RunStatus::Running,
            counts: RunCounts::default(),
            error: None,
        }
    }

    #[test]
    fn started_run_is_running_until_finished() {
        let conn = setup_db();
        let tenant = seed_tenant(&conn, "acme");
        let t0 = Utc.with_ymd_and_hms(2026, 10, 19, 3, 0, 0).unwrap();
        let mut r = run(&tenant, t0);
        start_sync_run(&conn, &r).unwrap();

        let listed = list_sync_runs(&conn, &tenant, JobKind::SupplierPoll).unwrap();
        assert_eq!(listed[0].status, RunStatus::Running);
        assert_eq!(last_finished_run_at(&conn, &tenant, JobKind::SupplierPoll).unwrap(), None);

        r.status = RunStatus::Partial;
        r.finished_at = Some(t0 + Duration::minutes(4));
        r.counts.found = 3;
        r.counts.applied = 2;
        r.counts.failed = 1;
        finish_sync_run(&conn, &r).unwrap();

        let listed = list_sync_runs(&conn, &tenant, JobKind::SupplierPoll).unwrap();
        assert_eq!(listed, vec![r]);
        assert_eq!(
            last_finished_run_at(&conn, &tenant, JobKind::SupplierPoll).unwrap(),
            Some(t0)
        );
    }

    #[test]
    fn history_is_per_job() {
        let conn = setup_db();
        let tenant = seed_tenant(&conn, "acme");
        start_sync_run(&conn, &run(&tenant, Utc::now())).unwrap();
        assert!(list_sync_runs(&conn, &tenant, JobKind::RegistrySync).unwrap().is_empty());
    }
}
