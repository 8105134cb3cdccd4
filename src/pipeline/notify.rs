//! Per-run notification dispatch.
//!
//! Outcomes are collected as `Notice`s during a tenant's run and dispatched
//! once at the end: one in-app notification per notice per recipient, and a
//! single digest mail covering every notice that was new for someone.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::clients::DigestMailer;
use crate::db::repository::{insert_notification, list_alert_recipients};
use crate::models::enums::{JobKind, ReasonCode};
use crate::models::{DigestLine, Notification, RunCounts, RunDigest};
use crate::pipeline::error::SyncError;
use crate::tenancy::TenantScope;

/// One reportable outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub reason: ReasonCode,
    pub record_id: Option<Uuid>,
    pub summary: String,
    /// Same key, same user: emitted once.
    pub dedupe_key: String,
}

impl Notice {
    pub fn new(reason: ReasonCode, record_id: Option<Uuid>, summary: impl Into<String>, dedupe_key: impl Into<String>) -> Self {
        Self {
            reason,
            record_id,
            summary: summary.into(),
            dedupe_key: dedupe_key.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub notifications: u32,
    pub digest_sent: bool,
}

pub struct RunInfo {
    pub job: JobKind,
    pub run_id: Uuid,
    pub counts: RunCounts,
}

/// Deliver a run's notices to the tenant's opted-in ADMIN/HMS users.
///
/// Digest delivery failures are logged and not retried.
pub fn dispatch(
    conn: &Connection,
    mailer: &dyn DigestMailer,
    scope: &TenantScope,
    run: &RunInfo,
    notices: &[Notice],
    now: DateTime<Utc>,
) -> Result<DispatchSummary, SyncError> {
    let mut summary = DispatchSummary::default();
    if notices.is_empty() {
        return Ok(summary);
    }

    let recipients = list_alert_recipients(conn, scope.tenant())?;
    for user in &recipients {
        scope.ensure_owned(&user.tenant_id, "user", user.id)?;
    }
    if recipients.is_empty() {
        tracing::debug!(tenant_id = %scope.tenant(), "No opted-in recipients, notices dropped");
        return Ok(summary);
    }

    let mut lines = Vec::new();
    for notice in notices {
        let mut fresh = false;
        for user in &recipients {
            let notification = Notification {
                id: Uuid::new_v4(),
                tenant_id: scope.tenant().clone(),
                user_id: user.id,
                record_id: notice.record_id,
                reason: notice.reason,
                message: notice.summary.clone(),
                run_id: Some(run.run_id),
                dedupe_key: notice.dedupe_key.clone(),
                created_at: now,
            };
            if insert_notification(conn, &notification)? {
                summary.notifications += 1;
                fresh = true;
            }
        }
        if fresh {
            lines.push(DigestLine {
                reason: notice.reason,
                record_id: notice.record_id,
                summary: notice.summary.clone(),
            });
        }
    }

    if lines.is_empty() {
        return Ok(summary);
    }

    let digest = RunDigest {
        tenant_id: scope.tenant().clone(),
        job: run.job,
        run_id: run.run_id,
        counts: run.counts,
        lines,
    };
    let addresses: Vec<String> = recipients.iter().map(|u| u.email.clone()).collect();
    match mailer.send_digest(&addresses, &digest) {
        Ok(()) => summary.digest_sent = true,
        Err(e) => tracing::warn!(
            tenant_id = %scope.tenant(),
            run_id = %run.run_id,
            error = %e,
            "Digest delivery failed"
        ),
    }
    Ok(summary)
}
