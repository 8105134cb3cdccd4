use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{JobKind, ReasonCode};
use super::sync_run::RunCounts;
use crate::tenancy::TenantId;

/// In-app notification for one user about one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub user_id: Uuid,
    pub record_id: Option<Uuid>,
    pub reason: ReasonCode,
    pub message: String,
    pub run_id: Option<Uuid>,
    /// Identical keys for the same user are emitted once.
    pub dedupe_key: String,
    pub created_at: DateTime<Utc>,
}

/// One line of a run digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestLine {
    pub reason: ReasonCode,
    pub record_id: Option<Uuid>,
    pub summary: String,
}

/// Single outbound summary of a tenant's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDigest {
    pub tenant_id: TenantId,
    pub job: JobKind,
    pub run_id: Uuid,
    pub counts: RunCounts,
    pub lines: Vec<DigestLine>,
}

impl RunDigest {
    pub fn subject(&self) -> String {
        format!(
            "SDS sync ({}): {} updated, {} awaiting review",
            self.job, self.counts.applied, self.counts.queued
        )
    }
}
