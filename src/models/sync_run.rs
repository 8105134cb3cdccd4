use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{JobKind, RunStatus};
use crate::tenancy::TenantId;

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub found: u32,
    pub applied: u32,
    pub queued: u32,
    pub discarded: u32,
    pub failed: u32,
    pub deferred: u32,
}

impl RunCounts {
    /// Candidates or records that reached a terminal outcome.
    pub fn settled(&self) -> u32 {
        self.applied + self.queued + self.discarded
    }
}

/// One tenant's pass through one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub job: JobKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub error: Option<String>,
}
