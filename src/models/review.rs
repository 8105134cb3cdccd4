use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{CandidateSource, QueueReason, ReviewStatus};
use super::extraction::ExtractedFields;
use crate::tenancy::TenantId;

/// An extraction parked for human review. Canonical record fields are not
/// touched until it is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReview {
    pub id: Uuid,
    pub tenant_id: TenantId,
    /// Best-guess target; `None` when no record matched.
    pub record_id: Option<Uuid>,
    pub source: CandidateSource,
    /// Message id + attachment name, or supplier catalog number.
    pub origin_ref: String,
    pub fields: ExtractedFields,
    pub confidence: f64,
    pub extraction_hash: String,
    pub reason: QueueReason,
    pub storage_key: Option<String>,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}
