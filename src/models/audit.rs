use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chemical::FieldChange;
use super::enums::AuditAction;
use crate::tenancy::TenantId;

/// Immutable provenance entry for one automated decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Option<i64>,
    pub tenant_id: TenantId,
    pub record_id: Option<Uuid>,
    pub action: AuditAction,
    pub confidence: Option<f64>,
    pub changed_fields: Vec<FieldChange>,
    pub run_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
