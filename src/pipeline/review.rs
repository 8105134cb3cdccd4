//! Human resolution of queued suggestions.
//!
//! Confirming applies the same field-level merge as an automatic update;
//! dismissing closes the item without touching the record.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::error::SyncError;
use super::merge::{plan_merge, MergeContext};
use crate::config::EngineConfig;
use crate::db::repository::{
    get_chemical, get_pending_by_id, insert_audit_entry, list_pending, record_applied_update,
    set_pending_status, update_chemical_fields,
};
use crate::db::DatabaseError;
use crate::models::enums::{AuditAction, ReviewStatus};
use crate::models::{AuditEntry, FieldChange, PendingReview};
use crate::tenancy::TenantScope;

/// Open review items of the scope's tenant.
pub fn open_reviews(conn: &Connection, scope: &TenantScope) -> Result<Vec<PendingReview>, SyncError> {
    Ok(list_pending(conn, scope.tenant())?)
}

fn load_open(conn: &Connection, scope: &TenantScope, review_id: &Uuid) -> Result<PendingReview, SyncError> {
    let review = get_pending_by_id(conn, review_id)?.ok_or_else(|| {
        SyncError::ReviewNotApplicable(format!("review item {review_id} does not exist"))
    })?;
    scope.ensure_owned(&review.tenant_id, "pending_review", review.id)?;
    if review.status != ReviewStatus::Pending {
        return Err(SyncError::ReviewNotApplicable(format!(
            "review item {review_id} is already {}",
            review.status
        )));
    }
    Ok(review)
}

/// Apply a queued suggestion to its record, or to `target` when the
/// reviewer picked a different one. Returns the applied changes.
pub fn confirm_review(
    conn: &Connection,
    scope: &TenantScope,
    review_id: &Uuid,
    target: Option<Uuid>,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<Vec<FieldChange>, SyncError> {
    let review = load_open(conn, scope, review_id)?;
    let record_id = target.or(review.record_id).ok_or_else(|| {
        SyncError::ReviewNotApplicable(format!("review item {review_id} has no target record"))
    })?;
    let record = get_chemical(conn, scope.tenant(), &record_id)?.ok_or_else(|| {
        SyncError::ReviewNotApplicable(format!("record {record_id} not found for this tenant"))
    })?;
    scope.ensure_owned(&record.tenant_id, "chemical", record.id)?;

    let ctx = MergeContext {
        now,
        review_interval_months: config.sds_review_interval_months,
        storage_key: review.storage_key.clone(),
        fallback_version: None,
        fallback_sds_date: None,
    };
    let changes = plan_merge(&record, &review.fields, &ctx);

    let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
    update_chemical_fields(&tx, scope.tenant(), &record.id, &changes, now)?;
    record_applied_update(&tx, scope.tenant(), &record.id, &review.extraction_hash, review.source, now)?;
    set_pending_status(&tx, scope.tenant(), &review.id, ReviewStatus::Confirmed, now)?;
    insert_audit_entry(
        &tx,
        &AuditEntry {
            id: None,
            tenant_id: scope.tenant().clone(),
            record_id: Some(record.id),
            action: AuditAction::ReviewConfirmed,
            confidence: Some(review.confidence),
            changed_fields: changes.clone(),
            run_id: None,
            created_at: now,
        },
    )?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        tenant_id = %scope.tenant(),
        review_id = %review.id,
        record_id = %record.id,
        changed = changes.len(),
        "Review confirmed"
    );
    Ok(changes)
}

pub fn dismiss_review(
    conn: &Connection,
    scope: &TenantScope,
    review_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<(), SyncError> {
    let review = load_open(conn, scope, review_id)?;
    set_pending_status(conn, scope.tenant(), &review.id, ReviewStatus::Dismissed, now)?;
    tracing::info!(tenant_id = %scope.tenant(), review_id = %review.id, "Review dismissed");
    Ok(())
}
