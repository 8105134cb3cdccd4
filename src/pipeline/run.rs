//! One tenant's pass through a job, and the candidate decision flow.
//!
//! `TenantRun` carries everything a unit of work may touch: the tenant
//! scope, its resolved credentials, the shared collaborators, pacing and
//! the run's tallies. Every candidate goes through [`process_candidate`]:
//! extract, resolve, decide, then apply or queue or discard.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::decision::{decide, Decision, PriorState};
use super::error::{ErrorClass, SyncError};
use super::matcher::{resolve_target, MatchOutcome};
use super::merge::{plan_merge, touches_classification, MergeContext};
use super::notify::Notice;
use super::pacing::{with_retry, CancelFlag, Deadline, Pacer};
use super::types::{CandidateDocument, CandidateOrigin, CandidateOutcome, DiscardReason};
use crate::clients::{
    DigestMailer, DocumentStore, ExtractionService, HazardRegistry, InternalAlertSink,
    MailboxClient, SupplierRegistry,
};
use crate::config::EngineConfig;
use crate::db::repository::{
    applied_update_exists, get_chemical, insert_audit_entry, insert_pending,
    pending_hash_exists, record_applied_update, update_chemical_fields,
};
use crate::db::DatabaseError;
use crate::models::enums::{AuditAction, QueueReason, ReasonCode, ReviewStatus};
use crate::models::{
    AuditEntry, ChemicalRecord, FieldChange, FieldValue, PendingReview, RecordField, RunCounts,
    StructuredExtraction, TenantContext,
};
use crate::tenancy::{IsolationViolation, StorageKey, TenantScope};

/// External services shared by every tenant of a job.
pub struct Collaborators {
    pub extraction: Arc<dyn ExtractionService>,
    pub registry: Arc<dyn HazardRegistry>,
    pub suppliers: SupplierRegistry,
    pub mailbox: Arc<dyn MailboxClient>,
    pub store: Arc<dyn DocumentStore>,
    pub mailer: Arc<dyn DigestMailer>,
    pub alerts: Arc<dyn InternalAlertSink>,
}

pub struct TenantRun<'a> {
    pub conn: &'a Connection,
    pub services: &'a Collaborators,
    pub config: &'a EngineConfig,
    pub ctx: &'a TenantContext,
    pub scope: TenantScope,
    pub run_id: Uuid,
    /// Run clock, second precision.
    pub now: DateTime<Utc>,
    pub counts: RunCounts,
    pub notices: Vec<Notice>,
    pub pacer: Pacer,
    deadline: Deadline,
    cancel: CancelFlag,
}

impl<'a> TenantRun<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conn: &'a Connection,
        services: &'a Collaborators,
        config: &'a EngineConfig,
        ctx: &'a TenantContext,
        run_id: Uuid,
        now: DateTime<Utc>,
        deadline: Deadline,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            conn,
            services,
            config,
            ctx,
            scope: TenantScope::new(ctx.id().clone()),
            run_id,
            now,
            counts: RunCounts::default(),
            notices: Vec::new(),
            pacer: Pacer::new(config.external_call_delay(), cancel.clone()),
            deadline,
            cancel,
        }
    }

    /// Budget exhausted or cancellation requested.
    pub fn should_stop(&self) -> bool {
        self.deadline.expired() || self.cancel.is_cancelled()
    }

    pub fn tally(&mut self, outcome: &CandidateOutcome) {
        match outcome {
            CandidateOutcome::Applied { .. } => self.counts.applied += 1,
            CandidateOutcome::Queued { .. } => self.counts.queued += 1,
            CandidateOutcome::Discarded(_) => self.counts.discarded += 1,
        }
    }

    /// A storage key minted for this run must carry this run's tenant.
    pub fn ensure_key_owned(&self, key: &StorageKey) -> Result<(), IsolationViolation> {
        let segment = key.tenant_segment().unwrap_or_default();
        if key.tenant() == self.scope.tenant() && segment == self.scope.tenant().as_str() {
            return Ok(());
        }
        Err(IsolationViolation {
            expected: self.scope.tenant().clone(),
            found: segment.to_string(),
            entity: "storage_key",
            entity_id: key.to_string(),
        })
    }

    /// Advance one of the record's sync clocks without touching anything else.
    pub fn touch_clock(&self, record: &ChemicalRecord, field: RecordField) -> Result<(), SyncError> {
        if let Some(change) = FieldChange::diff(record, field, FieldValue::Timestamp(self.now)) {
            update_chemical_fields(self.conn, self.scope.tenant(), &record.id, &[change], self.now)?;
        }
        Ok(())
    }

    /// Process a candidate and fold the result into the run's counts.
    ///
    /// `Ok(None)` means the candidate failed and will be picked up again by
    /// a later run. Isolation violations and cancellation end the run.
    pub fn handle_candidate(
        &mut self,
        candidate: &mut CandidateDocument,
    ) -> Result<Option<CandidateOutcome>, SyncError> {
        match process_candidate(self, candidate) {
            Ok(outcome) => {
                self.tally(&outcome);
                Ok(Some(outcome))
            }
            Err(e) => match e.class() {
                ErrorClass::Integrity | ErrorClass::Cancelled => Err(e),
                _ => {
                    tracing::warn!(
                        tenant_id = %self.scope.tenant(),
                        run_id = %self.run_id,
                        candidate_id = %candidate.id,
                        origin = %candidate.origin_ref(),
                        error = %e,
                        "Candidate failed"
                    );
                    self.counts.failed += 1;
                    Ok(None)
                }
            },
        }
    }

    fn store_document(&mut self, subject: &str, bytes: &[u8]) -> Result<StorageKey, SyncError> {
        let key = self.scope.sds_document_key(subject, self.now, bytes);
        self.ensure_key_owned(&key)?;
        let store = Arc::clone(&self.services.store);
        self.pacer.wait();
        with_retry(&mut self.pacer, || store.put(&key, bytes))?;
        Ok(key)
    }
}

/// Drive one candidate to a terminal outcome.
///
/// Transient failures surface as `Err` so the caller can defer the
/// candidate; an unreadable document is discarded.
pub fn process_candidate(
    tr: &mut TenantRun<'_>,
    candidate: &mut CandidateDocument,
) -> Result<CandidateOutcome, SyncError> {
    tr.scope.ensure_owned(&candidate.tenant_id, "candidate", candidate.id)?;

    let extraction_service = Arc::clone(&tr.services.extraction);
    tr.pacer.wait();
    let extraction = match with_retry(&mut tr.pacer, || extraction_service.extract(&candidate.bytes)) {
        Ok(extraction) => extraction,
        Err(e) => match SyncError::from(e) {
            SyncError::PermanentExtraction(detail) => {
                tracing::info!(
                    tenant_id = %tr.scope.tenant(),
                    candidate_id = %candidate.id,
                    origin = %candidate.origin_ref(),
                    detail = %detail,
                    "Extraction rejected the document"
                );
                let outcome = CandidateOutcome::Discarded(DiscardReason::UnreadableDocument);
                candidate.settle(&outcome);
                return Ok(outcome);
            }
            other => return Err(other),
        },
    };
    candidate.mark_extracted();

    let origin_record = match candidate.target_record {
        Some(id) => {
            let record = get_chemical(tr.conn, tr.scope.tenant(), &id)?;
            if let Some(r) = &record {
                tr.scope.ensure_owned(&r.tenant_id, "chemical", r.id)?;
            }
            record
        }
        None => None,
    };

    let matched = resolve_target(tr.conn, tr.scope.tenant(), &extraction.fields, origin_record.as_ref())?;
    if let MatchOutcome::Unique(record) = &matched {
        tr.scope.ensure_owned(&record.tenant_id, "chemical", record.id)?;
    }

    let hash = extraction.content_hash();
    let since = tr.now - tr.config.supplier_freshness();
    let prior = PriorState {
        already_applied: match &matched {
            MatchOutcome::Unique(record) => {
                applied_update_exists(tr.conn, tr.scope.tenant(), &record.id, &hash, since)?
            }
            _ => false,
        },
        already_queued: pending_hash_exists(tr.conn, tr.scope.tenant(), &hash, since)?,
    };

    let outcome = match decide(&extraction, &tr.config.thresholds(), matched, prior) {
        Decision::Apply(record) => apply_update(tr, candidate, record, &extraction, &hash)?,
        Decision::Queue { reason, record_id } => {
            queue_for_review(tr, candidate, reason, record_id, &extraction, &hash)?
        }
        Decision::Discard(reason) => {
            tracing::info!(
                tenant_id = %tr.scope.tenant(),
                run_id = %tr.run_id,
                candidate_id = %candidate.id,
                origin = %candidate.origin_ref(),
                confidence = extraction.confidence,
                reason = %reason,
                "Candidate discarded"
            );
            CandidateOutcome::Discarded(reason)
        }
    };

    candidate.settle(&outcome);
    Ok(outcome)
}

fn document_subject(record: Option<&ChemicalRecord>, candidate: &CandidateDocument) -> String {
    match record {
        Some(r) => r.catalog_number.clone().unwrap_or_else(|| r.product_name.clone()),
        None => candidate.origin_ref(),
    }
}

fn apply_update(
    tr: &mut TenantRun<'_>,
    candidate: &CandidateDocument,
    record: ChemicalRecord,
    extraction: &StructuredExtraction,
    hash: &str,
) -> Result<CandidateOutcome, SyncError> {
    let key = tr.store_document(&document_subject(Some(&record), candidate), &candidate.bytes)?;

    let (fallback_version, fallback_sds_date) = match &candidate.origin {
        CandidateOrigin::Supplier {
            version,
            revision_date,
            ..
        } => (version.clone(), *revision_date),
        CandidateOrigin::Email { .. } => (None, None),
    };
    let ctx = MergeContext {
        now: tr.now,
        review_interval_months: tr.config.sds_review_interval_months,
        storage_key: Some(key.to_string()),
        fallback_version,
        fallback_sds_date,
    };
    let changes = plan_merge(&record, &extraction.fields, &ctx);

    let tx = tr.conn.unchecked_transaction().map_err(DatabaseError::from)?;
    update_chemical_fields(&tx, tr.scope.tenant(), &record.id, &changes, tr.now)?;
    record_applied_update(&tx, tr.scope.tenant(), &record.id, hash, candidate.source, tr.now)?;
    insert_audit_entry(
        &tx,
        &AuditEntry {
            id: None,
            tenant_id: tr.scope.tenant().clone(),
            record_id: Some(record.id),
            action: AuditAction::AutoApply,
            confidence: Some(extraction.confidence),
            changed_fields: changes.clone(),
            run_id: Some(tr.run_id),
            created_at: tr.now,
        },
    )?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        tenant_id = %tr.scope.tenant(),
        run_id = %tr.run_id,
        record_id = %record.id,
        candidate_id = %candidate.id,
        confidence = extraction.confidence,
        changed = changes.len(),
        "SDS update applied"
    );

    let notice = if touches_classification(&changes) {
        Notice::new(
            ReasonCode::HazardChanged,
            Some(record.id),
            format!("{}: new SDS changed the hazard classification", record.product_name),
            format!("hazard_changed:{}:{hash}", record.id),
        )
    } else {
        Notice::new(
            ReasonCode::SdsUpdated,
            Some(record.id),
            format!("{}: SDS updated", record.product_name),
            format!("sds_updated:{}:{hash}", record.id),
        )
    };
    tr.notices.push(notice);

    Ok(CandidateOutcome::Applied {
        record_id: record.id,
        changed_fields: changes.len(),
    })
}

fn queue_for_review(
    tr: &mut TenantRun<'_>,
    candidate: &CandidateDocument,
    reason: QueueReason,
    record_id: Option<Uuid>,
    extraction: &StructuredExtraction,
    hash: &str,
) -> Result<CandidateOutcome, SyncError> {
    let target = match record_id {
        Some(id) => get_chemical(tr.conn, tr.scope.tenant(), &id)?,
        None => None,
    };
    let key = tr.store_document(&document_subject(target.as_ref(), candidate), &candidate.bytes)?;

    let review = PendingReview {
        id: Uuid::new_v4(),
        tenant_id: tr.scope.tenant().clone(),
        record_id,
        source: candidate.source,
        origin_ref: candidate.origin_ref(),
        fields: extraction.fields.clone(),
        confidence: extraction.confidence,
        extraction_hash: hash.to_string(),
        reason,
        storage_key: Some(key.to_string()),
        status: ReviewStatus::Pending,
        created_at: tr.now,
        reviewed_at: None,
    };

    let tx = tr.conn.unchecked_transaction().map_err(DatabaseError::from)?;
    insert_pending(&tx, &review)?;
    insert_audit_entry(
        &tx,
        &AuditEntry {
            id: None,
            tenant_id: tr.scope.tenant().clone(),
            record_id,
            action: AuditAction::QueueForReview,
            confidence: Some(extraction.confidence),
            changed_fields: Vec::new(),
            run_id: Some(tr.run_id),
            created_at: tr.now,
        },
    )?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        tenant_id = %tr.scope.tenant(),
        run_id = %tr.run_id,
        review_id = %review.id,
        candidate_id = %candidate.id,
        confidence = extraction.confidence,
        reason = %reason,
        "Candidate queued for review"
    );

    let label = extraction
        .fields
        .product_name
        .clone()
        .or_else(|| extraction.fields.cas_number.clone())
        .unwrap_or_else(|| candidate.origin_ref());
    tr.notices.push(Notice::new(
        ReasonCode::ReviewRequired,
        record_id,
        format!("{label}: SDS awaiting review ({reason})"),
        format!("review_required:{hash}"),
    ));

    Ok(CandidateOutcome::Queued {
        review_id: review.id,
        reason,
    })
}
