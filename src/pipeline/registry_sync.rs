//! Registry-driven hazard reclassification and substitution reminders.

use std::sync::Arc;

use chrono::Datelike;

use super::error::{ErrorClass, SyncError};
use super::hazard::plan_hazard_sync;
use super::notify::Notice;
use super::pacing::with_retry;
use super::run::TenantRun;
use super::substitution::alternatives_for;
use crate::db::repository::{insert_audit_entry, list_due_for_hazard_sync, list_substitution_flagged, update_chemical_fields};
use crate::db::DatabaseError;
use crate::models::enums::{AuditAction, ReasonCode};
use crate::models::{AuditEntry, ChemicalRecord, RecordField};

/// Registry sync for one tenant, followed by the weekly reminders.
pub fn sync_hazards(tr: &mut TenantRun<'_>) -> Result<(), SyncError> {
    let stale_before = tr.now - tr.config.registry_resync();
    let due = list_due_for_hazard_sync(
        tr.conn,
        tr.scope.tenant(),
        stale_before,
        tr.config.registry_batch_cap,
    )?;
    tr.counts.found = due.len() as u32;

    let registry = Arc::clone(&tr.services.registry);
    let total = due.len();
    for (index, record) in due.into_iter().enumerate() {
        if tr.should_stop() {
            tr.counts.deferred += (total - index) as u32;
            break;
        }
        tr.scope.ensure_owned(&record.tenant_id, "chemical", record.id)?;
        let Some(cas) = record.cas_number.clone() else {
            continue;
        };

        tr.pacer.wait();
        let entry = match with_retry(&mut tr.pacer, || registry.lookup(&cas)) {
            Ok(entry) => entry,
            Err(e) => {
                let e = SyncError::from(e);
                tracing::warn!(
                    tenant_id = %tr.scope.tenant(),
                    run_id = %tr.run_id,
                    record_id = %record.id,
                    error = %e,
                    "Registry lookup failed"
                );
                tr.counts.failed += 1;
                if e.class() == ErrorClass::Transient {
                    tr.counts.deferred += (total - index - 1) as u32;
                    break;
                }
                continue;
            }
        };

        match entry {
            None => {
                tracing::debug!(tenant_id = %tr.scope.tenant(), record_id = %record.id, cas = %cas, "Substance unknown to registry");
                tr.touch_clock(&record, RecordField::HazardSyncedAt)?;
                tr.counts.discarded += 1;
            }
            Some(entry) => {
                if apply_registry_entry(tr, &record, &entry)? {
                    tr.counts.applied += 1;
                } else {
                    tr.counts.discarded += 1;
                }
            }
        }
    }

    if tr.now.weekday() == tr.config.reminder_weekday().map_err(|e| SyncError::Configuration(e.to_string()))? {
        remind_substitutions(tr)?;
    }
    Ok(())
}

/// Write the registry's view of one record. Returns whether anything
/// beyond the sync clock changed.
fn apply_registry_entry(
    tr: &mut TenantRun<'_>,
    record: &ChemicalRecord,
    entry: &crate::clients::RegistryEntry,
) -> Result<bool, SyncError> {
    let changes = plan_hazard_sync(record, entry, tr.now);
    let substantive: Vec<_> = changes
        .iter()
        .filter(|c| c.field != RecordField::HazardSyncedAt)
        .cloned()
        .collect();

    let tx = tr.conn.unchecked_transaction().map_err(DatabaseError::from)?;
    update_chemical_fields(&tx, tr.scope.tenant(), &record.id, &changes, tr.now)?;
    if !substantive.is_empty() {
        insert_audit_entry(
            &tx,
            &AuditEntry {
                id: None,
                tenant_id: tr.scope.tenant().clone(),
                record_id: Some(record.id),
                action: AuditAction::HazardSync,
                confidence: None,
                changed_fields: substantive.clone(),
                run_id: Some(tr.run_id),
                created_at: tr.now,
            },
        )?;
    }
    tx.commit().map_err(DatabaseError::from)?;

    if substantive.iter().any(|c| c.field.is_classification()) {
        let mut updated = record.clone();
        updated.apply_changes(&changes);
        tracing::info!(
            tenant_id = %tr.scope.tenant(),
            run_id = %tr.run_id,
            record_id = %record.id,
            is_cmr = updated.is_cmr,
            is_svhc = updated.is_svhc,
            priority = %updated.substitution_priority,
            "Hazard classification changed"
        );
        tr.notices.push(Notice::new(
            ReasonCode::HazardChanged,
            Some(record.id),
            format!(
                "{}: hazard level {}, substitution priority {}",
                updated.product_name, updated.hazard_level, updated.substitution_priority
            ),
            format!(
                "hazard_changed:{}:registry:{}:{}:{}",
                record.id,
                updated.hazard_level,
                updated.substitution_priority,
                updated.hazard_statements.join(",")
            ),
        ));
    }
    Ok(!substantive.is_empty())
}

/// One reminder per CMR/SVHC record per ISO week.
fn remind_substitutions(tr: &mut TenantRun<'_>) -> Result<(), SyncError> {
    let flagged = list_substitution_flagged(tr.conn, tr.scope.tenant())?;
    let week = tr.now.iso_week();
    let registry = Arc::clone(&tr.services.registry);
    for record in flagged {
        if tr.should_stop() {
            break;
        }
        tr.scope.ensure_owned(&record.tenant_id, "chemical", record.id)?;

        let cooldown = tr.config.substitution_cooldown();
        let alternatives = match alternatives_for(tr.conn, registry.as_ref(), &mut tr.pacer, &record, cooldown, tr.now) {
            Ok(found) => found,
            Err(e) if matches!(e.class(), ErrorClass::Transient | ErrorClass::Permanent) => {
                tracing::warn!(tenant_id = %tr.scope.tenant(), record_id = %record.id, error = %e, "Alternatives lookup failed");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut summary = format!(
            "{}: {} substance, substitution priority {}",
            record.product_name,
            if record.is_cmr { "CMR" } else { "SVHC" },
            record.substitution_priority
        );
        if !alternatives.is_empty() {
            summary.push_str(&format!("; alternatives: {}", alternatives.join(", ")));
        }
        tr.notices.push(Notice::new(
            ReasonCode::SubstitutionReminder,
            Some(record.id),
            summary,
            format!("substitution_reminder:{}:{}-W{:02}", record.id, week.year(), week.week()),
        ));
    }
    Ok(())
}
