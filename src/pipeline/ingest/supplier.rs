use std::collections::HashSet;

use crate::db::repository::list_due_for_supplier_poll;
use crate::models::{ChemicalRecord, RecordField};
use crate::pipeline::error::{ErrorClass, SyncError};
use crate::pipeline::pacing::with_retry;
use crate::pipeline::run::TenantRun;
use crate::pipeline::types::{CandidateDocument, CandidateOutcome};

fn log_failure(tr: &TenantRun<'_>, record: &ChemicalRecord, provider: &str, error: &SyncError) {
    tracing::warn!(
        tenant_id = %tr.scope.tenant(),
        run_id = %tr.run_id,
        record_id = %record.id,
        provider = provider,
        error = %error,
        "Supplier call failed"
    );
}

/// Advance the sync clock of a record no provider can check, so it leaves
/// the due list until the freshness window passes again.
fn skip_unpollable(tr: &TenantRun<'_>, record: &ChemicalRecord, why: &'static str) -> Result<(), SyncError> {
    tracing::debug!(
        tenant_id = %tr.scope.tenant(),
        run_id = %tr.run_id,
        record_id = %record.id,
        supplier = record.supplier.as_deref().unwrap_or_default(),
        why,
        "Record skipped by supplier poll"
    );
    tr.touch_clock(record, RecordField::LastSyncedAt)
}

/// Supplier polling for one tenant.
///
/// Checks up to `supplier_batch_cap` stale records against their
/// provider's newest revision and processes each downloaded SDS before the
/// next record is checked. Records without an integration or credentials
/// do not count toward the cap. A provider that fails twice in a row is
/// skipped for the rest of the run.
pub fn poll_suppliers(tr: &mut TenantRun<'_>) -> Result<(), SyncError> {
    let stale_before = tr.now - tr.config.supplier_freshness();
    let due = list_due_for_supplier_poll(tr.conn, tr.scope.tenant(), stale_before)?;
    let cap = tr.config.supplier_batch_cap as usize;
    tracing::info!(
        tenant_id = %tr.scope.tenant(),
        run_id = %tr.run_id,
        due = due.len(),
        cap,
        "Supplier poll started"
    );

    let mut down: HashSet<String> = HashSet::new();
    let mut checked = 0usize;
    let total = due.len();
    for (index, record) in due.into_iter().enumerate() {
        if checked >= cap {
            break;
        }
        if tr.should_stop() {
            tr.counts.deferred += (total - index).min(cap - checked) as u32;
            break;
        }
        tr.scope.ensure_owned(&record.tenant_id, "chemical", record.id)?;

        let (Some(supplier), Some(catalog)) = (record.supplier.clone(), record.catalog_number.clone()) else {
            skip_unpollable(tr, &record, "no supplier or catalog number")?;
            continue;
        };
        let Some(provider) = tr.services.suppliers.resolve(&supplier) else {
            skip_unpollable(tr, &record, "no catalog integration")?;
            continue;
        };
        let provider_id = provider.provider_id().to_string();
        if down.contains(&provider_id) {
            checked += 1;
            tr.counts.deferred += 1;
            continue;
        }
        let ctx = tr.ctx;
        let Some(creds) = ctx.supplier_credentials.get(&provider_id) else {
            skip_unpollable(tr, &record, "no tenant credentials")?;
            continue;
        };

        checked += 1;
        tr.pacer.wait();
        let check = match with_retry(&mut tr.pacer, || {
            provider.check_for_update(creds, &catalog, record.sds_date)
        }) {
            Ok(check) => check,
            Err(e) => {
                let e = SyncError::from(e);
                log_failure(tr, &record, &provider_id, &e);
                tr.counts.failed += 1;
                if e.class() == ErrorClass::Transient {
                    down.insert(provider_id);
                }
                continue;
            }
        };

        if !check.has_update {
            tr.touch_clock(&record, RecordField::LastSyncedAt)?;
            continue;
        }

        tr.pacer.wait();
        let url = check.download_url.as_deref();
        let bytes = match with_retry(&mut tr.pacer, || provider.download_sds(creds, &catalog, url)) {
            Ok(bytes) => bytes,
            Err(e) => {
                let e = SyncError::from(e);
                log_failure(tr, &record, &provider_id, &e);
                tr.counts.failed += 1;
                if e.class() == ErrorClass::Transient {
                    down.insert(provider_id);
                }
                continue;
            }
        };

        let mut candidate = CandidateDocument::from_supplier(
            tr.scope.tenant().clone(),
            record.id,
            &provider_id,
            &catalog,
            check.version,
            check.revision_date,
            bytes,
        );
        tr.counts.found += 1;
        match tr.handle_candidate(&mut candidate)? {
            // merge already advanced last_synced_at
            Some(CandidateOutcome::Applied { .. }) | None => {}
            Some(_) => tr.touch_clock(&record, RecordField::LastSyncedAt)?,
        }
    }
    Ok(())
}
