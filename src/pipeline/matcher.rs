//! Candidate → record resolution.
//!
//! Key order: CAS number within the tenant, then normalized supplier +
//! catalog number. Supplier candidates already point at their record; an
//! extracted CAS that contradicts it makes the match ambiguous.

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository::{find_chemicals_by_cas, find_chemicals_by_catalog};
use crate::db::DatabaseError;
use crate::models::{ChemicalRecord, ExtractedFields};
use crate::tenancy::TenantId;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Unique(ChemicalRecord),
    /// Candidate record ids, best guess first.
    Ambiguous(Vec<Uuid>),
    NoMatch,
}

fn cas_conflicts(record: &ChemicalRecord, fields: &ExtractedFields) -> bool {
    matches!(
        (&record.cas_number, &fields.cas_number),
        (Some(stored), Some(extracted)) if stored != extracted
    )
}

fn from_hits(hits: Vec<ChemicalRecord>, fields: &ExtractedFields) -> MatchOutcome {
    match hits.len() {
        0 => MatchOutcome::NoMatch,
        1 => {
            let mut hits = hits;
            let record = hits.remove(0);
            if cas_conflicts(&record, fields) {
                MatchOutcome::Ambiguous(vec![record.id])
            } else {
                MatchOutcome::Unique(record)
            }
        }
        _ => MatchOutcome::Ambiguous(hits.into_iter().map(|r| r.id).collect()),
    }
}

pub fn resolve_target(
    conn: &Connection,
    tenant_id: &TenantId,
    fields: &ExtractedFields,
    origin_record: Option<&ChemicalRecord>,
) -> Result<MatchOutcome, DatabaseError> {
    if let Some(record) = origin_record {
        return Ok(if cas_conflicts(record, fields) {
            MatchOutcome::Ambiguous(vec![record.id])
        } else {
            MatchOutcome::Unique(record.clone())
        });
    }

    if let Some(cas) = fields.cas_number.as_deref() {
        let hits = find_chemicals_by_cas(conn, tenant_id, cas)?;
        if !hits.is_empty() {
            return Ok(from_hits(hits, fields));
        }
    }

    if let (Some(supplier), Some(catalog)) = (fields.supplier.as_deref(), fields.catalog_number.as_deref()) {
        let hits = find_chemicals_by_catalog(conn, tenant_id, supplier, catalog)?;
        return Ok(from_hits(hits, fields));
    }

    Ok(MatchOutcome::NoMatch)
}
