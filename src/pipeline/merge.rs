//! Field-level merge of an extraction onto a record.
//!
//! Only non-empty extracted values are written; nothing is ever nulled.

use chrono::{DateTime, Months, NaiveDate, Utc};

use super::hazard::classification_changes;
use crate::models::{ChemicalRecord, ExtractedFields, FieldChange, FieldValue, RecordField};

#[derive(Debug, Clone)]
pub struct MergeContext {
    pub now: DateTime<Utc>,
    pub review_interval_months: u32,
    /// Where the source document was stored.
    pub storage_key: Option<String>,
    /// Revision metadata reported by the supplier, used when the document
    /// itself carries none.
    pub fallback_version: Option<String>,
    pub fallback_sds_date: Option<NaiveDate>,
}

fn push(changes: &mut Vec<FieldChange>, record: &ChemicalRecord, field: RecordField, after: FieldValue) {
    if let Some(change) = FieldChange::diff(record, field, after) {
        changes.push(change);
    }
}

fn push_text(changes: &mut Vec<FieldChange>, record: &ChemicalRecord, field: RecordField, value: Option<&String>) {
    if let Some(v) = value {
        push(changes, record, field, FieldValue::Text(v.clone()));
    }
}

/// Revision date the candidate carries: the document's own, else the
/// supplier's. Only a record with no date at all falls back to `now`.
fn candidate_sds_date(record: &ChemicalRecord, fields: &ExtractedFields, ctx: &MergeContext) -> Option<NaiveDate> {
    fields
        .sds_date
        .or(ctx.fallback_sds_date)
        .or_else(|| record.sds_date.is_none().then(|| ctx.now.date_naive()))
}

/// Changes that apply `fields` to `record`.
///
/// Besides the extracted values this advances `last_synced_at` and
/// re-classifies when hazard statements change. The SDS revision (version,
/// date, storage key, `next_review_date`) moves only forward: it is taken
/// when the candidate's date is strictly newer than the stored one, or when
/// the record has no date yet.
pub fn plan_merge(record: &ChemicalRecord, fields: &ExtractedFields, ctx: &MergeContext) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    push_text(&mut changes, record, RecordField::ProductName, fields.product_name.as_ref());
    push_text(&mut changes, record, RecordField::Supplier, fields.supplier.as_ref());
    push_text(&mut changes, record, RecordField::CatalogNumber, fields.catalog_number.as_ref());
    push_text(&mut changes, record, RecordField::CasNumber, fields.cas_number.as_ref());
    push_text(&mut changes, record, RecordField::EcNumber, fields.ec_number.as_ref());
    push_text(&mut changes, record, RecordField::SignalWord, fields.signal_word.as_ref());

    let newer = candidate_sds_date(record, fields, ctx)
        .filter(|date| record.sds_date.map_or(true, |stored| *date > stored));
    if let Some(sds_date) = newer {
        push_text(
            &mut changes,
            record,
            RecordField::SdsVersion,
            fields.sds_version.as_ref().or(ctx.fallback_version.as_ref()),
        );
        push_text(&mut changes, record, RecordField::SdsStorageKey, ctx.storage_key.as_ref());
        push(&mut changes, record, RecordField::SdsDate, FieldValue::Date(sds_date));
        if let Some(next_review) = sds_date.checked_add_months(Months::new(ctx.review_interval_months)) {
            push(&mut changes, record, RecordField::NextReviewDate, FieldValue::Date(next_review));
        }
    }

    if !fields.hazard_statements.is_empty() {
        let statements_changed = FieldChange::diff(
            record,
            RecordField::HazardStatements,
            FieldValue::List(fields.hazard_statements.clone()),
        );
        if let Some(change) = statements_changed {
            changes.push(change);
            changes.extend(classification_changes(
                record,
                &fields.hazard_statements,
                record.is_svhc,
            ));
        }
    }

    push(&mut changes, record, RecordField::LastSyncedAt, FieldValue::Timestamp(ctx.now));
    changes
}

/// Whether any change touches the hazard classification.
pub fn touches_classification(changes: &[FieldChange]) -> bool {
    changes.iter().any(|c| c.field.is_classification())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::SubstitutionPriority;
    use crate::tenancy::TenantId;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn ctx() -> MergeContext {
        MergeContext {
            now: Utc.with_ymd_and_hms(2026, 10, 19, 2, 0, 0).unwrap(),
            review_interval_months: 36,
            storage_key: Some("sds/acme/r-20261019T020000Z-5c1e0b7a9d24".into()),
            fallback_version: None,
            fallback_sds_date: None,
        }
    }

    fn record() -> ChemicalRecord {
        let mut r = ChemicalRecord::new(TenantId::parse("acme").unwrap(), "Acrylonitrile");
        r.supplier = Some("Sigma-Aldrich".into());
        r.cas_number = Some("107-13-1".into());
        r.signal_word = Some("Danger".into());
        r.sds_date = NaiveDate::from_ymd_opt(2022, 5, 1);
        r
    }

    #[test]
    fn review_date_is_three_years_after_sds_date() {
        let mut r = record();
        let fields = ExtractedFields {
            sds_date: NaiveDate::from_ymd_opt(2026, 9, 1),
            ..Default::default()
        };
        r.apply_changes(&plan_merge(&r.clone(), &fields, &ctx()));
        assert_eq!(r.sds_date, NaiveDate::from_ymd_opt(2026, 9, 1));
        assert_eq!(r.next_review_date, NaiveDate::from_ymd_opt(2029, 9, 1));
    }

    #[test]
    fn leap_day_review_clamps_to_month_end() {
        let mut r = record();
        let fields = ExtractedFields {
            sds_date: NaiveDate::from_ymd_opt(2024, 2, 29),
            ..Default::default()
        };
        r.apply_changes(&plan_merge(&r.clone(), &fields, &ctx()));
        assert_eq!(r.next_review_date, NaiveDate::from_ymd_opt(2027, 2, 28));
    }

    #[test]
    fn supplier_revision_used_when_document_has_no_date() {
        let mut c = ctx();
        c.fallback_sds_date = NaiveDate::from_ymd_opt(2026, 3, 1);
        c.fallback_version = Some("6.2".into());
        let mut r = record();
        r.apply_changes(&plan_merge(&r.clone(), &ExtractedFields::default(), &c));
        assert_eq!(r.sds_date, NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(r.sds_version.as_deref(), Some("6.2"));
    }

    #[test]
    fn absent_fields_never_null_existing_values() {
        let r = record();
        let changes = plan_merge(&r, &ExtractedFields::default(), &ctx());
        assert!(changes.iter().all(|c| c.after != FieldValue::Null));
        assert!(!changes.iter().any(|c| c.field == RecordField::SignalWord));
    }

    #[test]
    fn new_statements_reclassify() {
        let mut r = record();
        let fields = ExtractedFields {
            hazard_statements: vec!["H225".into(), "H350".into()],
            ..Default::default()
        };
        let changes = plan_merge(&r.clone(), &fields, &ctx());
        assert!(touches_classification(&changes));
        r.apply_changes(&changes);
        assert!(r.is_cmr);
        assert_eq!(r.substitution_priority, SubstitutionPriority::High);
    }

    #[test]
    fn older_document_never_rolls_back_revision() {
        let mut r = record();
        r.sds_date = NaiveDate::from_ymd_opt(2026, 5, 1);
        r.sds_version = Some("9.0".into());
        r.next_review_date = NaiveDate::from_ymd_opt(2029, 5, 1);
        r.sds_storage_key = Some("sds/acme/r-20260501T000000Z-e4b09d31a6f2".into());
        let fields = ExtractedFields {
            sds_version: Some("3.0".into()),
            sds_date: NaiveDate::from_ymd_opt(2019, 1, 1),
            signal_word: Some("Warning".into()),
            ..Default::default()
        };
        let before = r.clone();
        r.apply_changes(&plan_merge(&before, &fields, &ctx()));

        assert_eq!(r.sds_date, before.sds_date);
        assert_eq!(r.sds_version, before.sds_version);
        assert_eq!(r.next_review_date, before.next_review_date);
        assert_eq!(r.sds_storage_key, before.sds_storage_key);
        assert_eq!(r.signal_word.as_deref(), Some("Warning"));
        assert_eq!(r.last_synced_at, Some(ctx().now));
    }

    #[test]
    fn same_date_keeps_stored_revision() {
        let mut r = record();
        r.sds_version = Some("5.0".into());
        let fields = ExtractedFields {
            sds_version: Some("5.1".into()),
            sds_date: r.sds_date,
            ..Default::default()
        };
        let changes = plan_merge(&r, &fields, &ctx());
        assert!(!changes.iter().any(|c| c.field == RecordField::SdsVersion));
    }

    #[test]
    fn undated_document_keeps_stored_date() {
        let mut r = record();
        r.sds_date = NaiveDate::from_ymd_opt(2021, 3, 1);
        r.next_review_date = NaiveDate::from_ymd_opt(2024, 3, 1);
        let before = r.clone();
        r.apply_changes(&plan_merge(&before, &ExtractedFields::default(), &ctx()));
        assert_eq!(r.sds_date, NaiveDate::from_ymd_opt(2021, 3, 1));
        // still overdue
        assert_eq!(r.next_review_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test]
    fn undated_document_on_undated_record_uses_today() {
        let mut r = record();
        r.sds_date = None;
        r.apply_changes(&plan_merge(&r.clone(), &ExtractedFields::default(), &ctx()));
        assert_eq!(r.sds_date, NaiveDate::from_ymd_opt(2026, 10, 19));
        assert_eq!(r.next_review_date, NaiveDate::from_ymd_opt(2029, 10, 19));
    }

    fn opt_date() -> impl Strategy<Value = Option<NaiveDate>> {
        prop_oneof![
            Just(None),
            (2015i32..2030, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        ]
    }

    fn opt_text() -> impl Strategy<Value = Option<String>> {
        prop_oneof![Just(None), "[A-Za-z0-9]{1,12}".prop_map(Some)]
    }

    proptest! {
        #[test]
        fn merged_record_carries_every_extracted_value(
            name in opt_text(),
            supplier in opt_text(),
            catalog in opt_text(),
            ec in opt_text(),
            signal in opt_text(),
            version in opt_text(),
            stored_date in opt_date(),
            extracted_date in opt_date(),
        ) {
            let mut original = record();
            original.sds_date = stored_date;
            original.sds_version = Some("1.0".into());
            let fields = ExtractedFields {
                product_name: name.clone(),
                supplier: supplier.clone(),
                catalog_number: catalog.clone(),
                ec_number: ec.clone(),
                signal_word: signal.clone(),
                sds_version: version.clone(),
                sds_date: extracted_date,
                ..Default::default()
            };
            let mut merged = original.clone();
            merged.apply_changes(&plan_merge(&original, &fields, &ctx()));

            prop_assert_eq!(merged.product_name, name.unwrap_or(original.product_name));
            prop_assert_eq!(merged.supplier, supplier.or(original.supplier));
            prop_assert_eq!(merged.catalog_number, catalog.or(original.catalog_number));
            prop_assert_eq!(merged.ec_number, ec.or(original.ec_number));
            prop_assert_eq!(merged.signal_word, signal.or(original.signal_word));
            let advances = match (extracted_date, stored_date) {
                (Some(new), Some(old)) => new > old,
                (_, None) => true,
                (None, Some(_)) => false,
            };
            if advances {
                prop_assert_eq!(merged.sds_version, version.or(original.sds_version.clone()));
                prop_assert!(merged.sds_date.is_some());
            } else {
                prop_assert_eq!(merged.sds_version, original.sds_version.clone());
                prop_assert_eq!(merged.sds_date, original.sds_date);
            }
            // revision date never moves backwards
            if let (Some(old), Some(new)) = (original.sds_date, merged.sds_date) {
                prop_assert!(new >= old);
            }
            prop_assert_eq!(merged.cas_number, original.cas_number);
            prop_assert_eq!(merged.is_cmr, original.is_cmr);
            prop_assert_eq!(merged.hazard_statements, original.hazard_statements);
        }
    }
}
