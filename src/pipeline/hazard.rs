//! Hazard classification from H-statement codes, and registry sync planning.
//!
//! Codes are bucketed on their base form (`H350i` and `H360FD` count as
//! `H350` and `H360`). Substitution priority is derived from the result and
//! is never LOW for a CMR substance.

use chrono::{DateTime, Utc};

use crate::clients::RegistryEntry;
use crate::models::enums::{HazardLevel, SubstitutionPriority};
use crate::models::{ChemicalRecord, FieldChange, FieldValue, RecordField};

/// Carcinogenic, mutagenic and reprotoxic statements (categories 1 and 2).
const CMR_CODES: &[&str] = &["H340", "H341", "H350", "H351", "H360", "H361"];

const HIGH_CODES: &[&str] = &[
    "H300", "H310", "H330", "H340", "H350", "H360", "H370", "H372",
];

const MODERATE_CODES: &[&str] = &[
    "H301", "H311", "H331", "H341", "H351", "H361", "H371", "H373", "H314", "H317", "H318",
    "H334",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_cmr: bool,
    pub hazard_level: HazardLevel,
    pub substitution_priority: SubstitutionPriority,
}

/// `H350i` → `H350`. Anything not shaped like an H-code yields `None`.
fn base_code(code: &str) -> Option<String> {
    let code = code.trim().to_uppercase();
    let head = code.strip_prefix('H')?.get(..3)?;
    if !head.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("H{head}"))
}

fn any_in(codes: &[String], table: &[&str]) -> bool {
    codes
        .iter()
        .filter_map(|c| base_code(c))
        .any(|base| table.contains(&base.as_str()))
}

pub fn is_cmr(codes: &[String]) -> bool {
    any_in(codes, CMR_CODES)
}

pub fn hazard_level(codes: &[String]) -> HazardLevel {
    if any_in(codes, HIGH_CODES) {
        HazardLevel::High
    } else if any_in(codes, MODERATE_CODES) {
        HazardLevel::Moderate
    } else {
        HazardLevel::Low
    }
}

pub fn substitution_priority(
    is_cmr: bool,
    is_svhc: bool,
    level: HazardLevel,
) -> SubstitutionPriority {
    match (is_cmr, is_svhc, level) {
        (true, _, HazardLevel::High) => SubstitutionPriority::High,
        (true, _, _) | (_, true, _) => SubstitutionPriority::Medium,
        (false, false, HazardLevel::High) => SubstitutionPriority::Medium,
        (false, false, _) => SubstitutionPriority::Low,
    }
}

pub fn classify(codes: &[String], is_svhc: bool) -> Classification {
    let is_cmr = is_cmr(codes);
    let hazard_level = hazard_level(codes);
    Classification {
        is_cmr,
        hazard_level,
        substitution_priority: substitution_priority(is_cmr, is_svhc, hazard_level),
    }
}

/// Field changes that bring a record's classification in line with `codes`.
pub fn classification_changes(
    record: &ChemicalRecord,
    codes: &[String],
    is_svhc: bool,
) -> Vec<FieldChange> {
    let c = classify(codes, is_svhc);
    [
        FieldChange::diff(record, RecordField::IsCmr, FieldValue::Flag(c.is_cmr)),
        FieldChange::diff(
            record,
            RecordField::HazardLevel,
            FieldValue::Text(c.hazard_level.as_str().to_string()),
        ),
        FieldChange::diff(
            record,
            RecordField::SubstitutionPriority,
            FieldValue::Text(c.substitution_priority.as_str().to_string()),
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Plan the update of one record from a registry entry.
///
/// Registry codes replace stored codes when present; otherwise the stored
/// codes are re-classified against the registry's SVHC flag.
/// `hazard_synced_at` is always advanced.
pub fn plan_hazard_sync(
    record: &ChemicalRecord,
    entry: &RegistryEntry,
    now: DateTime<Utc>,
) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if let Some(ec) = entry.ec_number.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        changes.extend(FieldChange::diff(
            record,
            RecordField::EcNumber,
            FieldValue::Text(ec.to_string()),
        ));
    }
    if let Some(reach) = entry.reach_status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        changes.extend(FieldChange::diff(
            record,
            RecordField::ReachStatus,
            FieldValue::Text(reach.to_string()),
        ));
    }
    changes.extend(FieldChange::diff(
        record,
        RecordField::IsSvhc,
        FieldValue::Flag(entry.is_svhc),
    ));

    let mut registry_codes: Vec<String> = entry
        .hazard_codes
        .iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect();
    registry_codes.sort();
    registry_codes.dedup();

    let codes = if registry_codes.is_empty() {
        record.hazard_statements.clone()
    } else {
        changes.extend(FieldChange::diff(
            record,
            RecordField::HazardStatements,
            FieldValue::List(registry_codes.clone()),
        ));
        registry_codes
    };
    changes.extend(classification_changes(record, &codes, entry.is_svhc));

    changes.extend(FieldChange::diff(
        record,
        RecordField::HazardSyncedAt,
        FieldValue::Timestamp(now),
    ));
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::TenantId;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn carcinogen_codes_flag_cmr() {
        assert!(is_cmr(&codes(&["H225", "H350"])));
        assert!(is_cmr(&codes(&["h350i"])));
        assert!(is_cmr(&codes(&["H360FD"])));
        assert!(!is_cmr(&codes(&["H225", "H319"])));
    }

    #[test]
    fn levels_bucket_by_worst_code() {
        assert_eq!(hazard_level(&codes(&["H225"])), HazardLevel::Low);
        assert_eq!(hazard_level(&codes(&["H225", "H317"])), HazardLevel::Moderate);
        assert_eq!(hazard_level(&codes(&["H317", "H330"])), HazardLevel::High);
        assert_eq!(hazard_level(&[]), HazardLevel::Low);
    }

    #[test]
    fn priority_rules() {
        use HazardLevel::*;
        use SubstitutionPriority as P;
        assert_eq!(substitution_priority(true, false, High), P::High);
        assert_eq!(substitution_priority(true, false, Moderate), P::Medium);
        assert_eq!(substitution_priority(false, true, Low), P::Medium);
        assert_eq!(substitution_priority(false, false, High), P::Medium);
        assert_eq!(substitution_priority(false, false, Moderate), P::Low);
    }

    #[test]
    fn acrylonitrile_registry_entry_marks_cmr() {
        let tenant = TenantId::parse("acme").unwrap();
        let mut record = ChemicalRecord::new(tenant, "Acrylonitrile");
        record.cas_number = Some("107-13-1".into());
        let entry = RegistryEntry {
            ec_number: Some("203-466-5".into()),
            is_svhc: false,
            reach_status: Some("registered".into()),
            hazard_codes: codes(&["H225", "H301", "H350", "H317"]),
        };
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 2, 0, 0).unwrap();

        let changes = plan_hazard_sync(&record, &entry, now);
        record.apply_changes(&changes);

        assert!(record.is_cmr);
        assert_eq!(record.hazard_level, HazardLevel::High);
        assert!(record.substitution_priority >= SubstitutionPriority::Medium);
        assert_eq!(record.ec_number.as_deref(), Some("203-466-5"));
        assert_eq!(record.hazard_synced_at, Some(now));
    }

    #[test]
    fn empty_registry_codes_keep_stored_statements() {
        let tenant = TenantId::parse("acme").unwrap();
        let mut record = ChemicalRecord::new(tenant, "Solvent");
        record.hazard_statements = codes(&["H225"]);
        let entry = RegistryEntry {
            is_svhc: true,
            ..Default::default()
        };
        let changes = plan_hazard_sync(&record, &entry, Utc::now());
        assert!(!changes.iter().any(|c| c.field == RecordField::HazardStatements));
        record.apply_changes(&changes);
        assert!(record.is_svhc);
        assert_eq!(record.substitution_priority, SubstitutionPriority::Medium);
    }

    #[test]
    fn unchanged_entry_only_touches_sync_clock() {
        let tenant = TenantId::parse("acme").unwrap();
        let mut record = ChemicalRecord::new(tenant, "Water");
        record.reach_status = Some("exempt".into());
        let entry = RegistryEntry {
            reach_status: Some("exempt".into()),
            ..Default::default()
        };
        let changes = plan_hazard_sync(&record, &entry, Utc::now());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, RecordField::HazardSyncedAt);
    }

    fn any_code() -> impl Strategy<Value = String> {
        (200u32..400, prop_oneof![Just(""), Just("i"), Just("FD"), Just("f")])
            .prop_map(|(n, suffix)| format!("H{n}{suffix}"))
    }

    proptest! {
        #[test]
        fn cmr_is_never_low_priority(list in proptest::collection::vec(any_code(), 0..8), svhc in any::<bool>()) {
            let c = classify(&list, svhc);
            if c.is_cmr || svhc {
                prop_assert!(c.substitution_priority >= SubstitutionPriority::Medium);
            }
            if c.is_cmr && c.hazard_level == HazardLevel::High {
                prop_assert_eq!(c.substitution_priority, SubstitutionPriority::High);
            }
        }
    }
}
