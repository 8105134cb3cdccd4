use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{HazardLevel, SubstitutionPriority};
use crate::tenancy::TenantId;

/// A tenant's chemical product and its SDS pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChemicalRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub product_name: String,
    pub supplier: Option<String>,
    pub catalog_number: Option<String>,
    /// Optional, but required for registry sync.
    pub cas_number: Option<String>,
    pub ec_number: Option<String>,
    pub signal_word: Option<String>,
    pub hazard_statements: Vec<String>,
    pub is_cmr: bool,
    pub is_svhc: bool,
    pub reach_status: Option<String>,
    pub hazard_level: HazardLevel,
    pub substitution_priority: SubstitutionPriority,
    pub sds_storage_key: Option<String>,
    pub sds_version: Option<String>,
    pub sds_date: Option<NaiveDate>,
    pub next_review_date: Option<NaiveDate>,
    /// Last SDS/supplier sync.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Last hazard-registry sync.
    pub hazard_synced_at: Option<DateTime<Utc>>,
}

impl ChemicalRecord {
    /// A bare record with default hazard fields.
    pub fn new(tenant_id: TenantId, product_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            product_name: product_name.to_string(),
            supplier: None,
            catalog_number: None,
            cas_number: None,
            ec_number: None,
            signal_word: None,
            hazard_statements: Vec::new(),
            is_cmr: false,
            is_svhc: false,
            reach_status: None,
            hazard_level: HazardLevel::Low,
            substitution_priority: SubstitutionPriority::Low,
            sds_storage_key: None,
            sds_version: None,
            sds_date: None,
            next_review_date: None,
            last_synced_at: None,
            hazard_synced_at: None,
        }
    }

    /// Current value of one field, for change snapshots.
    pub fn value_of(&self, field: RecordField) -> FieldValue {
        match field {
            RecordField::ProductName => FieldValue::Text(self.product_name.clone()),
            RecordField::Supplier => FieldValue::opt_text(&self.supplier),
            RecordField::CatalogNumber => FieldValue::opt_text(&self.catalog_number),
            RecordField::CasNumber => FieldValue::opt_text(&self.cas_number),
            RecordField::EcNumber => FieldValue::opt_text(&self.ec_number),
            RecordField::SignalWord => FieldValue::opt_text(&self.signal_word),
            RecordField::HazardStatements => FieldValue::List(self.hazard_statements.clone()),
            RecordField::IsCmr => FieldValue::Flag(self.is_cmr),
            RecordField::IsSvhc => FieldValue::Flag(self.is_svhc),
            RecordField::ReachStatus => FieldValue::opt_text(&self.reach_status),
            RecordField::HazardLevel => FieldValue::Text(self.hazard_level.as_str().to_string()),
            RecordField::SubstitutionPriority => {
                FieldValue::Text(self.substitution_priority.as_str().to_string())
            }
            RecordField::SdsStorageKey => FieldValue::opt_text(&self.sds_storage_key),
            RecordField::SdsVersion => FieldValue::opt_text(&self.sds_version),
            RecordField::SdsDate => self.sds_date.map_or(FieldValue::Null, FieldValue::Date),
            RecordField::NextReviewDate => {
                self.next_review_date.map_or(FieldValue::Null, FieldValue::Date)
            }
            RecordField::LastSyncedAt => {
                self.last_synced_at.map_or(FieldValue::Null, FieldValue::Timestamp)
            }
            RecordField::HazardSyncedAt => {
                self.hazard_synced_at.map_or(FieldValue::Null, FieldValue::Timestamp)
            }
        }
    }

    /// Apply already-planned changes to the in-memory copy.
    pub fn apply_changes(&mut self, changes: &[FieldChange]) {
        for change in changes {
            self.set(change.field, &change.after);
        }
    }

    fn set(&mut self, field: RecordField, value: &FieldValue) {
        match field {
            RecordField::ProductName => {
                if let Some(text) = value.as_text() {
                    self.product_name = text.to_string();
                }
            }
            RecordField::Supplier => self.supplier = value.as_text().map(String::from),
            RecordField::CatalogNumber => self.catalog_number = value.as_text().map(String::from),
            RecordField::CasNumber => self.cas_number = value.as_text().map(String::from),
            RecordField::EcNumber => self.ec_number = value.as_text().map(String::from),
            RecordField::SignalWord => self.signal_word = value.as_text().map(String::from),
            RecordField::HazardStatements => {
                if let FieldValue::List(items) = value {
                    self.hazard_statements = items.clone();
                }
            }
            RecordField::IsCmr => {
                if let FieldValue::Flag(flag) = value {
                    self.is_cmr = *flag;
                }
            }
            RecordField::IsSvhc => {
                if let FieldValue::Flag(flag) = value {
                    self.is_svhc = *flag;
                }
            }
            RecordField::ReachStatus => self.reach_status = value.as_text().map(String::from),
            RecordField::HazardLevel => {
                if let Some(level) = value.as_text().and_then(|s| s.parse().ok()) {
                    self.hazard_level = level;
                }
            }
            RecordField::SubstitutionPriority => {
                if let Some(priority) = value.as_text().and_then(|s| s.parse().ok()) {
                    self.substitution_priority = priority;
                }
            }
            RecordField::SdsStorageKey => self.sds_storage_key = value.as_text().map(String::from),
            RecordField::SdsVersion => self.sds_version = value.as_text().map(String::from),
            RecordField::SdsDate => self.sds_date = value.as_date(),
            RecordField::NextReviewDate => self.next_review_date = value.as_date(),
            RecordField::LastSyncedAt => self.last_synced_at = value.as_timestamp(),
            RecordField::HazardSyncedAt => self.hazard_synced_at = value.as_timestamp(),
        }
    }
}

/// Columns the pipeline is allowed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    ProductName,
    Supplier,
    CatalogNumber,
    CasNumber,
    EcNumber,
    SignalWord,
    HazardStatements,
    IsCmr,
    IsSvhc,
    ReachStatus,
    HazardLevel,
    SubstitutionPriority,
    SdsStorageKey,
    SdsVersion,
    SdsDate,
    NextReviewDate,
    LastSyncedAt,
    HazardSyncedAt,
}

impl RecordField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::ProductName => "product_name",
            Self::Supplier => "supplier",
            Self::CatalogNumber => "catalog_number",
            Self::CasNumber => "cas_number",
            Self::EcNumber => "ec_number",
            Self::SignalWord => "signal_word",
            Self::HazardStatements => "hazard_statements",
            Self::IsCmr => "is_cmr",
            Self::IsSvhc => "is_svhc",
            Self::ReachStatus => "reach_status",
            Self::HazardLevel => "hazard_level",
            Self::SubstitutionPriority => "substitution_priority",
            Self::SdsStorageKey => "sds_storage_key",
            Self::SdsVersion => "sds_version",
            Self::SdsDate => "sds_date",
            Self::NextReviewDate => "next_review_date",
            Self::LastSyncedAt => "last_synced_at",
            Self::HazardSyncedAt => "hazard_synced_at",
        }
    }

    /// Fields that make up the hazard classification.
    pub fn is_classification(&self) -> bool {
        matches!(
            self,
            Self::HazardStatements
                | Self::IsCmr
                | Self::IsSvhc
                | Self::HazardLevel
                | Self::SubstitutionPriority
        )
    }
}

/// A typed column value, serialized into audit snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Flag(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    List(Vec<String>),
    Text(String),
}

impl FieldValue {
    pub fn opt_text(value: &Option<String>) -> Self {
        value.as_ref().map_or(Self::Null, |s| Self::Text(s.clone()))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

/// One column's before/after values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: RecordField,
    pub before: FieldValue,
    pub after: FieldValue,
}

impl FieldChange {
    /// Change `field` on `record` to `after`; `None` when the value is unchanged.
    pub fn diff(record: &ChemicalRecord, field: RecordField, after: FieldValue) -> Option<Self> {
        let before = record.value_of(field);
        if before == after {
            None
        } else {
            Some(Self { field, before, after })
        }
    }
}

/// Normalize and validate a CAS registry number (`NNNNNNN-NN-N`).
///
/// Returns `None` when the shape or check digit is wrong.
pub fn normalize_cas(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let parts: Vec<&str> = compact.split('-').collect();
    if parts.len() != 3 {
        return None;
    }
    let (head, mid, check) = (parts[0], parts[1], parts[2]);
    if !(2..=7).contains(&head.len()) || mid.len() != 2 || check.len() != 1 {
        return None;
    }
    if !compact.chars().all(|c| c.is_ascii_digit() || c == '-') {
        return None;
    }

    // Check digit: weighted sum of the other digits, weights from the right.
    let digits: Vec<u32> = head
        .chars()
        .chain(mid.chars())
        .filter_map(|c| c.to_digit(10))
        .collect();
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| (i as u32 + 1) * d)
        .sum();
    let expected = check.chars().next()?.to_digit(10)?;
    if sum % 10 != expected {
        return None;
    }

    let head = head.trim_start_matches('0');
    if head.is_empty() {
        return None;
    }
    Some(format!("{head}-{mid}-{check}"))
}

/// Lookup key for supplier names: lowercase alphanumerics only.
pub fn normalize_supplier(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cas_check_digit_validated() {
        assert_eq!(normalize_cas("107-13-1").as_deref(), Some("107-13-1"));
        assert_eq!(normalize_cas(" 7732-18-5 ").as_deref(), Some("7732-18-5"));
        assert_eq!(normalize_cas("107-13-2"), None);
        assert_eq!(normalize_cas("10713-1"), None);
        assert_eq!(normalize_cas("abc-de-f"), None);
    }

    #[test]
    fn cas_leading_zeros_stripped() {
        assert_eq!(normalize_cas("0000107-13-1").as_deref(), Some("107-13-1"));
    }

    #[test]
    fn supplier_normalization_ignores_punctuation_and_case() {
        assert_eq!(normalize_supplier("Sigma-Aldrich"), "sigmaaldrich");
        assert_eq!(normalize_supplier("sigma aldrich "), "sigmaaldrich");
    }

    #[test]
    fn diff_skips_unchanged_values() {
        let tenant = TenantId::parse("acme").unwrap();
        let mut record = ChemicalRecord::new(tenant, "Acetone");
        record.sds_version = Some("3".into());

        assert!(FieldChange::diff(&record, RecordField::SdsVersion, FieldValue::Text("3".into())).is_none());

        let change = FieldChange::diff(&record, RecordField::SdsVersion, FieldValue::Text("4".into()))
            .expect("version changed");
        assert_eq!(change.before, FieldValue::Text("3".into()));
    }

    #[test]
    fn apply_changes_updates_in_memory_copy() {
        let tenant = TenantId::parse("acme").unwrap();
        let mut record = ChemicalRecord::new(tenant, "Acetone");
        let date = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let changes = vec![
            FieldChange::diff(&record, RecordField::SdsDate, FieldValue::Date(date)).unwrap(),
            FieldChange::diff(&record, RecordField::IsCmr, FieldValue::Flag(true)).unwrap(),
        ];
        record.apply_changes(&changes);
        assert_eq!(record.sds_date, Some(date));
        assert!(record.is_cmr);
    }
}
