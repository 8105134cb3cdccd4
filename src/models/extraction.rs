//! Output contract of the extraction service.

use base64::Engine;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::chemical::normalize_cas;

/// Structured fields read from an SDS. Every field is optional; absent or
/// blank values never overwrite a stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedFields {
    pub product_name: Option<String>,
    pub supplier: Option<String>,
    pub catalog_number: Option<String>,
    pub cas_number: Option<String>,
    pub ec_number: Option<String>,
    pub signal_word: Option<String>,
    pub sds_version: Option<String>,
    pub sds_date: Option<NaiveDate>,
    pub hazard_statements: Vec<String>,
}

impl ExtractedFields {
    /// Trim strings, drop blanks, validate the CAS number and canonicalize
    /// hazard statement codes.
    pub fn normalized(self) -> Self {
        let mut hazard_statements: Vec<String> = self
            .hazard_statements
            .iter()
            .map(|code| code.trim().to_uppercase())
            .filter(|code| !code.is_empty())
            .collect();
        hazard_statements.sort();
        hazard_statements.dedup();

        Self {
            product_name: clean(self.product_name),
            supplier: clean(self.supplier),
            catalog_number: clean(self.catalog_number),
            cas_number: clean(self.cas_number).and_then(|cas| normalize_cas(&cas)),
            ec_number: clean(self.ec_number),
            signal_word: clean(self.signal_word),
            sds_version: clean(self.sds_version),
            sds_date: self.sds_date,
            hazard_statements,
        }
    }

    /// At least one field that can identify the product.
    pub fn has_identity(&self) -> bool {
        self.cas_number.is_some() || self.product_name.is_some()
    }

    /// Stable hash of the normalized field set.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Immutable extraction result: fields plus self-reported confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredExtraction {
    pub fields: ExtractedFields,
    pub confidence: f64,
}

impl StructuredExtraction {
    /// Normalizes fields and clamps confidence into `[0, 1]` (NaN becomes 0).
    pub fn new(fields: ExtractedFields, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            fields: fields.normalized(),
            confidence,
        }
    }

    pub fn content_hash(&self) -> String {
        self.fields.content_hash()
    }
}
