//! Tenant identity and isolation guards.
//!
//! Every query, storage key, credential lookup and notification inside one
//! tenant's run goes through a [`TenantScope`]. Storage keys can only be built
//! from a scope, so the tenant segment is present by construction; records and
//! users loaded from the database are re-checked against the scope before any
//! write touches them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Prefix for every SDS document key.
pub const SDS_KEY_NAMESPACE: &str = "sds";

/// Validated tenant identifier.
///
/// Restricted to `[A-Za-z0-9_-]` so it can be used verbatim as a path segment
/// and can never smuggle a `/` into a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TenantIdError {
    #[error("Tenant id is empty")]
    Empty,
    #[error("Tenant id contains invalid character {0:?}")]
    InvalidCharacter(char),
    #[error("Tenant id longer than {max} characters")]
    TooLong { max: usize },
}

impl TenantId {
    const MAX_LEN: usize = 64;

    pub fn parse(raw: &str) -> Result<Self, TenantIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TenantIdError::Empty);
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(TenantIdError::TooLong { max: Self::MAX_LEN });
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(TenantIdError::InvalidCharacter(bad));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = TenantIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

/// An isolation check failed: data owned by one tenant surfaced while
/// processing another.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("tenant isolation violated: {entity} {entity_id} belongs to {found}, scope is {expected}")]
pub struct IsolationViolation {
    pub expected: TenantId,
    pub found: String,
    pub entity: &'static str,
    pub entity_id: String,
}

/// The tenant a unit of work is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    tenant: TenantId,
}

impl TenantScope {
    pub fn new(tenant: TenantId) -> Self {
        Self { tenant }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Verify that an entity loaded for this scope is owned by it.
    pub fn ensure_owned(
        &self,
        owner: &TenantId,
        entity: &'static str,
        entity_id: impl fmt::Display,
    ) -> Result<(), IsolationViolation> {
        if owner == &self.tenant {
            Ok(())
        } else {
            Err(IsolationViolation {
                expected: self.tenant.clone(),
                found: owner.to_string(),
                entity,
                entity_id: entity_id.to_string(),
            })
        }
    }

    /// Build the storage key for an SDS document owned by this tenant.
    /// Distinct `content` yields a distinct key even within the same second.
    pub fn sds_document_key(&self, subject: &str, at: DateTime<Utc>, content: &[u8]) -> StorageKey {
        StorageKey::sds_document(self, subject, at, content)
    }
}

/// Tenant-prefixed object key: `sds/{tenant}/{subject}-{timestamp}-{digest}`,
/// where `digest` is the first 12 hex digits of the document's SHA-256.
///
/// Only constructible from a [`TenantScope`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    tenant: TenantId,
    key: String,
}

impl StorageKey {
    fn sds_document(scope: &TenantScope, subject: &str, at: DateTime<Utc>, content: &[u8]) -> Self {
        let subject = sanitize_segment(subject);
        let digest: String = Sha256::digest(content)[..6]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        let key = format!(
            "{SDS_KEY_NAMESPACE}/{}/{}-{}-{}",
            scope.tenant.as_str(),
            subject,
            at.format("%Y%m%dT%H%M%SZ"),
            digest
        );
        Self {
            tenant: scope.tenant.clone(),
            key,
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The tenant segment as it appears in the rendered key.
    pub fn tenant_segment(&self) -> Option<&str> {
        self.key.split('/').nth(1)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tid(s: &str) -> TenantId {
        TenantId::parse(s).unwrap()
    }

    #[test]
    fn tenant_id_rejects_path_characters() {
        assert_eq!(TenantId::parse(""), Err(TenantIdError::Empty));
        assert_eq!(TenantId::parse("a/b"), Err(TenantIdError::InvalidCharacter('/')));
        assert_eq!(TenantId::parse(".."), Err(TenantIdError::InvalidCharacter('.')));
        assert!(TenantId::parse("acme-01").is_ok());
    }

    #[test]
    fn tenant_id_trims_whitespace() {
        assert_eq!(tid("  acme ").as_str(), "acme");
    }

    #[test]
    fn storage_key_puts_tenant_after_namespace() {
        let scope = TenantScope::new(tid("acme"));
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 2, 30, 0).unwrap();
        let key = scope.sds_document_key("rec-42", at, b"abc");
        // sha256("abc") = ba7816bf8f01...
        assert_eq!(key.as_str(), "sds/acme/rec-42-20260301T023000Z-ba7816bf8f01");
        assert_eq!(key.tenant_segment(), Some("acme"));
        assert_eq!(key.tenant(), scope.tenant());
    }

    #[test]
    fn documents_stored_in_the_same_second_get_distinct_keys() {
        let scope = TenantScope::new(tid("acme"));
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 2, 30, 0).unwrap();
        let first = scope.sds_document_key("110213", at, b"%PDF-1.7 revision 6");
        let second = scope.sds_document_key("110213", at, b"%PDF-1.7 revision 7");
        assert_ne!(first, second);
        assert_eq!(first, scope.sds_document_key("110213", at, b"%PDF-1.7 revision 6"));
    }

    #[test]
    fn storage_key_subject_cannot_escape_tenant() {
        let scope = TenantScope::new(tid("acme"));
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let key = scope.sds_document_key("../other/rec", at, b"x");
        assert!(key.as_str().starts_with("sds/acme/"));
        assert_eq!(key.as_str().matches('/').count(), 2);
    }

    #[test]
    fn ensure_owned_detects_foreign_owner() {
        let scope = TenantScope::new(tid("acme"));
        assert!(scope.ensure_owned(&tid("acme"), "chemical", "r1").is_ok());

        let err = scope.ensure_owned(&tid("globex"), "chemical", "r1").unwrap_err();
        assert_eq!(err.expected, tid("acme"));
        assert_eq!(err.found, "globex");
        assert_eq!(err.entity, "chemical");
    }

    #[test]
    fn tenant_id_deserializes_with_validation() {
        let ok: TenantId = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(ok.as_str(), "acme");
        assert!(serde_json::from_str::<TenantId>("\"a/b\"").is_err());
    }
}
