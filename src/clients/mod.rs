//! External collaborators of the sync engine.
//!
//! Each service sits behind a `Send + Sync` trait so jobs can be driven by
//! the HTTP implementations in production and by the in-memory fakes in
//! `fake` under test:
//! - ExtractionService: raw SDS bytes to structured fields + confidence
//! - HazardRegistry: canonical hazard data by CAS number
//! - SupplierCatalog: one implementation per supplier, looked up through `SupplierRegistry`
//! - MailboxClient: recent messages with attachments
//! - DocumentStore: tenant-prefixed document storage
//! - DigestMailer / InternalAlertSink: outbound channels

pub mod alert;
pub mod fake;
pub mod http;
pub mod storage;
pub mod supplier;

pub use alert::LogAlertSink;
pub use http::{HttpDigestMailer, HttpExtractionClient, HttpHazardRegistryClient, HttpMailboxClient};
pub use storage::FsDocumentStore;
pub use supplier::{SigmaAldrichCatalog, SupplierRegistry, VwrCatalog};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::enums::JobKind;
use crate::models::{MailboxCredentials, RunDigest, StructuredExtraction, SupplierCredentials};
use crate::tenancy::{StorageKey, TenantId};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{service} unreachable: {detail}")]
    Network { service: &'static str, detail: String },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Could not decode {service} response: {detail}")]
    Decode { service: &'static str, detail: String },

    #[error("{service} rejected the document: {detail}")]
    Rejected { service: &'static str, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("HTTP client setup failed: {0}")]
    Setup(String),
}

impl ClientError {
    /// Network failures, 5xx and 429 may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode { .. }
            | Self::Rejected { .. }
            | Self::Io(_)
            | Self::InvalidKey(_)
            | Self::Setup(_) => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Extraction
// ═══════════════════════════════════════════════════════════

pub trait ExtractionService: Send + Sync {
    /// Read structured SDS fields from raw document bytes.
    /// A malformed document is `ClientError::Rejected`.
    fn extract(&self, document: &[u8]) -> Result<StructuredExtraction, ClientError>;
}

// ═══════════════════════════════════════════════════════════
// Hazard registry
// ═══════════════════════════════════════════════════════════

/// Canonical hazard metadata for one substance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub ec_number: Option<String>,
    pub is_svhc: bool,
    pub reach_status: Option<String>,
    pub hazard_codes: Vec<String>,
}

pub trait HazardRegistry: Send + Sync {
    /// `Ok(None)` when the registry does not know the substance.
    fn lookup(&self, cas_number: &str) -> Result<Option<RegistryEntry>, ClientError>;

    /// Names of safer alternative substances.
    fn alternatives(&self, cas_number: &str) -> Result<Vec<String>, ClientError>;
}

// ═══════════════════════════════════════════════════════════
// Supplier catalogs
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductHit {
    pub catalog_number: String,
    pub product_name: String,
    pub cas_number: Option<String>,
}

/// Current SDS revision published for a catalog item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdsInfo {
    pub catalog_number: String,
    pub version: Option<String>,
    pub revision_date: Option<NaiveDate>,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateCheck {
    pub has_update: bool,
    pub version: Option<String>,
    pub download_url: Option<String>,
    pub revision_date: Option<NaiveDate>,
}

pub trait SupplierCatalog: Send + Sync {
    /// Stable id, also the key of the tenant's supplier credentials.
    fn provider_id(&self) -> &str;

    /// Other supplier names this provider answers for.
    fn aliases(&self) -> &[&'static str] {
        &[]
    }

    fn search_product(
        &self,
        creds: &SupplierCredentials,
        query: &str,
    ) -> Result<Vec<ProductHit>, ClientError>;

    /// `Ok(None)` when the supplier publishes no SDS for the item.
    fn get_sds_info(
        &self,
        creds: &SupplierCredentials,
        catalog_number: &str,
    ) -> Result<Option<SdsInfo>, ClientError>;

    /// Fetch the SDS PDF. A `download_url` already returned by
    /// [`check_for_update`](Self::check_for_update) is used as is; without
    /// one the provider looks the document up itself.
    fn download_sds(
        &self,
        creds: &SupplierCredentials,
        catalog_number: &str,
        download_url: Option<&str>,
    ) -> Result<Vec<u8>, ClientError>;

    /// Whether the supplier holds a revision newer than `known_date`.
    fn check_for_update(
        &self,
        creds: &SupplierCredentials,
        catalog_number: &str,
        known_date: Option<NaiveDate>,
    ) -> Result<UpdateCheck, ClientError> {
        let Some(info) = self.get_sds_info(creds, catalog_number)? else {
            return Ok(UpdateCheck::default());
        };
        let has_update = match (info.revision_date, known_date) {
            (Some(remote), Some(known)) => remote > known,
            (Some(_), None) => true,
            (None, _) => false,
        };
        Ok(UpdateCheck {
            has_update,
            version: info.version,
            download_url: info.download_url,
            revision_date: info.revision_date,
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Mailbox
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub attachments: Vec<MailAttachment>,
}

pub trait MailboxClient: Send + Sync {
    fn list_recent(
        &self,
        creds: &MailboxCredentials,
        since: DateTime<Utc>,
    ) -> Result<Vec<MailMessage>, ClientError>;
}

// ═══════════════════════════════════════════════════════════
// Storage and outbound channels
// ═══════════════════════════════════════════════════════════

pub trait DocumentStore: Send + Sync {
    /// Keys can only be minted by a `TenantScope`, so the tenant segment is
    /// always present.
    fn put(&self, key: &StorageKey, bytes: &[u8]) -> Result<(), ClientError>;
}

pub trait DigestMailer: Send + Sync {
    fn send_digest(&self, recipients: &[String], digest: &RunDigest) -> Result<(), ClientError>;
}

/// High-severity operator alerts (isolation violations).
pub trait InternalAlertSink: Send + Sync {
    fn raise(&self, tenant_id: &TenantId, job: JobKind, message: &str);
}
