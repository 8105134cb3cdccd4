//! Failure taxonomy of the sync pipeline.
//!
//! Every error maps to one `ErrorClass`, and the orchestrator decides
//! retry / defer / discard / abort from the class alone.

use thiserror::Error;

use crate::clients::ClientError;
use crate::db::DatabaseError;
use crate::tenancy::IsolationViolation;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Transient failure from {service}: {detail}")]
    TransientExternal { service: String, detail: String },

    #[error("Unusable document: {0}")]
    PermanentExtraction(String),

    #[error("External service refused the request: {0}")]
    External(String),

    #[error("Missing configuration: {0}")]
    Configuration(String),

    #[error("Tenant isolation violated: {0}")]
    DataIntegrityViolation(#[from] IsolationViolation),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Review item cannot be applied: {0}")]
    ReviewNotApplicable(String),

    #[error("Run cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry once, then defer to the next run.
    Transient,
    /// Drop the candidate or record; no retry.
    Permanent,
    /// Skip the tenant for this adapter, quietly.
    Configuration,
    /// Abort the job and alert.
    Integrity,
    /// Local failure (database, storage); the unit of work fails.
    Internal,
    Cancelled,
}

impl SyncError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::TransientExternal { .. } => ErrorClass::Transient,
            Self::PermanentExtraction(_) | Self::External(_) | Self::ReviewNotApplicable(_) => {
                ErrorClass::Permanent
            }
            Self::Configuration(_) => ErrorClass::Configuration,
            Self::DataIntegrityViolation(_) => ErrorClass::Integrity,
            Self::Database(_) | Self::Storage(_) => ErrorClass::Internal,
            Self::Cancelled => ErrorClass::Cancelled,
        }
    }
}

impl From<ClientError> for SyncError {
    fn from(e: ClientError) -> Self {
        if e.is_transient() {
            let service = match &e {
                ClientError::Network { service, .. } | ClientError::Status { service, .. } => {
                    (*service).to_string()
                }
                _ => "external".to_string(),
            };
            return Self::TransientExternal {
                service,
                detail: e.to_string(),
            };
        }
        match e {
            ClientError::Rejected { detail, .. } => Self::PermanentExtraction(detail),
            ClientError::Io(_) | ClientError::InvalidKey(_) => Self::Storage(e.to_string()),
            other => Self::External(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::{TenantId, TenantScope};

    #[test]
    fn client_errors_map_onto_taxonomy() {
        let net: SyncError = ClientError::Network {
            service: "registry",
            detail: "reset".into(),
        }
        .into();
        assert_eq!(net.class(), ErrorClass::Transient);

        let rejected: SyncError = ClientError::Rejected {
            service: "extraction",
            detail: "not a PDF".into(),
        }
        .into();
        assert_eq!(rejected.class(), ErrorClass::Permanent);

        let forbidden: SyncError = ClientError::Status {
            service: "vwr",
            status: 403,
            body: String::new(),
        }
        .into();
        assert_eq!(forbidden.class(), ErrorClass::Permanent);

        let key: SyncError = ClientError::InvalidKey("../x".into()).into();
        assert_eq!(key.class(), ErrorClass::Internal);
    }

    #[test]
    fn isolation_violation_is_integrity_class() {
        let scope = TenantScope::new(TenantId::parse("acme").unwrap());
        let other = TenantId::parse("globex").unwrap();
        let err: SyncError = scope.ensure_owned(&other, "chemical", "r1").unwrap_err().into();
        assert_eq!(err.class(), ErrorClass::Integrity);
    }
}
