use std::fmt;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::enums::{CandidateSource, QueueReason};
use crate::tenancy::TenantId;

/// Where a candidate document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOrigin {
    Email {
        message_id: String,
        attachment_name: String,
        attachment_hash: String,
    },
    Supplier {
        provider: String,
        catalog_number: String,
        version: Option<String>,
        revision_date: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    New,
    Extracted,
    Applied,
    Queued,
    Discarded,
}

impl CandidateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Applied | Self::Queued | Self::Discarded)
    }
}

/// An unvalidated incoming SDS, alive for one pass through the pipeline.
#[derive(Debug, Clone)]
pub struct CandidateDocument {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub source: CandidateSource,
    pub origin: CandidateOrigin,
    pub bytes: Vec<u8>,
    /// Known up front for supplier candidates; resolved by matching otherwise.
    pub target_record: Option<Uuid>,
    state: CandidateState,
}

impl CandidateDocument {
    pub fn from_email(
        tenant_id: TenantId,
        message_id: &str,
        attachment_name: &str,
        attachment_hash: &str,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            source: CandidateSource::Email,
            origin: CandidateOrigin::Email {
                message_id: message_id.to_string(),
                attachment_name: attachment_name.to_string(),
                attachment_hash: attachment_hash.to_string(),
            },
            bytes,
            target_record: None,
            state: CandidateState::New,
        }
    }

    pub fn from_supplier(
        tenant_id: TenantId,
        record_id: Uuid,
        provider: &str,
        catalog_number: &str,
        version: Option<String>,
        revision_date: Option<NaiveDate>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            source: CandidateSource::SupplierApi,
            origin: CandidateOrigin::Supplier {
                provider: provider.to_string(),
                catalog_number: catalog_number.to_string(),
                version,
                revision_date,
            },
            bytes,
            target_record: Some(record_id),
            state: CandidateState::New,
        }
    }

    pub fn state(&self) -> CandidateState {
        self.state
    }

    pub fn mark_extracted(&mut self) {
        if self.state == CandidateState::New {
            self.state = CandidateState::Extracted;
        }
    }

    /// Move an extracted candidate into its terminal state.
    pub fn settle(&mut self, outcome: &CandidateOutcome) {
        if self.state.is_terminal() {
            return;
        }
        self.state = match outcome {
            CandidateOutcome::Applied { .. } => CandidateState::Applied,
            CandidateOutcome::Queued { .. } => CandidateState::Queued,
            CandidateOutcome::Discarded(_) => CandidateState::Discarded,
        };
    }

    /// Human-readable origin: `message/attachment` or `provider:catalog`.
    pub fn origin_ref(&self) -> String {
        match &self.origin {
            CandidateOrigin::Email {
                message_id,
                attachment_name,
                ..
            } => format!("{message_id}/{attachment_name}"),
            CandidateOrigin::Supplier {
                provider,
                catalog_number,
                ..
            } => format!("{provider}:{catalog_number}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    MissingIdentity,
    LowConfidence,
    AlreadyApplied,
    AlreadyQueued,
    UnreadableDocument,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingIdentity => "missing_identity",
            Self::LowConfidence => "low_confidence",
            Self::AlreadyApplied => "already_applied",
            Self::AlreadyQueued => "already_queued",
            Self::UnreadableDocument => "unreadable_document",
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    Applied { record_id: Uuid, changed_fields: usize },
    Queued { review_id: Uuid, reason: QueueReason },
    Discarded(DiscardReason),
}

impl CandidateOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::Queued { .. } => "queued",
            Self::Discarded(_) => "discarded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> CandidateDocument {
        CandidateDocument::from_email(
            TenantId::parse("acme").unwrap(),
            "msg-42",
            "acetone_sds.pdf",
            "hash",
            b"%PDF".to_vec(),
        )
    }

    #[test]
    fn lifecycle_moves_forward_only() {
        let mut c = candidate();
        assert_eq!(c.state(), CandidateState::New);
        c.mark_extracted();
        assert_eq!(c.state(), CandidateState::Extracted);

        c.settle(&CandidateOutcome::Discarded(DiscardReason::LowConfidence));
        assert_eq!(c.state(), CandidateState::Discarded);

        c.settle(&CandidateOutcome::Applied {
            record_id: Uuid::new_v4(),
            changed_fields: 1,
        });
        assert_eq!(c.state(), CandidateState::Discarded);
        c.mark_extracted();
        assert_eq!(c.state(), CandidateState::Discarded);
    }

    #[test]
    fn origin_refs() {
        assert_eq!(candidate().origin_ref(), "msg-42/acetone_sds.pdf");

        let supplier = CandidateDocument::from_supplier(
            TenantId::parse("acme").unwrap(),
            Uuid::new_v4(),
            "vwr",
            "V-100",
            None,
            None,
            Vec::new(),
        );
        assert_eq!(supplier.origin_ref(), "vwr:V-100");
        assert_eq!(supplier.source, CandidateSource::SupplierApi);
        assert!(supplier.target_record.is_some());
    }
}
