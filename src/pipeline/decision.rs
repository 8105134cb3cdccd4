//! Confidence-gated decision for one extracted candidate.

use uuid::Uuid;

use super::matcher::MatchOutcome;
use super::types::DiscardReason;
use crate::models::enums::QueueReason;
use crate::models::{ChemicalRecord, StructuredExtraction};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// At or above: auto-apply on an unambiguous match.
    pub auto_apply: f64,
    /// Below: discard.
    pub review: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            auto_apply: 0.8,
            review: 0.3,
        }
    }
}

/// What the ledgers already know about this extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorState {
    /// Same extraction hash applied to the matched record within the window.
    pub already_applied: bool,
    /// Same extraction hash queued within the window.
    pub already_queued: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Apply(ChemicalRecord),
    Queue {
        reason: QueueReason,
        record_id: Option<Uuid>,
    },
    Discard(DiscardReason),
}

/// Evaluated in order: identity, confidence floor, idempotence, then match
/// quality against the auto-apply threshold.
pub fn decide(
    extraction: &StructuredExtraction,
    thresholds: &Thresholds,
    matched: MatchOutcome,
    prior: PriorState,
) -> Decision {
    let c = extraction.confidence;

    if !extraction.fields.has_identity() {
        return Decision::Discard(DiscardReason::MissingIdentity);
    }
    if c < thresholds.review {
        return Decision::Discard(DiscardReason::LowConfidence);
    }
    if prior.already_applied {
        return Decision::Discard(DiscardReason::AlreadyApplied);
    }
    if prior.already_queued {
        return Decision::Discard(DiscardReason::AlreadyQueued);
    }

    match matched {
        MatchOutcome::Unique(record) if c >= thresholds.auto_apply => Decision::Apply(record),
        MatchOutcome::Unique(record) => Decision::Queue {
            reason: QueueReason::MidConfidence,
            record_id: Some(record.id),
        },
        MatchOutcome::Ambiguous(ids) => Decision::Queue {
            reason: QueueReason::AmbiguousMatch,
            record_id: ids.first().copied(),
        },
        MatchOutcome::NoMatch => Decision::Queue {
            reason: QueueReason::NoMatchingRecord,
            record_id: None,
        },
    }
}
