use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(TenantStatus {
    Active => "active",
    Suspended => "suspended",
});

str_enum!(UserRole {
    Admin => "admin",
    Hms => "hms",
    Member => "member",
});

str_enum!(
    /// Ordered: `Low < Moderate < High`.
    HazardLevel {
        Low => "low",
        Moderate => "moderate",
        High => "high",
    }
);

str_enum!(
    /// Ordered: `Low < Medium < High`.
    SubstitutionPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

str_enum!(CandidateSource {
    Email => "email",
    SupplierApi => "supplier_api",
});

str_enum!(ReviewStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Dismissed => "dismissed",
});

str_enum!(QueueReason {
    MidConfidence => "mid_confidence",
    AmbiguousMatch => "ambiguous_match",
    NoMatchingRecord => "no_matching_record",
});

str_enum!(AuditAction {
    AutoApply => "auto_apply",
    QueueForReview => "queue_for_review",
    ReviewConfirmed => "review_confirmed",
    HazardSync => "hazard_sync",
});

str_enum!(JobKind {
    EmailMonitor => "email_monitor",
    SupplierPoll => "supplier_poll",
    RegistrySync => "registry_sync",
});

str_enum!(RunStatus {
    Running => "running",
    Completed => "completed",
    Partial => "partial",
    Skipped => "skipped",
    Failed => "failed",
    Aborted => "aborted",
});

str_enum!(ReasonCode {
    SdsUpdated => "sds_updated",
    ReviewRequired => "review_required",
    HazardChanged => "hazard_changed",
    SubstitutionReminder => "substitution_reminder",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn round_trips_through_str() {
        assert_eq!(CandidateSource::from_str("supplier_api").unwrap(), CandidateSource::SupplierApi);
        assert_eq!(QueueReason::AmbiguousMatch.as_str(), "ambiguous_match");
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = UserRole::from_str("owner").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(SubstitutionPriority::Low < SubstitutionPriority::Medium);
        assert!(SubstitutionPriority::Medium < SubstitutionPriority::High);
        assert!(HazardLevel::Moderate < HazardLevel::High);
    }

    #[test]
    fn serde_matches_as_str() {
        let json = serde_json::to_string(&CandidateSource::SupplierApi).unwrap();
        assert_eq!(json, "\"supplier_api\"");
        let json = serde_json::to_string(&ReasonCode::SubstitutionReminder).unwrap();
        assert_eq!(json, "\"substitution_reminder\"");
    }
}
