//! Loan request state machine
//!
//! The lifecycle is a closed set of states with an actor-scoped transition
//! table. Every status change in the system funnels through this table; route
//! handlers never compare status strings themselves.

use serde::{Deserialize, Serialize};

use crate::models::ActorRole;

/// Lifecycle states of a loan request.
///
/// `pending_documents` is deliberately not a state: while the provider waits
/// for paperwork the request stays in `AdminProcessing` and the detail lives
/// in the gateway-status metadata.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoanRequestStatus {
    Pending,
    ClinicApproved,
    ClinicRejected,
    AdminProcessing,
    Approved,
    Rejected,
    Cancelled,
}

impl LoanRequestStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanRequestStatus::ClinicRejected
                | LoanRequestStatus::Approved
                | LoanRequestStatus::Rejected
                | LoanRequestStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanRequestStatus::Pending => "pending",
            LoanRequestStatus::ClinicApproved => "clinic_approved",
            LoanRequestStatus::ClinicRejected => "clinic_rejected",
            LoanRequestStatus::AdminProcessing => "admin_processing",
            LoanRequestStatus::Approved => "approved",
            LoanRequestStatus::Rejected => "rejected",
            LoanRequestStatus::Cancelled => "cancelled",
        }
    }

    /// All states, for exhaustive table checks in tests.
    pub fn all() -> [LoanRequestStatus; 7] {
        [
            LoanRequestStatus::Pending,
            LoanRequestStatus::ClinicApproved,
            LoanRequestStatus::ClinicRejected,
            LoanRequestStatus::AdminProcessing,
            LoanRequestStatus::Approved,
            LoanRequestStatus::Rejected,
            LoanRequestStatus::Cancelled,
        ]
    }
}

impl std::fmt::Display for LoanRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allowed target states for `role` acting on a request currently in `from`.
pub fn allowed_targets(role: ActorRole, from: LoanRequestStatus) -> &'static [LoanRequestStatus] {
    use LoanRequestStatus::*;

    match (role, from) {
        (ActorRole::Clinic, Pending) => &[ClinicApproved, ClinicRejected],
        (ActorRole::Admin, ClinicApproved) => &[AdminProcessing, Cancelled],
        (ActorRole::Admin, AdminProcessing) => &[Approved, Rejected],
        (ActorRole::Admin, Pending) => &[Cancelled],
        (ActorRole::Gateway, AdminProcessing) => &[Approved, Rejected],
        (ActorRole::Patient, Pending) => &[Cancelled],
        (ActorRole::Patient, ClinicApproved) => &[Cancelled],
        _ => &[],
    }
}

/// Whether `role` may move a request from `from` to `to`.
pub fn can_transition(role: ActorRole, from: LoanRequestStatus, to: LoanRequestStatus) -> bool {
    allowed_targets(role, from).contains(&to)
}

/// Human-readable explanation for a denied transition, distinguishing a
/// request that was already decided from one that has not reached the
/// required stage yet.
pub fn denial_reason(current: LoanRequestStatus, requested: LoanRequestStatus) -> String {
    if current.is_terminal() {
        format!(
            "loan request was already decided ({}); {} is no longer possible",
            current, requested
        )
    } else {
        format!(
            "loan request is still {} and cannot move to {} from this stage",
            current, requested
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LoanRequestStatus::*;

    #[test]
    fn test_clinic_decides_pending_requests() {
        assert!(can_transition(ActorRole::Clinic, Pending, ClinicApproved));
        assert!(can_transition(ActorRole::Clinic, Pending, ClinicRejected));

        assert!(!can_transition(ActorRole::Clinic, Pending, Approved));
        assert!(!can_transition(ActorRole::Clinic, ClinicApproved, AdminProcessing));
        assert!(!can_transition(ActorRole::Clinic, AdminProcessing, Approved));
    }

    #[test]
    fn test_admin_forwards_and_decides() {
        assert!(can_transition(ActorRole::Admin, ClinicApproved, AdminProcessing));
        assert!(can_transition(ActorRole::Admin, AdminProcessing, Approved));
        assert!(can_transition(ActorRole::Admin, AdminProcessing, Rejected));

        // Admin cannot skip the clinic or decide before submission.
        assert!(!can_transition(ActorRole::Admin, Pending, AdminProcessing));
        assert!(!can_transition(ActorRole::Admin, Pending, Approved));
        assert!(!can_transition(ActorRole::Admin, ClinicApproved, Approved));
    }

    #[test]
    fn test_gateway_only_decides_submitted_requests() {
        assert!(can_transition(ActorRole::Gateway, AdminProcessing, Approved));
        assert!(can_transition(ActorRole::Gateway, AdminProcessing, Rejected));

        assert!(!can_transition(ActorRole::Gateway, Pending, Approved));
        assert!(!can_transition(ActorRole::Gateway, ClinicApproved, Approved));
        assert!(!can_transition(ActorRole::Gateway, Pending, Cancelled));
        assert!(!can_transition(ActorRole::Gateway, ClinicApproved, Cancelled));
    }

    #[test]
    fn test_cancellation_window() {
        assert!(can_transition(ActorRole::Patient, Pending, Cancelled));
        assert!(can_transition(ActorRole::Patient, ClinicApproved, Cancelled));
        assert!(can_transition(ActorRole::Admin, Pending, Cancelled));
        assert!(can_transition(ActorRole::Admin, ClinicApproved, Cancelled));

        // Once submitted or decided, cancellation is no longer an option.
        assert!(!can_transition(ActorRole::Patient, AdminProcessing, Cancelled));
        assert!(!can_transition(ActorRole::Admin, AdminProcessing, Cancelled));
        assert!(!can_transition(ActorRole::Patient, Approved, Cancelled));
        assert!(!can_transition(ActorRole::Clinic, Pending, Cancelled));
    }

    #[test]
    fn test_terminal_states_admit_nothing() {
        let roles = [
            ActorRole::Patient,
            ActorRole::Clinic,
            ActorRole::Admin,
            ActorRole::Gateway,
        ];

        for from in LoanRequestStatus::all() {
            if !from.is_terminal() {
                continue;
            }
            for role in roles {
                for to in LoanRequestStatus::all() {
                    assert!(
                        !can_transition(role, from, to),
                        "{:?} must not move {} to {}",
                        role,
                        from,
                        to
                    );
                }
            }
        }
    }

    #[test]
    fn test_patient_cannot_approve_own_request() {
        for from in LoanRequestStatus::all() {
            assert!(!can_transition(ActorRole::Patient, from, Approved));
            assert!(!can_transition(ActorRole::Patient, from, ClinicApproved));
        }
    }

    #[test]
    fn test_pending_is_never_a_target() {
        let roles = [
            ActorRole::Patient,
            ActorRole::Clinic,
            ActorRole::Admin,
            ActorRole::Gateway,
        ];

        for from in LoanRequestStatus::all() {
            for role in roles {
                assert!(!can_transition(role, from, Pending));
            }
        }
    }

    #[test]
    fn test_denial_reason_distinguishes_decided_from_premature() {
        let decided = denial_reason(Approved, ClinicRejected);
        assert!(decided.contains("already decided"));

        let premature = denial_reason(Pending, Approved);
        assert!(premature.contains("cannot move"));
        assert!(!premature.contains("already decided"));
    }

    #[test]
    fn test_status_serialization_matches_storage_names() {
        let json = serde_json::to_string(&ClinicApproved).unwrap();
        assert_eq!(json, "\"clinic_approved\"");

        let parsed: LoanRequestStatus = serde_json::from_str("\"admin_processing\"").unwrap();
        assert_eq!(parsed, AdminProcessing);
    }
}
