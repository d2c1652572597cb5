use super::domain::ApplicationStatus;

/// Why a requested lifecycle change is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateViolation {
    #[error("cannot move application from {from} to {to}")]
    IllegalTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("offer letters can only be attached to Approved applications (status is {0})")]
    NotApproved(ApplicationStatus),
}

/// Only `Pending -> Approved` and `Pending -> Rejected` exist. Terminal
/// states never move again.
pub fn check_transition(
    from: ApplicationStatus,
    to: ApplicationStatus,
) -> Result<(), StateViolation> {
    match (from, to) {
        (ApplicationStatus::Pending, ApplicationStatus::Approved)
        | (ApplicationStatus::Pending, ApplicationStatus::Rejected) => Ok(()),
        _ => Err(StateViolation::IllegalTransition { from, to }),
    }
}
