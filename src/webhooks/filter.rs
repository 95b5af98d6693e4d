//! Event and branch eligibility.

use super::glob::{BranchGlob, matches_everything};
use crate::models::{HookEventType, HookPayload, Registration};

/// Why a registration did or did not receive an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// A task should be created.
    Eligible,
    /// The registration does not subscribe to this event type.
    EventNotSubscribed,
    /// A push without commits for a non-native provider.
    EmptyPush,
    /// The event's branch does not match the branch filter.
    BranchFiltered {
        /// Branch carried by the event.
        branch: String,
    },
    /// The branch filter could not be compiled; the registration is rejected.
    InvalidBranchFilter {
        /// The filter.
        pattern: String,
        /// Compile error.
        cause: String,
    },
}

impl Eligibility {
    /// Returns `true` for [`Eligibility::Eligible`].
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::EventNotSubscribed => "event_not_subscribed",
            Self::EmptyPush => "empty_push",
            Self::BranchFiltered { .. } => "branch_filtered",
            Self::InvalidBranchFilter { .. } => "invalid_branch_filter",
        }
    }
}

/// Decides whether `registration` should receive `event`.
///
/// Checks run in order: event subscription, zero-commit pushes (skipped for
/// everything but native providers), then the branch filter when the payload
/// carries a branch.
#[must_use]
pub fn check_eligibility(
    registration: &Registration,
    event: HookEventType,
    payload: &HookPayload,
) -> Eligibility {
    if !registration.events.has(event) {
        return Eligibility::EventNotSubscribed;
    }

    if payload.commit_count() == Some(0) && !registration.provider.is_native() {
        return Eligibility::EmptyPush;
    }

    let Some(branch) = payload.branch() else {
        return Eligibility::Eligible;
    };
    if matches_everything(&registration.branch_filter) {
        return Eligibility::Eligible;
    }

    match BranchGlob::compile(&registration.branch_filter) {
        Ok(glob) if glob.is_match(branch) => Eligibility::Eligible,
        Ok(_) => Eligibility::BranchFiltered {
            branch: branch.to_string(),
        },
        Err(e) => Eligibility::InvalidBranchFilter {
            pattern: registration.branch_filter.clone(),
            cause: e.to_string(),
        },
    }
}

/// Boolean form of [`check_eligibility`].
#[must_use]
pub fn eligible(registration: &Registration, event: HookEventType, payload: &HookPayload) -> bool {
    check_eligibility(registration, event, payload).is_eligible()
}
