//! Central transition table for challenge statuses
//!
//! ```text
//! pending ────────────┬──▶ accepted ──▶ response_submitted ──▶ completed
//!    │                │                   │            ▲
//!    ▼                │                   │            │
//! negotiating ──loop──┤                   ├──▶ retry_requested
//!    │                │                   │
//!    ▼                │                   └──▶ disputed
//! declined ◀──────────┘
//! ```
//!
//! `completed` and `declined` are terminal. The negotiating self-edge covers
//! counter-offer loops.

use crate::error::EngineError;
use crate::model::ChallengeStatus;

impl ChallengeStatus {
    /// Statuses reachable from this one.
    pub fn allowed_transitions(self) -> &'static [ChallengeStatus] {
        use ChallengeStatus::*;
        match self {
            Pending => &[Accepted, Declined, Negotiating],
            Negotiating => &[Accepted, Declined, Negotiating],
            Accepted => &[ResponseSubmitted],
            ResponseSubmitted => &[Completed, RetryRequested, Disputed],
            RetryRequested => &[ResponseSubmitted],
            Completed | Declined => &[],
            Disputed => &[],
        }
    }

    pub fn can_transition_to(self, next: ChallengeStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// Validate a transition, rejecting invalid edges centrally.
pub fn ensure_transition(
    from: ChallengeStatus,
    to: ChallengeStatus,
) -> Result<(), EngineError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}
