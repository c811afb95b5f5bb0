//! Challenge state machine
//!
//! Every transition a challenge can undergo flows through one validation
//! point (`transition`) and one executor (`engine`), so status rules are
//! never re-checked ad hoc at call sites.

pub mod engine;
pub mod transition;

pub use engine::{Acceptance, ChallengeEngine, NewChallenge};
pub use transition::ensure_transition;
