//! Document shapes persisted through the gateway
//!
//! The challenge document is the single source of truth for lifecycle
//! status; the response document is the source of truth for submission
//! content, with a denormalized snapshot cached on the challenge. Field
//! names are camelCase on the wire to match the persisted layout.

pub mod buddy;
pub mod challenge;
pub mod comment;
pub mod response;

pub use buddy::{BuddyRequest, BuddyStatus};
pub use challenge::{
    Actor, Challenge, ChallengeStatus, EffectiveTerms, EscrowState, EscrowStatus,
    NegotiationStatus, OfferTerms, ResponseSnapshot, WagerToken,
};
pub use comment::Comment;
pub use response::{ChallengeResponse, ResponseKind, ResponseStatus, VideoPayload};

/// Unique identifier for a challenge
pub type ChallengeId = String;

/// Unique identifier for a challenge response
pub type ResponseId = String;

/// Unique identifier for a user
pub type UserId = String;
