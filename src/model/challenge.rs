//! Challenge document - the central entity of the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ChallengeId, ResponseId, UserId};

//=============================================================================
// STATUS ENUMS
//=============================================================================

/// Lifecycle status of a challenge.
///
/// Transitions are validated centrally by the state machine; see
/// `machine::transition` for the allowed edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    /// Issued, awaiting the challengee's decision
    Pending,
    /// Counter-offers in flight
    Negotiating,
    /// Terms locked in; escrow funded when wagered
    Accepted,
    /// Proof submitted, awaiting the challenger's verdict
    ResponseSubmitted,
    /// Challenger asked for another attempt
    RetryRequested,
    /// Terminal: proof approved, escrow released
    Completed,
    /// Terminal: challenge turned down
    Declined,
    /// Escrow frozen pending manual resolution
    Disputed,
}

impl std::fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChallengeStatus::Pending => "pending",
            ChallengeStatus::Negotiating => "negotiating",
            ChallengeStatus::Accepted => "accepted",
            ChallengeStatus::ResponseSubmitted => "response_submitted",
            ChallengeStatus::RetryRequested => "retry_requested",
            ChallengeStatus::Completed => "completed",
            ChallengeStatus::Declined => "declined",
            ChallengeStatus::Disputed => "disputed",
        };
        f.write_str(s)
    }
}

/// Whose move it is during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    /// An offer is on the table, awaiting the other party
    PendingResponse,
    /// A prior offer has just been countered
    CounterOfferReceived,
    /// Negotiation ended in acceptance
    Accepted,
    /// Negotiation ended in decline
    Declined,
}

/// Wager tokens supported for escrow-backed challenges.
///
/// Each token carries a fixed bonus multiplier applied to the pot at
/// acceptance; see `escrow::terms` for the financial math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WagerToken {
    Sol,
    Usdc,
    Bonk,
}

impl std::fmt::Display for WagerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WagerToken::Sol => "SOL",
            WagerToken::Usdc => "USDC",
            WagerToken::Bonk => "BONK",
        };
        f.write_str(s)
    }
}

//=============================================================================
// NEGOTIATION & ESCROW STATE
//=============================================================================

/// A full alternate-terms snapshot proposed during negotiation.
///
/// Every counter-offer overwrites the previous one in full; fields are never
/// merged piecemeal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferTerms {
    pub challenge_text: String,
    pub wager_amount: f64,
    pub wager_token: Option<WagerToken>,
    pub expiry_days: u32,
    /// Party that proposed this offer
    pub proposed_by: UserId,
    pub proposed_at: DateTime<Utc>,
}

/// Lifecycle of the escrow account tied to an accepted wagered challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Both deposits locked
    Funded,
    /// Winner payout released at approval
    Released,
    /// Held pending manual dispute resolution
    Frozen,
}

/// Escrow fields populated once a wagered challenge reaches `accepted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowState {
    /// Provider-assigned escrow account id
    pub account: String,
    pub breakdown: crate::escrow::EscrowBreakdown,
    pub challenger_deposited: bool,
    pub challengee_deposited: bool,
    pub status: EscrowStatus,
}

/// Denormalized copy of the authoritative response document, cached on the
/// challenge for fast reads. Kept consistent by writing both documents in
/// the same atomic commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    pub kind: crate::model::ResponseKind,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
    pub is_public: bool,
    pub submitted_by: UserId,
}

//=============================================================================
// CHALLENGE DOCUMENT
//=============================================================================

/// The challenge document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: ChallengeId,

    /// Challenger (issuer)
    pub from: UserId,
    /// Challengee
    pub to: UserId,
    pub from_name: String,
    pub to_name: String,

    pub challenge_text: String,
    #[serde(default)]
    pub reward_text: String,
    #[serde(default)]
    pub wager_amount: f64,
    #[serde(default)]
    pub wager_token: Option<WagerToken>,
    /// Days from acceptance until the response is due
    pub expiry_days: u32,

    pub status: ChallengeStatus,

    // Negotiation state; non-null iff an offer is awaiting a decision
    #[serde(default)]
    pub negotiation_status: Option<NegotiationStatus>,
    #[serde(default)]
    pub active_negotiation_id: Option<String>,
    #[serde(default)]
    pub latest_offer: Option<OfferTerms>,

    /// Acceptance recorded but blocked on a wallet connection
    #[serde(default)]
    pub pending_acceptance: bool,

    #[serde(default)]
    pub escrow: Option<EscrowState>,

    // Response linkage
    #[serde(default)]
    pub has_response: bool,
    #[serde(default)]
    pub has_video_response: bool,
    #[serde(default)]
    pub response_id: Option<ResponseId>,
    #[serde(default)]
    pub response_data: Option<ResponseSnapshot>,
    /// Legacy mirror of the response video URL, kept for older readers
    #[serde(default)]
    pub video_url: Option<String>,

    // Server-assigned timestamps, each set exactly once
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub declined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub response_submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Response deadline, derived from acceptance time plus expiry window
    #[serde(default)]
    pub response_by: Option<DateTime<Utc>>,
}

/// Effective terms of a challenge: the latest negotiated offer when one is
/// on the table, otherwise the original terms.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveTerms {
    pub challenge_text: String,
    pub wager_amount: f64,
    pub wager_token: Option<WagerToken>,
    pub expiry_days: u32,
}

impl Challenge {
    /// Terms that would apply if the challenge were accepted right now.
    pub fn effective_terms(&self) -> EffectiveTerms {
        match &self.latest_offer {
            Some(offer) => EffectiveTerms {
                challenge_text: offer.challenge_text.clone(),
                wager_amount: offer.wager_amount,
                wager_token: offer.wager_token,
                expiry_days: offer.expiry_days,
            },
            None => EffectiveTerms {
                challenge_text: self.challenge_text.clone(),
                wager_amount: self.wager_amount,
                wager_token: self.wager_token,
                expiry_days: self.expiry_days,
            },
        }
    }

    /// Whether negotiation state is currently live on this challenge.
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self.negotiation_status,
            Some(NegotiationStatus::PendingResponse)
                | Some(NegotiationStatus::CounterOfferReceived)
        )
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub display_name: String,
}

impl Actor {
    pub fn new(user_id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}
