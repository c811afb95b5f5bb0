//! Negotiation protocol - counter-offer exchange prior to acceptance
//!
//! A challenge enters `negotiating` when either party proposes alternate
//! terms. `latestOffer` always holds the most recent proposal in full; each
//! counter-offer overwrites it and flips whose move it is. Accepting at any
//! point commits the current offer as the final terms and clears all
//! negotiation state atomically (the engine handles that); declining mid-
//! negotiation is equivalent to declining the original challenge.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::events::EngineEvent;
use crate::gateway::{collections, Precondition, WriteBatch};
use crate::machine::engine::{ensure_participant, require_actor};
use crate::machine::transition::ensure_transition;
use crate::machine::{Acceptance, ChallengeEngine};
use crate::model::{Actor, Challenge, ChallengeStatus, NegotiationStatus, OfferTerms, WagerToken};

/// Alternate terms proposed by one party.
#[derive(Debug, Clone)]
pub struct ProposedTerms {
    pub challenge_text: String,
    pub wager_amount: f64,
    pub wager_token: Option<WagerToken>,
    pub expiry_days: u32,
}

/// Counter-offer protocol layered on the challenge state machine.
pub struct NegotiationService {
    engine: Arc<ChallengeEngine>,
}

impl NegotiationService {
    pub fn new(engine: Arc<ChallengeEngine>) -> Self {
        Self { engine }
    }

    /// Propose alternate terms, opening or continuing a negotiation.
    ///
    /// The offer overwrites any previous `latestOffer` in full — fields are
    /// never merged piecemeal.
    pub async fn propose_counter_offer(
        &self,
        challenge_id: &str,
        actor: Option<&Actor>,
        terms: ProposedTerms,
    ) -> Result<Challenge> {
        let actor = require_actor(actor)?;
        let challenge = self.engine.load_challenge(challenge_id).await?;
        ensure_transition(challenge.status, ChallengeStatus::Negotiating)?;
        ensure_participant(&challenge, actor)?;

        if terms.challenge_text.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "offer challenge text is required".into(),
            ));
        }
        if terms.wager_amount < 0.0 {
            return Err(EngineError::InvalidInput(
                "offer wager amount cannot be negative".into(),
            ));
        }
        if terms.wager_amount > 0.0 && terms.wager_token.is_none() {
            return Err(EngineError::InvalidInput(
                "offer wager token is required for a wagered offer".into(),
            ));
        }
        if terms.expiry_days == 0 {
            return Err(EngineError::InvalidInput(
                "offer expiry must be at least one day".into(),
            ));
        }

        // One negotiation thread per challenge; later offers reuse the id
        let negotiation_id = challenge
            .active_negotiation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Flip whose move it is: a fresh offer awaits the other party; a
        // counter to a pending offer marks it countered.
        let negotiation_status = match challenge.negotiation_status {
            Some(NegotiationStatus::PendingResponse) => NegotiationStatus::CounterOfferReceived,
            _ => NegotiationStatus::PendingResponse,
        };

        let offer = OfferTerms {
            challenge_text: terms.challenge_text,
            wager_amount: terms.wager_amount,
            wager_token: terms.wager_token,
            expiry_days: terms.expiry_days,
            proposed_by: actor.user_id.clone(),
            proposed_at: Utc::now(),
        };

        let offer_amount = offer.wager_amount;
        let offer_token = offer.wager_token;
        let fields = json!({
            "status": ChallengeStatus::Negotiating,
            "negotiationStatus": negotiation_status,
            "activeNegotiationId": negotiation_id,
            "latestOffer": offer,
        });
        let batch = WriteBatch::new().update_guarded(
            collections::CHALLENGES,
            &challenge.id,
            fields,
            Precondition {
                field: "status".into(),
                expected: serde_json::to_value(challenge.status)
                    .map_err(crate::error::GatewayError::from)?,
            },
        );
        self.engine.commit_guarded(batch, "propose counter-offer").await?;

        info!(
            challenge_id = %challenge.id,
            negotiation_id = %negotiation_id,
            proposed_by = %actor.user_id,
            wager = offer_amount,
            "Counter-offer proposed"
        );
        self.engine.events().emit(EngineEvent::OfferProposed {
            challenge_id: challenge.id.clone(),
            negotiation_id,
            proposed_by: actor.user_id.clone(),
            wager_amount: offer_amount,
            wager_token: offer_token,
        });

        self.engine.load_challenge(&challenge.id).await
    }

    /// Accept the negotiation as it stands: the current `latestOffer`
    /// becomes the final terms (or the original terms if none exists).
    pub async fn accept(&self, challenge_id: &str, actor: Option<&Actor>) -> Result<Acceptance> {
        self.engine.accept_challenge(challenge_id, actor).await
    }

    /// Walk away from the negotiation; equivalent to declining the
    /// original challenge.
    pub async fn decline(&self, challenge_id: &str, actor: Option<&Actor>) -> Result<Challenge> {
        self.engine.decline_challenge(challenge_id, actor).await
    }
}
