//! Challenge engine - executes every lifecycle transition
//!
//! Validates preconditions, computes financial terms through the single
//! escrow math code path, and commits results atomically through the
//! gateway. Acceptance commits are guarded on the status that was read, so
//! two concurrent accept attempts cannot both succeed.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, GatewayError, Result};
use crate::escrow::{EscrowBreakdown, EscrowProvider, EscrowRequest};
use crate::events::{EngineEvent, EventBus};
use crate::gateway::{
    collections, query_or_empty, DocumentGateway, Precondition, Predicate, WriteBatch,
};
use crate::machine::transition::ensure_transition;
use crate::model::{
    Actor, BuddyStatus, Challenge, ChallengeStatus, EscrowStatus, NegotiationStatus, UserId,
    WagerToken,
};

/// Outcome of an acceptance attempt.
#[derive(Debug)]
pub enum Acceptance {
    /// Terms locked in; the returned challenge reflects the committed state.
    Accepted(Challenge),
    /// A wagered acceptance is blocked on a wallet connection. Intent has
    /// been recorded; call `accept_challenge` again once connected.
    WalletRequired { challenge_id: String },
}

/// Input for issuing a new challenge.
#[derive(Debug, Clone)]
pub struct NewChallenge {
    pub to: UserId,
    pub to_name: String,
    pub challenge_text: String,
    pub reward_text: String,
    pub wager_amount: f64,
    pub wager_token: Option<WagerToken>,
    /// Days from acceptance until the response is due; engine default when absent
    pub expiry_days: Option<u32>,
}

/// The challenge state machine executor.
pub struct ChallengeEngine {
    gateway: Arc<dyn DocumentGateway>,
    escrow: Arc<dyn EscrowProvider>,
    events: Arc<EventBus>,
    config: EngineConfig,
}

impl ChallengeEngine {
    pub fn new(
        gateway: Arc<dyn DocumentGateway>,
        escrow: Arc<dyn EscrowProvider>,
        events: Arc<EventBus>,
        config: EngineConfig,
    ) -> Self {
        Self {
            gateway,
            escrow,
            events,
            config,
        }
    }

    pub(crate) fn gateway(&self) -> &Arc<dyn DocumentGateway> {
        &self.gateway
    }

    pub(crate) fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load and deserialize a challenge document.
    pub(crate) async fn load_challenge(&self, challenge_id: &str) -> Result<Challenge> {
        if challenge_id.is_empty() {
            return Err(EngineError::InvalidChallenge("empty challenge id".into()));
        }
        let value = self
            .gateway
            .get(collections::CHALLENGES, challenge_id)
            .await
            .map_err(EngineError::Commit)?
            .ok_or_else(|| {
                EngineError::InvalidChallenge(format!("challenge {} not found", challenge_id))
            })?;
        serde_json::from_value(value).map_err(|e| {
            EngineError::InvalidChallenge(format!("malformed challenge {}: {}", challenge_id, e))
        })
    }

    /// Commit a batch whose updates are guarded on previously read state,
    /// translating a lost race into `Conflict`.
    pub(crate) async fn commit_guarded(&self, batch: WriteBatch, context: &str) -> Result<()> {
        match self.gateway.commit(batch).await {
            Ok(()) => Ok(()),
            Err(GatewayError::PreconditionFailed { .. }) => Err(EngineError::Conflict(format!(
                "{}: document was modified concurrently",
                context
            ))),
            Err(e) => Err(EngineError::Commit(e)),
        }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Issue a new challenge to a buddy.
    pub async fn create_challenge(
        &self,
        actor: Option<&Actor>,
        input: NewChallenge,
    ) -> Result<Challenge> {
        let actor = require_actor(actor)?;

        if input.to.is_empty() {
            return Err(EngineError::InvalidInput("challengee id is required".into()));
        }
        if input.to == actor.user_id {
            return Err(EngineError::InvalidInput(
                "cannot challenge yourself".into(),
            ));
        }
        if input.challenge_text.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "challenge text is required".into(),
            ));
        }
        if input.wager_amount < 0.0 {
            return Err(EngineError::InvalidInput(
                "wager amount cannot be negative".into(),
            ));
        }
        if input.wager_amount > 0.0 && input.wager_token.is_none() {
            return Err(EngineError::InvalidInput(
                "wager token is required for a wagered challenge".into(),
            ));
        }
        if input.expiry_days == Some(0) {
            return Err(EngineError::InvalidInput(
                "expiry must be at least one day".into(),
            ));
        }
        if !self.are_buddies(&actor.user_id, &input.to).await? {
            return Err(EngineError::InvalidInput(format!(
                "{} and {} are not buddies",
                actor.user_id, input.to
            )));
        }

        let challenge = Challenge {
            id: uuid::Uuid::new_v4().to_string(),
            from: actor.user_id.clone(),
            to: input.to,
            from_name: actor.display_name.clone(),
            to_name: input.to_name,
            challenge_text: input.challenge_text,
            reward_text: input.reward_text,
            wager_amount: input.wager_amount,
            wager_token: input.wager_token,
            expiry_days: input.expiry_days.unwrap_or(self.config.default_expiry_days),
            status: ChallengeStatus::Pending,
            negotiation_status: None,
            active_negotiation_id: None,
            latest_offer: None,
            pending_acceptance: false,
            escrow: None,
            has_response: false,
            has_video_response: false,
            response_id: None,
            response_data: None,
            video_url: None,
            created_at: Some(Utc::now()),
            accepted_at: None,
            declined_at: None,
            response_submitted_at: None,
            completed_at: None,
            response_by: None,
        };

        let fields = serde_json::to_value(&challenge).map_err(GatewayError::from)?;
        self.gateway
            .commit(WriteBatch::new().create(collections::CHALLENGES, &challenge.id, fields))
            .await
            .map_err(EngineError::Commit)?;

        info!(
            challenge_id = %challenge.id,
            from = %challenge.from,
            to = %challenge.to,
            wager = challenge.wager_amount,
            "Challenge created"
        );
        self.events.emit(EngineEvent::ChallengeCreated {
            challenge_id: challenge.id.clone(),
            from: challenge.from.clone(),
            to: challenge.to.clone(),
        });

        Ok(challenge)
    }

    /// Whether an accepted buddy request joins the two users, in either
    /// direction. Denied reads count as "no results", not an error.
    async fn are_buddies(&self, a: &UserId, b: &UserId) -> Result<bool> {
        let status = serde_json::to_value(BuddyStatus::Accepted).map_err(GatewayError::from)?;
        for (from, to) in [(a, b), (b, a)] {
            let found = query_or_empty(
                self.gateway.as_ref(),
                collections::BUDDY_REQUESTS,
                &[
                    Predicate::eq("fromUserId", from.as_str()),
                    Predicate::eq("toUserId", to.as_str()),
                    Predicate::eq("status", status.clone()),
                ],
                None,
                Some(1),
            )
            .await
            .map_err(EngineError::Commit)?;
            if !found.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // =========================================================================
    // Acceptance
    // =========================================================================

    /// Accept a challenge, locking in the effective terms.
    ///
    /// Zero-wager challenges transition directly. Wagered challenges require
    /// a connected wallet with sufficient balance; without a connection the
    /// intent is recorded and `Acceptance::WalletRequired` is returned so
    /// the caller can obtain one and re-enter.
    pub async fn accept_challenge(
        &self,
        challenge_id: &str,
        actor: Option<&Actor>,
    ) -> Result<Acceptance> {
        let actor = require_actor(actor)?;
        let challenge = self.load_challenge(challenge_id).await?;
        ensure_transition(challenge.status, ChallengeStatus::Accepted)?;
        ensure_participant(&challenge, actor)?;
        if let Some(offer) = &challenge.latest_offer {
            if offer.proposed_by == actor.user_id {
                return Err(EngineError::InvalidInput(
                    "cannot accept your own pending offer".into(),
                ));
            }
        }

        let terms = challenge.effective_terms();
        if terms.wager_amount > 0.0 {
            self.accept_with_escrow(challenge, actor, terms).await
        } else {
            self.accept_without_escrow(challenge, terms).await
        }
    }

    async fn accept_without_escrow(
        &self,
        challenge: Challenge,
        terms: crate::model::challenge::EffectiveTerms,
    ) -> Result<Acceptance> {
        let now = Utc::now();
        let fields = json!({
            "status": ChallengeStatus::Accepted,
            "challengeText": terms.challenge_text,
            "wagerAmount": terms.wager_amount,
            "wagerToken": terms.wager_token,
            "expiryDays": terms.expiry_days,
            "negotiationStatus": NegotiationStatus::Accepted,
            "activeNegotiationId": Value::Null,
            "latestOffer": Value::Null,
            "pendingAcceptance": false,
            "acceptedAt": now,
            "responseBy": now + Duration::days(terms.expiry_days as i64),
        });
        let batch = WriteBatch::new().update_guarded(
            collections::CHALLENGES,
            &challenge.id,
            fields,
            status_guard(challenge.status)?,
        );
        self.commit_guarded(batch, "accept challenge").await?;

        info!(challenge_id = %challenge.id, "Challenge accepted (no wager)");
        self.events.emit(EngineEvent::ChallengeAccepted {
            challenge_id: challenge.id.clone(),
            wager_amount: 0.0,
            escrow_id: None,
        });

        self.load_challenge(&challenge.id).await.map(Acceptance::Accepted)
    }

    async fn accept_with_escrow(
        &self,
        challenge: Challenge,
        actor: &Actor,
        terms: crate::model::challenge::EffectiveTerms,
    ) -> Result<Acceptance> {
        let token = terms.wager_token.ok_or_else(|| {
            EngineError::InvalidChallenge("wagered challenge has no wager token".into())
        })?;

        // No wallet: record intent and hand control back to the caller.
        // Re-entry after connection resumes from here idempotently.
        let Some(wallet) = self.escrow.connected_wallet().await else {
            if !challenge.pending_acceptance {
                let batch = WriteBatch::new().update_guarded(
                    collections::CHALLENGES,
                    &challenge.id,
                    json!({ "pendingAcceptance": true }),
                    status_guard(challenge.status)?,
                );
                self.commit_guarded(batch, "record pending acceptance").await?;
            }
            info!(challenge_id = %challenge.id, "Acceptance pending wallet connection");
            return Ok(Acceptance::WalletRequired {
                challenge_id: challenge.id,
            });
        };

        let available = self
            .escrow
            .token_balance(&wallet.public_key, token)
            .await
            .map_err(|e| EngineError::EscrowCreationFailed(e.to_string()))?;
        if available < terms.wager_amount {
            return Err(EngineError::InsufficientFunds {
                required: terms.wager_amount,
                available,
                token,
            });
        }

        let account = self
            .escrow
            .create_escrow(EscrowRequest {
                challenger: challenge.from.clone(),
                challengee: challenge.to.clone(),
                wager_amount: terms.wager_amount,
                token,
                challenge_text: terms.challenge_text.clone(),
                expiry_days: terms.expiry_days,
            })
            .await
            .map_err(|e| EngineError::EscrowCreationFailed(e.to_string()))?;
        if account.escrow_id.is_empty() {
            return Err(EngineError::EscrowCreationFailed(
                "provider returned no escrow id".into(),
            ));
        }

        // Persisted figures come from the same code path as UI previews
        let breakdown = EscrowBreakdown::for_wager(terms.wager_amount, token);

        let now = Utc::now();
        let escrow_state = crate::model::EscrowState {
            account: account.escrow_id.clone(),
            breakdown: breakdown.clone(),
            challenger_deposited: true,
            challengee_deposited: true,
            status: EscrowStatus::Funded,
        };
        let fields = json!({
            "status": ChallengeStatus::Accepted,
            "challengeText": terms.challenge_text,
            "wagerAmount": terms.wager_amount,
            "wagerToken": token,
            "expiryDays": terms.expiry_days,
            "escrow": escrow_state,
            "negotiationStatus": NegotiationStatus::Accepted,
            "activeNegotiationId": Value::Null,
            "latestOffer": Value::Null,
            "pendingAcceptance": false,
            "acceptedAt": now,
            "responseBy": now + Duration::days(terms.expiry_days as i64),
        });
        let batch = WriteBatch::new().update_guarded(
            collections::CHALLENGES,
            &challenge.id,
            fields,
            status_guard(challenge.status)?,
        );
        if let Err(e) = self.commit_guarded(batch, "accept wagered challenge").await {
            // The escrow exists but the state commit did not land. There is
            // no compensating cancel call on the provider; surface enough
            // detail for manual reconciliation.
            error!(
                challenge_id = %challenge.id,
                escrow_id = %account.escrow_id,
                actor = %actor.user_id,
                "Escrow created but state commit failed; manual reconciliation required"
            );
            return Err(e);
        }

        info!(
            challenge_id = %challenge.id,
            escrow_id = %account.escrow_id,
            total_pot = breakdown.total_pot,
            winner_payout = breakdown.winner_payout,
            "Challenge accepted with escrow"
        );
        self.events.emit(EngineEvent::ChallengeAccepted {
            challenge_id: challenge.id.clone(),
            wager_amount: terms.wager_amount,
            escrow_id: Some(account.escrow_id),
        });

        self.load_challenge(&challenge.id).await.map(Acceptance::Accepted)
    }

    // =========================================================================
    // Decline
    // =========================================================================

    /// Decline a challenge (or the negotiation in progress).
    pub async fn decline_challenge(
        &self,
        challenge_id: &str,
        actor: Option<&Actor>,
    ) -> Result<Challenge> {
        let actor = require_actor(actor)?;
        let challenge = self.load_challenge(challenge_id).await?;
        ensure_transition(challenge.status, ChallengeStatus::Declined)?;
        ensure_participant(&challenge, actor)?;

        let fields = json!({
            "status": ChallengeStatus::Declined,
            "negotiationStatus": NegotiationStatus::Declined,
            "activeNegotiationId": Value::Null,
            "latestOffer": Value::Null,
            "pendingAcceptance": false,
            "declinedAt": Utc::now(),
        });
        let batch = WriteBatch::new().update_guarded(
            collections::CHALLENGES,
            &challenge.id,
            fields,
            status_guard(challenge.status)?,
        );
        self.commit_guarded(batch, "decline challenge").await?;

        info!(challenge_id = %challenge.id, by = %actor.user_id, "Challenge declined");
        self.events.emit(EngineEvent::ChallengeDeclined {
            challenge_id: challenge.id.clone(),
        });

        self.load_challenge(&challenge.id).await
    }

    // =========================================================================
    // Verdicts on a submitted response
    // =========================================================================

    /// Approve the submitted response: the challenge completes and, when
    /// wagered, the winner payout is released to the submitter.
    pub async fn approve_response(
        &self,
        challenge_id: &str,
        actor: Option<&Actor>,
    ) -> Result<Challenge> {
        let actor = require_actor(actor)?;
        let challenge = self.load_challenge(challenge_id).await?;
        ensure_transition(challenge.status, ChallengeStatus::Completed)?;
        if actor.user_id != challenge.from {
            return Err(EngineError::InvalidInput(
                "only the challenger can approve a response".into(),
            ));
        }

        let submitter = challenge
            .response_data
            .as_ref()
            .map(|r| r.submitted_by.clone())
            .unwrap_or_else(|| challenge.to.clone());

        let mut payout = None;
        if let Some(escrow) = &challenge.escrow {
            // Settlement must land before the state commit; a failed settle
            // leaves the challenge reviewable and retryable.
            self.escrow
                .settle_escrow(&escrow.account, &submitter, escrow.breakdown.winner_payout)
                .await
                .map_err(|e| EngineError::EscrowSettlementFailed(e.to_string()))?;
            payout = Some(escrow.breakdown.winner_payout);
        }

        let mut fields = json!({
            "status": ChallengeStatus::Completed,
            "completedAt": Utc::now(),
        });
        if let Some(escrow) = &challenge.escrow {
            let mut released = escrow.clone();
            released.status = EscrowStatus::Released;
            fields["escrow"] = serde_json::to_value(released).map_err(GatewayError::from)?;
        }

        let mut batch = WriteBatch::new().update_guarded(
            collections::CHALLENGES,
            &challenge.id,
            fields,
            status_guard(challenge.status)?,
        );
        if let Some(response_id) = &challenge.response_id {
            batch = batch.update(
                collections::RESPONSES,
                response_id,
                json!({ "status": crate::model::ResponseStatus::Approved }),
            );
        }
        self.commit_guarded(batch, "approve response").await?;

        info!(
            challenge_id = %challenge.id,
            submitter = %submitter,
            payout = ?payout,
            "Response approved, challenge completed"
        );
        self.events.emit(EngineEvent::ResponseApproved {
            challenge_id: challenge.id.clone(),
            payout,
        });

        self.load_challenge(&challenge.id).await
    }

    /// Ask the responder for another attempt. Escrow funds stay held.
    pub async fn request_retry(
        &self,
        challenge_id: &str,
        actor: Option<&Actor>,
    ) -> Result<Challenge> {
        let actor = require_actor(actor)?;
        let challenge = self.load_challenge(challenge_id).await?;
        ensure_transition(challenge.status, ChallengeStatus::RetryRequested)?;
        if actor.user_id != challenge.from {
            return Err(EngineError::InvalidInput(
                "only the challenger can request a retry".into(),
            ));
        }

        let batch = WriteBatch::new().update_guarded(
            collections::CHALLENGES,
            &challenge.id,
            json!({ "status": ChallengeStatus::RetryRequested }),
            status_guard(challenge.status)?,
        );
        self.commit_guarded(batch, "request retry").await?;

        info!(challenge_id = %challenge.id, "Retry requested");
        self.events.emit(EngineEvent::RetryRequested {
            challenge_id: challenge.id.clone(),
        });

        self.load_challenge(&challenge.id).await
    }

    /// Open a dispute: the escrow is frozen pending manual resolution.
    pub async fn initiate_dispute(
        &self,
        challenge_id: &str,
        actor: Option<&Actor>,
    ) -> Result<Challenge> {
        let actor = require_actor(actor)?;
        let challenge = self.load_challenge(challenge_id).await?;
        ensure_transition(challenge.status, ChallengeStatus::Disputed)?;
        ensure_participant(&challenge, actor)?;

        let mut fields = json!({ "status": ChallengeStatus::Disputed });
        if let Some(escrow) = &challenge.escrow {
            self.escrow
                .freeze_escrow(&escrow.account)
                .await
                .map_err(|e| EngineError::EscrowSettlementFailed(e.to_string()))?;
            let mut frozen = escrow.clone();
            frozen.status = EscrowStatus::Frozen;
            fields["escrow"] = serde_json::to_value(frozen).map_err(GatewayError::from)?;
        }

        let batch = WriteBatch::new().update_guarded(
            collections::CHALLENGES,
            &challenge.id,
            fields,
            status_guard(challenge.status)?,
        );
        self.commit_guarded(batch, "initiate dispute").await?;

        warn!(challenge_id = %challenge.id, by = %actor.user_id, "Dispute opened");
        self.events.emit(EngineEvent::DisputeOpened {
            challenge_id: challenge.id.clone(),
        });

        self.load_challenge(&challenge.id).await
    }
}

/// Reject unauthenticated callers before any side effect.
pub(crate) fn require_actor(actor: Option<&Actor>) -> Result<&Actor> {
    actor.ok_or(EngineError::NotAuthenticated)
}

pub(crate) fn ensure_participant(challenge: &Challenge, actor: &Actor) -> Result<()> {
    if actor.user_id != challenge.from && actor.user_id != challenge.to {
        return Err(EngineError::InvalidInput(format!(
            "{} is not a participant of challenge {}",
            actor.user_id, challenge.id
        )));
    }
    Ok(())
}

/// Guard an update on the status that was read, making the commit race-safe.
fn status_guard(status: ChallengeStatus) -> Result<Precondition> {
    Ok(Precondition {
        field: "status".into(),
        expected: serde_json::to_value(status).map_err(GatewayError::from)?,
    })
}
