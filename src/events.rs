//! Engine event bus
//!
//! Every state-changing operation emits an event after its commit succeeds.
//! Consumers (UI refresh, audit logging, notification fan-out) subscribe via
//! a broadcast channel; emission never blocks or fails the operation.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::model::{ChallengeId, ResponseId, UserId, WagerToken};

/// Events emitted by the engine after successful commits.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    ChallengeCreated {
        challenge_id: ChallengeId,
        from: UserId,
        to: UserId,
    },
    ChallengeAccepted {
        challenge_id: ChallengeId,
        wager_amount: f64,
        escrow_id: Option<String>,
    },
    ChallengeDeclined {
        challenge_id: ChallengeId,
    },
    OfferProposed {
        challenge_id: ChallengeId,
        negotiation_id: String,
        proposed_by: UserId,
        wager_amount: f64,
        wager_token: Option<WagerToken>,
    },
    ResponseSubmitted {
        challenge_id: ChallengeId,
        response_id: Option<ResponseId>,
        has_video: bool,
    },
    ResponseApproved {
        challenge_id: ChallengeId,
        payout: Option<f64>,
    },
    RetryRequested {
        challenge_id: ChallengeId,
    },
    DisputeOpened {
        challenge_id: ChallengeId,
    },
    PrivacyToggled {
        response_id: ResponseId,
        is_public: bool,
    },
    CommentAdded {
        response_id: ResponseId,
        comment_id: String,
    },
}

/// Broadcast bus for engine events.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: EngineEvent) {
        trace!(event = ?event, "Emitting engine event");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that logs every engine event.
pub fn spawn_logging_listener(bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match &event {
                    EngineEvent::ChallengeAccepted {
                        challenge_id,
                        wager_amount,
                        escrow_id,
                    } => {
                        debug!(
                            challenge_id = %challenge_id,
                            wager = wager_amount,
                            escrow = ?escrow_id,
                            "Challenge accepted"
                        );
                    }
                    EngineEvent::ResponseSubmitted {
                        challenge_id,
                        has_video,
                        ..
                    } => {
                        debug!(challenge_id = %challenge_id, video = has_video, "Response submitted");
                    }
                    other => {
                        trace!(event = ?other, "Engine event");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
