//! Best-effort notifications
//!
//! Notification delivery is a side step of the response pipeline: failures
//! are logged and swallowed, never propagated to the caller.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::model::{ChallengeId, UserId};

#[derive(Error, Debug)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// A notification to a challenge participant.
#[derive(Debug, Clone)]
pub struct Notification {
    pub recipient: UserId,
    pub challenge_id: ChallengeId,
    pub title: String,
    pub body: String,
}

/// Delivery hook implemented by the embedding application.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Default notifier that only logs.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            recipient = %notification.recipient,
            challenge_id = %notification.challenge_id,
            title = %notification.title,
            "Notification"
        );
        Ok(())
    }
}
