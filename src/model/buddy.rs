//! Buddy request document - the social graph gating who may be challenged

use serde::{Deserialize, Serialize};

use crate::model::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuddyStatus {
    Pending,
    Accepted,
    Declined,
}

/// A buddy request between two users. Challenges may only be issued between
/// users joined by an accepted request (in either direction).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuddyRequest {
    pub id: String,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub status: BuddyStatus,
}
