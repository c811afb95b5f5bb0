//! Challenge response document - proof of completion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ChallengeId, ResponseId, UserId};

/// Kind of proof attached to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Text,
    Video,
}

/// Approval state of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Awaiting the challenger's verdict
    Submitted,
    Approved,
    Rejected,
}

/// The authoritative response document.
///
/// Social counters are mutated only through provider-level atomic
/// increments, never read-modify-write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub id: ResponseId,
    pub challenge_id: ChallengeId,
    pub submitted_by: UserId,
    pub submitted_by_name: String,

    pub kind: ResponseKind,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub file_size_bytes: Option<u64>,
    #[serde(default)]
    pub text: Option<String>,

    /// Whether the response appears in the public gallery
    pub is_public: bool,

    #[serde(default)]
    pub fire_count: i64,
    #[serde(default)]
    pub comment_count: i64,

    pub status: ResponseStatus,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Raw video submission handed to the pipeline by the UI layer.
#[derive(Debug, Clone)]
pub struct VideoPayload {
    /// Client-side source the bytes were read from
    pub uri: String,
    pub bytes: Vec<u8>,
    /// Pre-rendered thumbnail, uploaded best-effort
    pub thumbnail: Option<Vec<u8>>,
    pub duration_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_serializes_camel_case() {
        let response = ChallengeResponse {
            id: "resp-1".into(),
            challenge_id: "ch-1".into(),
            submitted_by: "bob".into(),
            submitted_by_name: "Bob".into(),
            kind: ResponseKind::Video,
            video_url: Some("https://cdn.example/v.mp4".into()),
            thumbnail_url: None,
            duration_secs: Some(12.5),
            file_size_bytes: Some(1024),
            text: None,
            is_public: true,
            fire_count: 0,
            comment_count: 0,
            status: ResponseStatus::Submitted,
            created_at: Some(Utc::now()),
        };
        let v = serde_json::to_value(&response).unwrap();
        assert!(v.get("challengeId").is_some());
        assert!(v.get("fireCount").is_some());
        assert_eq!(v["status"], serde_json::json!("submitted"));
    }

    #[test]
    fn test_counters_default_to_zero() {
        let v = serde_json::json!({
            "id": "resp-1",
            "challengeId": "ch-1",
            "submittedBy": "bob",
            "submittedByName": "Bob",
            "kind": "text",
            "text": "done!",
            "isPublic": false,
            "status": "submitted",
        });
        let response: ChallengeResponse = serde_json::from_value(v).unwrap();
        assert_eq!(response.fire_count, 0);
        assert_eq!(response.comment_count, 0);
    }
}
