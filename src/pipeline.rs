//! Response submission pipeline
//!
//! Intake for proof-of-completion payloads. Video submissions run a five
//! step pipeline: upload, best-effort thumbnail, response creation, atomic
//! challenge update, best-effort owner notification. Text responses take a
//! deliberately lighter single-commit path onto the challenge document.
//!
//! The response document is authoritative for submission content; the
//! challenge carries a denormalized snapshot. Both are always written in
//! the same atomic batch so the copies cannot diverge.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{EngineError, GatewayError, Result};
use crate::events::EngineEvent;
use crate::gateway::{collections, query_or_empty, OrderBy, Precondition, Predicate, WriteBatch};
use crate::machine::engine::{ensure_participant, require_actor};
use crate::machine::transition::ensure_transition;
use crate::machine::ChallengeEngine;
use crate::model::{
    Actor, Challenge, ChallengeResponse, ChallengeStatus, Comment, ResponseKind, ResponseSnapshot,
    ResponseStatus, VideoPayload,
};
use crate::notify::{Notification, Notifier};
use crate::storage::{media_path, ObjectStore};

/// Result of a successful video submission.
#[derive(Debug, Clone)]
pub struct VideoSubmission {
    pub response_id: String,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
}

/// Video/text response intake and social actions on responses.
pub struct ResponsePipeline {
    engine: Arc<ChallengeEngine>,
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
}

impl ResponsePipeline {
    pub fn new(
        engine: Arc<ChallengeEngine>,
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            engine,
            store,
            notifier,
        }
    }

    // =========================================================================
    // Video submission
    // =========================================================================

    /// Submit video proof for a challenge.
    ///
    /// Aborts with no side effects on upload failure; thumbnail upload and
    /// owner notification are best-effort and never fail the call. Retrying
    /// after a failure creates a fresh response document (no deduplication).
    pub async fn submit_video_response(
        &self,
        challenge_id: &str,
        actor: Option<&Actor>,
        video: VideoPayload,
        is_public: bool,
    ) -> Result<VideoSubmission> {
        let actor = require_actor(actor)?;
        if challenge_id.is_empty() {
            return Err(EngineError::InvalidInput("empty challenge id".into()));
        }
        if video.uri.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "video payload has no readable source".into(),
            ));
        }
        if video.bytes.is_empty() {
            return Err(EngineError::InvalidInput("video payload is empty".into()));
        }
        if video.bytes.len() > self.engine.config().max_video_bytes {
            return Err(EngineError::InvalidInput(format!(
                "video exceeds maximum size of {} bytes",
                self.engine.config().max_video_bytes
            )));
        }

        let challenge = self.engine.load_challenge(challenge_id).await?;
        ensure_transition(challenge.status, ChallengeStatus::ResponseSubmitted)?;
        ensure_participant(&challenge, actor)?;

        // Step 1: upload the video; terminal for the call on failure
        let video_path = media_path(
            &self.engine.config().video_path_prefix,
            &actor.user_id,
            "mp4",
        );
        let file_size = video.bytes.len() as u64;
        let video_ref = self
            .store
            .upload(&video_path, video.bytes)
            .await
            .map_err(|e| EngineError::UploadFailed(e.to_string()))?;
        let video_url = self
            .store
            .download_url(&video_ref)
            .await
            .map_err(|e| EngineError::UploadFailed(e.to_string()))?;

        // Step 2: thumbnail is best-effort
        let thumbnail_url = match video.thumbnail {
            Some(bytes) => self.upload_thumbnail(&actor.user_id, bytes).await,
            None => None,
        };

        // Steps 3+4: response document and challenge update, one batch
        let response_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let response = ChallengeResponse {
            id: response_id.clone(),
            challenge_id: challenge.id.clone(),
            submitted_by: actor.user_id.clone(),
            submitted_by_name: actor.display_name.clone(),
            kind: ResponseKind::Video,
            video_url: Some(video_url.clone()),
            thumbnail_url: thumbnail_url.clone(),
            duration_secs: Some(video.duration_secs),
            file_size_bytes: Some(file_size),
            text: None,
            is_public,
            fire_count: 0,
            comment_count: 0,
            status: ResponseStatus::Submitted,
            created_at: Some(now),
        };
        let snapshot = ResponseSnapshot {
            kind: ResponseKind::Video,
            video_url: Some(video_url.clone()),
            thumbnail_url: thumbnail_url.clone(),
            duration_secs: Some(video.duration_secs),
            text: None,
            is_public,
            submitted_by: actor.user_id.clone(),
        };

        let response_fields = serde_json::to_value(&response).map_err(GatewayError::from)?;
        let challenge_fields = json!({
            "status": ChallengeStatus::ResponseSubmitted,
            "hasResponse": true,
            "hasVideoResponse": true,
            "responseId": response_id,
            "responseData": snapshot,
            // Legacy mirror for older readers
            "videoUrl": video_url,
            "responseSubmittedAt": now,
        });
        let batch = WriteBatch::new()
            .create(collections::RESPONSES, &response_id, response_fields)
            .update_guarded(
                collections::CHALLENGES,
                &challenge.id,
                challenge_fields,
                Precondition {
                    field: "status".into(),
                    expected: serde_json::to_value(challenge.status)
                        .map_err(GatewayError::from)?,
                },
            );
        self.engine.commit_guarded(batch, "submit video response").await?;

        info!(
            challenge_id = %challenge.id,
            response_id = %response_id,
            bytes = file_size,
            public = is_public,
            "Video response submitted"
        );

        // Step 5: owner notification, best-effort
        self.notify_owner(&challenge, actor, "submitted video proof").await;

        self.engine.events().emit(EngineEvent::ResponseSubmitted {
            challenge_id: challenge.id.clone(),
            response_id: Some(response_id.clone()),
            has_video: true,
        });

        Ok(VideoSubmission {
            response_id,
            video_url,
            thumbnail_url,
        })
    }

    async fn upload_thumbnail(&self, user_id: &crate::model::UserId, bytes: Vec<u8>) -> Option<String> {
        let path = media_path(&self.engine.config().video_path_prefix, user_id, "jpg");
        let storage_ref = match self.store.upload(&path, bytes).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Thumbnail upload failed, continuing without");
                return None;
            }
        };
        match self.store.download_url(&storage_ref).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, "Thumbnail URL resolution failed, continuing without");
                None
            }
        }
    }

    async fn notify_owner(&self, challenge: &Challenge, actor: &Actor, what: &str) {
        let notification = Notification {
            recipient: challenge.from.clone(),
            challenge_id: challenge.id.clone(),
            title: "Challenge update".into(),
            body: format!("{} {}", actor.display_name, what),
        };
        if let Err(e) = self.notifier.notify(notification).await {
            warn!(challenge_id = %challenge.id, error = %e, "Owner notification failed");
        }
    }

    // =========================================================================
    // Text submission
    // =========================================================================

    /// Submit text proof: a single commit onto the challenge document, with
    /// no separate response document.
    pub async fn submit_text_response(
        &self,
        challenge_id: &str,
        actor: Option<&Actor>,
        text: &str,
    ) -> Result<Challenge> {
        let actor = require_actor(actor)?;
        if text.trim().is_empty() {
            return Err(EngineError::InvalidInput("response text is required".into()));
        }

        let challenge = self.engine.load_challenge(challenge_id).await?;
        ensure_transition(challenge.status, ChallengeStatus::ResponseSubmitted)?;
        ensure_participant(&challenge, actor)?;

        let snapshot = ResponseSnapshot {
            kind: ResponseKind::Text,
            video_url: None,
            thumbnail_url: None,
            duration_secs: None,
            text: Some(text.to_string()),
            is_public: false,
            submitted_by: actor.user_id.clone(),
        };
        let fields = json!({
            "status": ChallengeStatus::ResponseSubmitted,
            "hasResponse": true,
            "hasVideoResponse": false,
            "responseId": Value::Null,
            "responseData": snapshot,
            "responseSubmittedAt": Utc::now(),
        });
        let batch = WriteBatch::new().update_guarded(
            collections::CHALLENGES,
            &challenge.id,
            fields,
            Precondition {
                field: "status".into(),
                expected: serde_json::to_value(challenge.status).map_err(GatewayError::from)?,
            },
        );
        self.engine.commit_guarded(batch, "submit text response").await?;

        info!(challenge_id = %challenge.id, "Text response submitted");
        self.notify_owner(&challenge, actor, "submitted a response").await;
        self.engine.events().emit(EngineEvent::ResponseSubmitted {
            challenge_id: challenge.id.clone(),
            response_id: None,
            has_video: false,
        });

        self.engine.load_challenge(&challenge.id).await
    }

    // =========================================================================
    // Privacy
    // =========================================================================

    /// Flip the gallery visibility of a video response.
    ///
    /// Reads the current value and flips it under a precondition guard, so
    /// concurrent toggles conflict rather than silently losing an update.
    /// Both the response document and the challenge snapshot change in one
    /// batch.
    pub async fn toggle_video_privacy(
        &self,
        response_id: &str,
        challenge_id: &str,
    ) -> Result<bool> {
        let response = self.load_response(response_id).await?;
        let challenge = self.engine.load_challenge(challenge_id).await?;
        // The challenge snapshot may only be rewritten from its own response
        if response.challenge_id != challenge.id {
            return Err(EngineError::InvalidInput(format!(
                "response {} does not belong to challenge {}",
                response_id, challenge.id
            )));
        }
        let new_value = !response.is_public;

        let mut batch = WriteBatch::new().update_guarded(
            collections::RESPONSES,
            response_id,
            json!({ "isPublic": new_value }),
            Precondition {
                field: "isPublic".into(),
                expected: Value::Bool(response.is_public),
            },
        );
        if let Some(mut snapshot) = challenge.response_data.clone() {
            snapshot.is_public = new_value;
            batch = batch.update(
                collections::CHALLENGES,
                &challenge.id,
                json!({ "responseData": snapshot }),
            );
        }
        self.engine.commit_guarded(batch, "toggle video privacy").await?;

        info!(response_id = %response_id, public = new_value, "Video privacy toggled");
        self.engine.events().emit(EngineEvent::PrivacyToggled {
            response_id: response_id.to_string(),
            is_public: new_value,
        });

        Ok(new_value)
    }

    // =========================================================================
    // Social actions
    // =========================================================================

    /// Add a comment to a response; the comment document and the counter
    /// increment land in one atomic batch.
    pub async fn add_comment(
        &self,
        response_id: &str,
        actor: Option<&Actor>,
        text: &str,
    ) -> Result<Comment> {
        let actor = require_actor(actor)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::InvalidInput("comment text is required".into()));
        }
        if text.chars().count() > self.engine.config().max_comment_length {
            return Err(EngineError::InvalidInput(format!(
                "comment exceeds {} characters",
                self.engine.config().max_comment_length
            )));
        }
        // Existence check keeps the append from dangling off a deleted doc
        self.load_response(response_id).await?;

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            response_id: response_id.to_string(),
            author_id: actor.user_id.clone(),
            author_name: actor.display_name.clone(),
            text: text.to_string(),
            created_at: Some(Utc::now()),
        };
        let fields = serde_json::to_value(&comment).map_err(GatewayError::from)?;
        let batch = WriteBatch::new()
            .create(collections::COMMENTS, &comment.id, fields)
            .increment(collections::RESPONSES, response_id, "commentCount", 1);
        self.engine.commit_guarded(batch, "add comment").await?;

        self.engine.events().emit(EngineEvent::CommentAdded {
            response_id: response_id.to_string(),
            comment_id: comment.id.clone(),
        });

        Ok(comment)
    }

    /// React to a response. Provider-level atomic increment, no
    /// read-modify-write.
    pub async fn add_fire_reaction(&self, response_id: &str) -> Result<()> {
        self.engine
            .gateway()
            .increment(collections::RESPONSES, response_id, "fireCount", 1)
            .await
            .map_err(EngineError::Commit)
    }

    /// Comments on a response, newest first.
    pub async fn comments(&self, response_id: &str) -> Result<Vec<Comment>> {
        let docs = query_or_empty(
            self.engine.gateway().as_ref(),
            collections::COMMENTS,
            &[Predicate::eq("responseId", response_id)],
            Some(&OrderBy::desc("createdAt")),
            None,
        )
        .await
        .map_err(EngineError::Commit)?;
        Ok(docs
            .into_iter()
            .filter_map(|doc| serde_json::from_value(doc).ok())
            .collect())
    }

    /// Public responses for the gallery, newest first. A denied read is an
    /// empty gallery, not an error.
    pub async fn public_gallery(&self, limit: usize) -> Result<Vec<ChallengeResponse>> {
        let docs = query_or_empty(
            self.engine.gateway().as_ref(),
            collections::RESPONSES,
            &[Predicate::eq("isPublic", true)],
            Some(&OrderBy::desc("createdAt")),
            Some(limit),
        )
        .await
        .map_err(EngineError::Commit)?;
        Ok(docs
            .into_iter()
            .filter_map(|doc| serde_json::from_value(doc).ok())
            .collect())
    }

    async fn load_response(&self, response_id: &str) -> Result<ChallengeResponse> {
        if response_id.is_empty() {
            return Err(EngineError::InvalidInput("empty response id".into()));
        }
        let value = self
            .engine
            .gateway()
            .get(collections::RESPONSES, response_id)
            .await
            .map_err(EngineError::Commit)?
            .ok_or_else(|| {
                EngineError::InvalidInput(format!("response {} not found", response_id))
            })?;
        serde_json::from_value(value).map_err(|e| {
            EngineError::InvalidInput(format!("malformed response {}: {}", response_id, e))
        })
    }
}
