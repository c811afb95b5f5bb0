//! Error types for the challenge engine
//!
//! `EngineError` is the public taxonomy surfaced to callers; `GatewayError`
//! covers persistence-layer failures and is wrapped by `EngineError::Commit`.
//! Retryable failures (transient backend unavailability, upload hiccups) are
//! distinguished from terminal ones so the UI can decide whether to offer a
//! retry affordance.

use thiserror::Error;

use crate::model::{ChallengeStatus, WagerToken};

/// Convenience alias used throughout the crate.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Failures reported by the persistence gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("document already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },

    #[error("precondition failed on {collection}/{id} field '{field}'")]
    PreconditionFailed {
        collection: String,
        id: String,
        field: String,
    },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

/// Failures reported by the escrow provider.
#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("escrow request rejected: {0}")]
    Rejected(String),

    #[error("escrow provider error: {0}")]
    Provider(String),
}

/// Failures reported by the object store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Public error taxonomy of the challenge engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ChallengeStatus,
        to: ChallengeStatus,
    },

    #[error("insufficient funds: need {required} {token}, have {available}")]
    InsufficientFunds {
        required: f64,
        available: f64,
        token: WagerToken,
    },

    #[error("escrow creation failed: {0}")]
    EscrowCreationFailed(String),

    #[error("escrow settlement failed: {0}")]
    EscrowSettlementFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("conflicting concurrent update: {0}")]
    Conflict(String),

    #[error("commit failed: {0}")]
    Commit(#[from] GatewayError),
}

impl EngineError {
    /// Whether the caller should be offered a retry affordance.
    ///
    /// Validation failures, insufficient funds, and invalid transitions are
    /// terminal; transient backend failures and upload failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::UploadFailed(_) => true,
            EngineError::Commit(e) => e.is_retryable(),
            _ => false,
        }
    }
}
