//! Coliseum Core - challenge lifecycle and negotiation engine
//!
//! The backend-agnostic heart of a head-to-head fitness challenge system:
//! two users agree on a feat, optionally wager tokens held in escrow, and
//! settle the outcome when proof is submitted and judged.
//!
//! ## Services
//!
//! - **Machine**: the challenge state machine and its executor, [`ChallengeEngine`]
//! - **Negotiation**: counter-offer exchange prior to acceptance
//! - **Pipeline**: video/text proof intake, privacy, comments, reactions
//! - **Gateway**: the document-store contract (atomic batches, subscriptions)
//! - **Escrow**: the wallet/escrow provider contract and financial math
//! - **Watch**: live per-challenge change feeds
//!
//! All persistence flows through [`gateway::DocumentGateway`] and all funds
//! movement through [`escrow::EscrowProvider`]; swap in real backends at the
//! edges and the lifecycle rules stay identical.

pub mod config;
pub mod error;
pub mod escrow;
pub mod events;
pub mod gateway;
pub mod machine;
pub mod model;
pub mod negotiation;
pub mod notify;
pub mod pipeline;
pub mod storage;
pub mod watch;

pub use config::EngineConfig;
pub use error::{EngineError, EscrowError, GatewayError, Result, StorageError};
pub use events::{EngineEvent, EventBus};
pub use machine::{Acceptance, ChallengeEngine, NewChallenge};
pub use model::{Actor, Challenge, ChallengeStatus, WagerToken};
pub use negotiation::{NegotiationService, ProposedTerms};
pub use pipeline::{ResponsePipeline, VideoSubmission};
pub use watch::ChallengeWatcher;
