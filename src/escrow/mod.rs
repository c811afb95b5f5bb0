//! Escrow provider - the external wallet/escrow collaborator contract
//!
//! The engine depends only on this narrow surface: connection state, token
//! balances, escrow creation at acceptance, and settle/freeze at terminal
//! transitions. Cryptographic signing and on-chain mechanics live entirely
//! behind the provider.

pub mod simulated;
pub mod terms;

pub use simulated::SimulatedEscrowProvider;
pub use terms::{EscrowBreakdown, PLATFORM_FEE_RATE};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EscrowError;
use crate::model::{UserId, WagerToken};

/// Wallet types the provider can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    Phantom,
    Solflare,
    Backpack,
}

/// A connected wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub public_key: String,
    pub balance: f64,
    pub kind: WalletKind,
}

/// Request to open an escrow for an accepted wagered challenge.
#[derive(Debug, Clone)]
pub struct EscrowRequest {
    pub challenger: UserId,
    pub challengee: UserId,
    pub wager_amount: f64,
    pub token: WagerToken,
    pub challenge_text: String,
    pub expiry_days: u32,
}

/// Provider response to a successful escrow creation.
#[derive(Debug, Clone)]
pub struct EscrowAccount {
    pub escrow_id: String,
    pub breakdown: EscrowBreakdown,
}

/// The escrow collaborator contract.
#[async_trait]
pub trait EscrowProvider: Send + Sync {
    async fn is_connected(&self) -> bool;

    /// Currently connected wallet, if any.
    async fn connected_wallet(&self) -> Option<Wallet>;

    async fn connect_wallet(&self, kind: WalletKind) -> Result<Wallet, EscrowError>;

    /// Balance of `token` held by `public_key`.
    async fn token_balance(&self, public_key: &str, token: WagerToken)
        -> Result<f64, EscrowError>;

    /// Open an escrow holding both parties' deposits.
    async fn create_escrow(&self, request: EscrowRequest) -> Result<EscrowAccount, EscrowError>;

    /// Release `amount` from the escrow to `recipient`.
    async fn settle_escrow(
        &self,
        escrow_id: &str,
        recipient: &str,
        amount: f64,
    ) -> Result<(), EscrowError>;

    /// Freeze the escrow pending manual resolution.
    async fn freeze_escrow(&self, escrow_id: &str) -> Result<(), EscrowError>;
}
