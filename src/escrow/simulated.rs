//! Simulated escrow provider
//!
//! Deterministic in-process stand-in for the on-chain escrow service.
//! Carries configurable balances, records created escrows, and counts
//! provider calls so tests can assert the engine never touches escrow on
//! zero-wager paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::EscrowError;
use crate::escrow::{
    EscrowAccount, EscrowBreakdown, EscrowProvider, EscrowRequest, Wallet, WalletKind,
};
use crate::model::WagerToken;

/// State of a simulated escrow account.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedEscrowState {
    Funded,
    Released { recipient: String, amount: f64 },
    Frozen,
}

struct SimState {
    wallet: Option<Wallet>,
    balances: HashMap<(String, WagerToken), f64>,
    escrows: HashMap<String, SimulatedEscrowState>,
}

/// In-process [`EscrowProvider`] for tests and local runs.
pub struct SimulatedEscrowProvider {
    state: RwLock<SimState>,
    create_calls: AtomicUsize,
    fail_creation: AtomicBool,
    fail_settlement: AtomicBool,
}

impl SimulatedEscrowProvider {
    /// Start with no wallet connected.
    pub fn disconnected() -> Self {
        Self {
            state: RwLock::new(SimState {
                wallet: None,
                balances: HashMap::new(),
                escrows: HashMap::new(),
            }),
            create_calls: AtomicUsize::new(0),
            fail_creation: AtomicBool::new(false),
            fail_settlement: AtomicBool::new(false),
        }
    }

    /// Start with a connected wallet.
    pub fn with_wallet(public_key: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(SimState {
                wallet: Some(Wallet {
                    public_key: public_key.into(),
                    balance: 0.0,
                    kind: WalletKind::Phantom,
                }),
                balances: HashMap::new(),
                escrows: HashMap::new(),
            }),
            create_calls: AtomicUsize::new(0),
            fail_creation: AtomicBool::new(false),
            fail_settlement: AtomicBool::new(false),
        }
    }

    /// Set the balance of a token for a public key.
    pub async fn set_balance(&self, public_key: &str, token: WagerToken, amount: f64) {
        let mut state = self.state.write().await;
        state
            .balances
            .insert((public_key.to_string(), token), amount);
    }

    /// Connect a wallet directly (as if the user approved a connection).
    pub async fn connect(&self, public_key: &str) {
        let mut state = self.state.write().await;
        state.wallet = Some(Wallet {
            public_key: public_key.to_string(),
            balance: 0.0,
            kind: WalletKind::Phantom,
        });
    }

    pub async fn disconnect(&self) {
        self.state.write().await.wallet = None;
    }

    /// Make the next `create_escrow` calls fail.
    pub fn fail_escrow_creation(&self, fail: bool) {
        self.fail_creation.store(fail, Ordering::SeqCst);
    }

    pub fn fail_settlement(&self, fail: bool) {
        self.fail_settlement.store(fail, Ordering::SeqCst);
    }

    /// How many times `create_escrow` has been invoked.
    pub fn create_call_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Current state of a simulated escrow account.
    pub async fn escrow_state(&self, escrow_id: &str) -> Option<SimulatedEscrowState> {
        self.state.read().await.escrows.get(escrow_id).cloned()
    }
}

#[async_trait]
impl EscrowProvider for SimulatedEscrowProvider {
    async fn is_connected(&self) -> bool {
        self.state.read().await.wallet.is_some()
    }

    async fn connected_wallet(&self) -> Option<Wallet> {
        self.state.read().await.wallet.clone()
    }

    async fn connect_wallet(&self, kind: WalletKind) -> Result<Wallet, EscrowError> {
        let mut state = self.state.write().await;
        let wallet = Wallet {
            public_key: format!("sim-{}", Uuid::new_v4()),
            balance: 0.0,
            kind,
        };
        state.wallet = Some(wallet.clone());
        Ok(wallet)
    }

    async fn token_balance(
        &self,
        public_key: &str,
        token: WagerToken,
    ) -> Result<f64, EscrowError> {
        let state = self.state.read().await;
        Ok(state
            .balances
            .get(&(public_key.to_string(), token))
            .copied()
            .unwrap_or(0.0))
    }

    async fn create_escrow(&self, request: EscrowRequest) -> Result<EscrowAccount, EscrowError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_creation.load(Ordering::SeqCst) {
            return Err(EscrowError::Rejected("simulated creation failure".into()));
        }

        let escrow_id = format!("escrow-{}", Uuid::new_v4());
        let breakdown = EscrowBreakdown::for_wager(request.wager_amount, request.token);

        let mut state = self.state.write().await;
        state
            .escrows
            .insert(escrow_id.clone(), SimulatedEscrowState::Funded);

        info!(
            escrow_id = %escrow_id,
            challenger = %request.challenger,
            challengee = %request.challengee,
            amount = request.wager_amount,
            token = %request.token,
            "Created simulated escrow"
        );

        Ok(EscrowAccount {
            escrow_id,
            breakdown,
        })
    }

    async fn settle_escrow(
        &self,
        escrow_id: &str,
        recipient: &str,
        amount: f64,
    ) -> Result<(), EscrowError> {
        if self.fail_settlement.load(Ordering::SeqCst) {
            return Err(EscrowError::Provider("simulated settlement failure".into()));
        }
        let mut state = self.state.write().await;
        match state.escrows.get(escrow_id) {
            Some(SimulatedEscrowState::Funded) => {
                state.escrows.insert(
                    escrow_id.to_string(),
                    SimulatedEscrowState::Released {
                        recipient: recipient.to_string(),
                        amount,
                    },
                );
                Ok(())
            }
            Some(_) => Err(EscrowError::Rejected(format!(
                "escrow {} is not in a settleable state",
                escrow_id
            ))),
            None => Err(EscrowError::Rejected(format!(
                "unknown escrow {}",
                escrow_id
            ))),
        }
    }

    async fn freeze_escrow(&self, escrow_id: &str) -> Result<(), EscrowError> {
        let mut state = self.state.write().await;
        match state.escrows.get(escrow_id) {
            Some(SimulatedEscrowState::Funded) => {
                state
                    .escrows
                    .insert(escrow_id.to_string(), SimulatedEscrowState::Frozen);
                Ok(())
            }
            Some(_) => Err(EscrowError::Rejected(format!(
                "escrow {} cannot be frozen",
                escrow_id
            ))),
            None => Err(EscrowError::Rejected(format!(
                "unknown escrow {}",
                escrow_id
            ))),
        }
    }
}
