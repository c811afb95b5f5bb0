//! Financial terms for wagered challenges
//!
//! This is the single code path computing pot, fee, and payout. UI previews
//! and persisted acceptance figures both come from here, so the numbers can
//! never drift between what was shown and what was committed.

use serde::{Deserialize, Serialize};

use crate::model::WagerToken;

/// Flat platform fee taken from the pot at settlement.
pub const PLATFORM_FEE_RATE: f64 = 0.025;

impl WagerToken {
    /// Fixed bonus multiplier applied to the pot for this token.
    pub fn bonus_multiplier(self) -> f64 {
        match self {
            WagerToken::Sol => 1.10,
            WagerToken::Bonk => 1.25,
            WagerToken::Usdc => 1.00,
        }
    }
}

/// Derived financial terms of an escrow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowBreakdown {
    pub wager_amount: f64,
    pub token: WagerToken,
    /// Both deposits with the token bonus applied
    pub total_pot: f64,
    pub platform_fee: f64,
    pub winner_payout: f64,
}

impl EscrowBreakdown {
    /// Compute the breakdown for a per-party wager in the given token.
    pub fn for_wager(wager_amount: f64, token: WagerToken) -> Self {
        let total_pot = wager_amount * 2.0 * token.bonus_multiplier();
        let platform_fee = total_pot * PLATFORM_FEE_RATE;
        let winner_payout = total_pot - platform_fee;
        Self {
            wager_amount,
            token,
            total_pot,
            platform_fee,
            winner_payout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sol_breakdown() {
        let b = EscrowBreakdown::for_wager(10.0, WagerToken::Sol);
        assert!(close(b.total_pot, 22.0));
        assert!(close(b.platform_fee, 0.55));
        assert!(close(b.winner_payout, 21.45));
    }

    #[test]
    fn test_usdc_breakdown() {
        let b = EscrowBreakdown::for_wager(10.0, WagerToken::Usdc);
        assert!(close(b.total_pot, 20.0));
        assert!(close(b.platform_fee, 0.5));
        assert!(close(b.winner_payout, 19.5));
    }

    #[test]
    fn test_bonk_breakdown() {
        let b = EscrowBreakdown::for_wager(100.0, WagerToken::Bonk);
        assert!(close(b.total_pot, 250.0));
        assert!(close(b.platform_fee, 6.25));
        assert!(close(b.winner_payout, 243.75));
    }

    #[test]
    fn test_invariants_hold_for_every_token() {
        for token in [WagerToken::Sol, WagerToken::Usdc, WagerToken::Bonk] {
            for amount in [0.5, 1.0, 10.0, 333.33] {
                let b = EscrowBreakdown::for_wager(amount, token);
                assert!(close(b.total_pot, 2.0 * amount * token.bonus_multiplier()));
                assert!(close(b.platform_fee, b.total_pot * PLATFORM_FEE_RATE));
                assert!(close(b.winner_payout, b.total_pot - b.platform_fee));
            }
        }
    }
}
