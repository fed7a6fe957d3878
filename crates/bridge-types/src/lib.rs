//! Shared types for the L1/L2 fast-liquidity bridge
//!
//! This crate holds the wire-level vocabulary every other crate speaks:
//! which chain a pool lives on, which way a cross-domain message travels,
//! and the fixed-point constants the reward accounting depends on.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;

pub mod tx;

pub use tx::{MessageId, OutboundMessage, Receipt, StateQuery, Transaction, TxHash, TxStatus};

/// Fixed-point scale applied to `accUserRewardPerShare`
pub const REWARD_PER_SHARE_SCALE: u128 = 1_000_000_000_000;

/// Fee rates are expressed in parts per thousand
pub const FEE_RATE_DENOMINATOR: u128 = 1_000;

/// Default depositor share of a fast-exit/onramp fee (3.5%)
pub const DEFAULT_USER_REWARD_FEE_RATE: u128 = 35;

/// Default operator share of a fast-exit/onramp fee (1.5%)
pub const DEFAULT_OWNER_REWARD_FEE_RATE: u128 = 15;

/// Sentinel token address standing in for the chain's native asset
pub const NATIVE_TOKEN: Pubkey = Pubkey::new_from_array([0u8; 32]);

/// Which ledger a component lives on
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
)]
pub enum Layer {
    /// Base chain
    L1,
    /// Rollup
    L2,
}

impl Layer {
    /// The other ledger
    pub fn peer(self) -> Layer {
        match self {
            Layer::L1 => Layer::L2,
            Layer::L2 => Layer::L1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Layer::L1 => "L1",
            Layer::L2 => "L2",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a cross-domain message
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash,
)]
pub enum Direction {
    /// Submitted on L1, settles on L2 (deposits, fast onramp)
    L1ToL2,
    /// Submitted on L2, settles on L1 (exits, fast exit, liquidity sync)
    L2ToL1,
}

impl Direction {
    /// Direction of a message emitted by a transaction on `layer`
    pub fn from_origin(layer: Layer) -> Self {
        match layer {
            Layer::L1 => Direction::L1ToL2,
            Layer::L2 => Direction::L2ToL1,
        }
    }

    pub fn origin(self) -> Layer {
        match self {
            Direction::L1ToL2 => Layer::L1,
            Direction::L2ToL1 => Layer::L2,
        }
    }

    pub fn destination(self) -> Layer {
        self.origin().peer()
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.origin(), self.destination())
    }
}

/// Fee split configured on a pool at initialization
#[derive(
    BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
)]
pub struct FeeRates {
    /// Parts per thousand credited to depositors
    pub user_reward_fee_rate: u128,
    /// Parts per thousand credited to the pool operator
    pub owner_reward_fee_rate: u128,
}

impl FeeRates {
    /// Combined rate, saturating at `u128::MAX`
    pub fn total(&self) -> u128 {
        self.user_reward_fee_rate
            .saturating_add(self.owner_reward_fee_rate)
    }
}

impl Default for FeeRates {
    fn default() -> Self {
        Self {
            user_reward_fee_rate: DEFAULT_USER_REWARD_FEE_RATE,
            owner_reward_fee_rate: DEFAULT_OWNER_REWARD_FEE_RATE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_layers() {
        assert_eq!(Direction::L2ToL1.origin(), Layer::L2);
        assert_eq!(Direction::L2ToL1.destination(), Layer::L1);
        assert_eq!(Direction::from_origin(Layer::L1), Direction::L1ToL2);
        assert_eq!(Direction::L1ToL2.to_string(), "L1->L2");
    }

    #[test]
    fn test_default_fee_rates() {
        let rates = FeeRates::default();
        assert_eq!(rates.total(), 50);
        let huge = FeeRates {
            user_reward_fee_rate: u128::MAX,
            owner_reward_fee_rate: 7,
        };
        assert_eq!(huge.total(), u128::MAX);
        assert_eq!(NATIVE_TOKEN, Pubkey::default());
    }
}
