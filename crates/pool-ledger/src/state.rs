//! Pool Ledger State
//!
//! Per-token pool records and per-user stake records, plus the
//! reward-per-share arithmetic that ties them together.

use borsh::{BorshDeserialize, BorshSerialize};
use bridge_types::{FeeRates, Layer, FEE_RATE_DENOMINATOR, REWARD_PER_SHARE_SCALE};
use solana_program::pubkey::Pubkey;

use ethnum::U256;

use crate::error::PoolError;

/// `a * b / denominator` with a 256-bit intermediate product
///
/// Fails only when the quotient itself does not fit in a `u128`.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Result<u128, PoolError> {
    if denominator == 0 {
        return Err(PoolError::ArithmeticOverflow);
    }
    let (high, low) = (U256::from(a) * U256::from(b) / U256::from(denominator)).into_words();
    if high != 0 {
        return Err(PoolError::ArithmeticOverflow);
    }
    Ok(low)
}

/// Pool record - one per registered token per chain
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolInfo {
    /// Token identity on L1 (zero for the native asset)
    pub l1_token_address: Pubkey,
    /// Token identity on L2 (zero for the native asset)
    pub l2_token_address: Pubkey,
    /// Sum of all active user deposits
    pub user_deposit_amount: u128,
    /// Fees accrued to depositors
    pub acc_user_reward: u128,
    /// Fees accrued to the operator
    pub acc_owner_reward: u128,
    /// `acc_user_reward` as of the last reward-per-share update
    pub last_acc_user_reward: u128,
    /// Cumulative reward per deposited unit, scaled by 1e12
    pub acc_user_reward_per_share: u128,
    /// Per-share increment of the most recent update only
    pub latest_user_reward_per_share: u128,
    /// Slot the pool was registered at
    pub start_time: u64,
}

impl PoolInfo {
    pub fn new(l1_token_address: Pubkey, l2_token_address: Pubkey, start_time: u64) -> Self {
        Self {
            l1_token_address,
            l2_token_address,
            start_time,
            ..Default::default()
        }
    }

    /// Token held by the pool on `layer`
    pub fn local_token(&self, layer: Layer) -> Pubkey {
        match layer {
            Layer::L1 => self.l1_token_address,
            Layer::L2 => self.l2_token_address,
        }
    }

    /// Token the paired pool on the other chain pays out
    pub fn paired_token(&self, layer: Layer) -> Pubkey {
        self.local_token(layer.peer())
    }

    /// Reward owed to `amount` of stake at the current per-share rate
    pub fn accrued_for(&self, amount: u128) -> Result<u128, PoolError> {
        mul_div(amount, self.acc_user_reward_per_share, REWARD_PER_SHARE_SCALE)
    }

    /// Fold the rewards accrued since the last update into the per-share rate
    ///
    /// With no deposits the rate is left alone but the snapshot still
    /// advances, so that batch is never credited per share.
    pub fn update_user_reward_per_share(&mut self) -> Result<(), PoolError> {
        let delta = self
            .acc_user_reward
            .checked_sub(self.last_acc_user_reward)
            .ok_or(PoolError::ArithmeticOverflow)?;

        if self.user_deposit_amount > 0 {
            let increment = mul_div(delta, REWARD_PER_SHARE_SCALE, self.user_deposit_amount)?;
            self.acc_user_reward_per_share = self
                .acc_user_reward_per_share
                .checked_add(increment)
                .ok_or(PoolError::ArithmeticOverflow)?;
            self.latest_user_reward_per_share = increment;
        }

        self.last_acc_user_reward = self.acc_user_reward;
        Ok(())
    }
}

/// A user's stake in one pool
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UserInfo {
    /// Currently staked deposit
    pub amount: u128,
    /// Share of `acc_user_reward_per_share` already credited against `amount`
    pub reward_debt: u128,
    /// Reward accrued but not yet withdrawn
    pub pending_reward: u128,
}

impl UserInfo {
    /// Reward earned since the last sync, not yet moved into `pending_reward`
    pub fn unsynced_reward(&self, pool: &PoolInfo) -> Result<u128, PoolError> {
        pool.accrued_for(self.amount)?
            .checked_sub(self.reward_debt)
            .ok_or(PoolError::ArithmeticOverflow)
    }

    /// Everything the user could withdraw right now
    pub fn harvestable_reward(&self, pool: &PoolInfo) -> Result<u128, PoolError> {
        self.pending_reward
            .checked_add(self.unsynced_reward(pool)?)
            .ok_or(PoolError::ArithmeticOverflow)
    }

    /// The record after syncing rewards and moving the stake to `new_amount`
    pub fn resynced(&self, pool: &PoolInfo, new_amount: u128) -> Result<UserInfo, PoolError> {
        let pending_reward = self
            .pending_reward
            .checked_add(self.unsynced_reward(pool)?)
            .ok_or(PoolError::ArithmeticOverflow)?;

        Ok(UserInfo {
            amount: new_amount,
            reward_debt: pool.accrued_for(new_amount)?,
            pending_reward,
        })
    }
}

/// How a fast exit/onramp deposit is divided
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeSplit {
    pub owner_fee: u128,
    pub user_fee: u128,
    /// Paid out by the paired pool
    pub net_amount: u128,
}

impl FeeSplit {
    pub fn compute(amount: u128, rates: &FeeRates) -> Result<Self, PoolError> {
        let owner_fee = mul_div(amount, rates.owner_reward_fee_rate, FEE_RATE_DENOMINATOR)?;
        let user_fee = mul_div(amount, rates.user_reward_fee_rate, FEE_RATE_DENOMINATOR)?;
        let net_amount = amount
            .checked_sub(owner_fee)
            .and_then(|rest| rest.checked_sub(user_fee))
            .ok_or(PoolError::ArithmeticOverflow)?;

        Ok(Self {
            owner_fee,
            user_fee,
            net_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETHER: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn test_fee_split_is_floor_exact() {
        let split = FeeSplit::compute(10 * ETHER, &FeeRates::default()).unwrap();
        assert_eq!(split.user_fee, 10 * ETHER * 35 / 1000);
        assert_eq!(split.owner_fee, 10 * ETHER * 15 / 1000);
        assert_eq!(split.net_amount, 9_500_000_000_000_000_000);

        // 999 * 35 / 1000 = 34.965 -> 34, 999 * 15 / 1000 = 14.985 -> 14
        let split = FeeSplit::compute(999, &FeeRates::default()).unwrap();
        assert_eq!(split.user_fee, 34);
        assert_eq!(split.owner_fee, 14);
        assert_eq!(split.net_amount, 951);
    }

    #[test]
    fn test_update_is_idempotent_without_accrual() {
        let mut pool = PoolInfo::new(Pubkey::new_unique(), Pubkey::new_unique(), 0);
        pool.user_deposit_amount = 200;
        pool.acc_user_reward = 7;

        pool.update_user_reward_per_share().unwrap();
        let after_first = pool.clone();
        assert_eq!(after_first.acc_user_reward_per_share, 7 * REWARD_PER_SHARE_SCALE / 200);

        pool.update_user_reward_per_share().unwrap();
        assert_eq!(pool.acc_user_reward_per_share, after_first.acc_user_reward_per_share);
        assert_eq!(pool.latest_user_reward_per_share, after_first.latest_user_reward_per_share);
    }

    #[test]
    fn test_update_with_no_deposits_advances_snapshot_only() {
        let mut pool = PoolInfo::new(Pubkey::new_unique(), Pubkey::new_unique(), 0);
        pool.acc_user_reward = 500;

        pool.update_user_reward_per_share().unwrap();

        assert_eq!(pool.acc_user_reward_per_share, 0);
        assert_eq!(pool.latest_user_reward_per_share, 0);
        assert_eq!(pool.last_acc_user_reward, 500);
    }

    #[test]
    fn test_resync_moves_unsynced_reward_into_pending() {
        let mut pool = PoolInfo::new(Pubkey::new_unique(), Pubkey::new_unique(), 0);
        let delta = 3 * REWARD_PER_SHARE_SCALE;
        pool.acc_user_reward_per_share = delta;

        let user = UserInfo {
            amount: 100,
            reward_debt: 0,
            pending_reward: 0,
        };
        assert_eq!(user.harvestable_reward(&pool).unwrap(), 300);

        let next = user.resynced(&pool, 150).unwrap();
        assert_eq!(next.pending_reward, 100 * delta / REWARD_PER_SHARE_SCALE);
        assert_eq!(next.reward_debt, 150 * delta / REWARD_PER_SHARE_SCALE);
        assert_eq!(next.unsynced_reward(&pool).unwrap(), 0);
    }

    #[test]
    fn test_mul_div_keeps_wide_products() {
        assert_eq!(mul_div(u128::MAX, 2, 4).unwrap(), u128::MAX / 2);
        assert_eq!(mul_div(7, 3, 2).unwrap(), 10);
        assert_eq!(mul_div(u128::MAX, 2, 1), Err(PoolError::ArithmeticOverflow));
        assert_eq!(mul_div(1, 1, 0), Err(PoolError::ArithmeticOverflow));
    }

    #[test]
    fn test_tiny_deposit_then_large_accrual_still_syncs() {
        let mut pool = PoolInfo::new(Pubkey::new_unique(), Pubkey::new_unique(), 0);
        pool.user_deposit_amount = 1;
        // User fee of a 1000 ETHER fast exit
        pool.acc_user_reward = 35 * ETHER;

        pool.update_user_reward_per_share().unwrap();
        assert_eq!(pool.acc_user_reward_per_share, 35 * ETHER * REWARD_PER_SHARE_SCALE);

        // A normal-sized stake joining afterwards
        let newcomer = UserInfo::default().resynced(&pool, ETHER).unwrap();
        assert_eq!(newcomer.reward_debt, 35 * ETHER * ETHER);
        assert_eq!(newcomer.unsynced_reward(&pool).unwrap(), 0);

        let dust = UserInfo {
            amount: 1,
            ..Default::default()
        };
        assert_eq!(dust.harvestable_reward(&pool).unwrap(), 35 * ETHER);
    }
}
