//! Bridge Orchestrator
//!
//! Submits a pool operation on its origin chain. Local operations wait for
//! inclusion under the inclusion timeout. Operations that emit a
//! cross-domain message hand the origin transaction straight to the
//! watcher, whose single deadline covers inclusion through settlement.
//! Failures after the origin committed are surfaced as they are; nothing
//! is rolled back or resubmitted.

use std::sync::Arc;

use borsh::BorshDeserialize;
use bridge_types::{
    Direction, FeeRates, Layer, MessageId, Receipt, StateQuery, Transaction, TxHash,
};
use pool_ledger::{PoolError, PoolInfo, PoolInstruction, UserInfo};
use solana_program::pubkey::Pubkey;
use xdomain_watcher::{decode_state, ClientError, WatchError};

use crate::{context::BridgeContext, error::BridgeError};

/// Both ends of a settled cross-domain operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub origin: Receipt,
    pub message_id: MessageId,
    pub destination: Receipt,
    pub direction: Direction,
}

/// Runs bridge operations for the account in its context
#[derive(Clone)]
pub struct BridgeOrchestrator {
    ctx: Arc<BridgeContext>,
}

impl BridgeOrchestrator {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.ctx
    }

    pub fn account(&self) -> Pubkey {
        self.ctx.account
    }

    /// Orchestrator for `account` sharing this one's clients and watcher
    pub fn for_account(&self, account: Pubkey) -> Self {
        Self::new(Arc::new(self.ctx.for_account(account)))
    }

    // ============ Local operations ============

    /// Pair `l1_token` with `l2_token` on the pool hosted by `layer`
    pub async fn register_pool(
        &self,
        layer: Layer,
        l1_token: Pubkey,
        l2_token: Pubkey,
    ) -> Result<Receipt, BridgeError> {
        self.submit(layer, PoolInstruction::RegisterPool { l1_token, l2_token })
            .await
    }

    pub async fn withdraw_reward(
        &self,
        layer: Layer,
        amount: u128,
        token: Pubkey,
        recipient: Pubkey,
    ) -> Result<Receipt, BridgeError> {
        self.submit(
            layer,
            PoolInstruction::WithdrawReward {
                amount,
                token,
                recipient,
            },
        )
        .await
    }

    pub async fn update_user_reward_per_share(
        &self,
        layer: Layer,
        token: Pubkey,
    ) -> Result<Receipt, BridgeError> {
        self.submit(layer, PoolInstruction::UpdateUserRewardPerShare { token })
            .await
    }

    pub async fn withdraw_owner_reward(
        &self,
        layer: Layer,
        amount: u128,
        token: Pubkey,
        recipient: Pubkey,
    ) -> Result<Receipt, BridgeError> {
        self.submit(
            layer,
            PoolInstruction::WithdrawOwnerReward {
                amount,
                token,
                recipient,
            },
        )
        .await
    }

    // ============ Cross-domain operations ============

    /// Stake on the pool hosted by `layer`; settles once the peer pool has
    /// recorded the new deposit total
    pub async fn add_liquidity(
        &self,
        layer: Layer,
        amount: u128,
        token: Pubkey,
    ) -> Result<Settlement, BridgeError> {
        self.settle(layer, PoolInstruction::AddLiquidity { amount, token })
            .await
    }

    /// Unstake from the pool hosted by `layer`
    pub async fn withdraw_liquidity(
        &self,
        layer: Layer,
        amount: u128,
        token: Pubkey,
        recipient: Pubkey,
    ) -> Result<Settlement, BridgeError> {
        self.settle(
            layer,
            PoolInstruction::WithdrawLiquidity {
                amount,
                token,
                recipient,
            },
        )
        .await
    }

    /// Deposit `amount` of `l2_token` on L2 and get paid on L1, less fees
    pub async fn fast_exit(&self, amount: u128, l2_token: Pubkey) -> Result<Settlement, BridgeError> {
        self.settle(
            Layer::L2,
            PoolInstruction::ClientDepositL2 {
                amount,
                token: l2_token,
            },
        )
        .await
    }

    /// Deposit `amount` of `l1_token` on L1 and get paid on L2, less fees
    pub async fn fast_onramp(
        &self,
        amount: u128,
        l1_token: Pubkey,
    ) -> Result<Settlement, BridgeError> {
        self.settle(
            Layer::L1,
            PoolInstruction::ClientDepositL1 {
                amount,
                token: l1_token,
            },
        )
        .await
    }

    // ============ Reads ============

    pub async fn pool_info(&self, layer: Layer, token: Pubkey) -> Result<Option<PoolInfo>, BridgeError> {
        self.read(layer, StateQuery::PoolInfo { token }).await
    }

    pub async fn user_info(
        &self,
        layer: Layer,
        token: Pubkey,
        user: Pubkey,
    ) -> Result<Option<UserInfo>, BridgeError> {
        self.read(layer, StateQuery::UserInfo { token, user }).await
    }

    /// Reward `user` could withdraw once resynced
    pub async fn pending_reward(
        &self,
        layer: Layer,
        token: Pubkey,
        user: Pubkey,
    ) -> Result<u128, BridgeError> {
        self.read(layer, StateQuery::PendingReward { token, user })
            .await?
            .ok_or(BridgeError::Ledger(PoolError::PoolNotRegistered))
    }

    pub async fn fee_rates(&self, layer: Layer) -> Result<FeeRates, BridgeError> {
        self.read(layer, StateQuery::FeeRates)
            .await?
            .ok_or_else(|| ClientError::Decode("ledger reported no fee rates".to_string()).into())
    }

    pub async fn total_fee_rate(&self, layer: Layer) -> Result<u128, BridgeError> {
        Ok(self.fee_rates(layer).await?.total())
    }

    pub async fn user_reward_fee_rate(&self, layer: Layer) -> Result<u128, BridgeError> {
        Ok(self.fee_rates(layer).await?.user_reward_fee_rate)
    }

    /// Balance the pool hosted by `layer` holds of `token`
    pub async fn pool_balance(&self, layer: Layer, token: Pubkey) -> Result<u128, BridgeError> {
        Ok(self
            .read(layer, StateQuery::PoolBalance { token })
            .await?
            .unwrap_or(0))
    }

    /// Deposit total the paired pool last reported for `token`
    pub async fn peer_deposit_amount(
        &self,
        layer: Layer,
        token: Pubkey,
    ) -> Result<Option<u128>, BridgeError> {
        self.read(layer, StateQuery::PeerDepositAmount { token })
            .await
    }

    pub async fn balance_of(
        &self,
        layer: Layer,
        token: Pubkey,
        account: Pubkey,
    ) -> Result<u128, BridgeError> {
        Ok(self.ctx.client(layer).balance_of(&token, &account).await?)
    }

    // ============ Plumbing ============

    /// Hand a transaction to the `layer` ledger without waiting for it
    async fn send(&self, layer: Layer, instruction: PoolInstruction) -> Result<TxHash, BridgeError> {
        let tx = Transaction::new(self.ctx.account, rand::random(), instruction.to_bytes());

        let tx_hash = self.ctx.client(layer).submit(tx).await.map_err(|e| match e {
            ClientError::Rejected(reason) => BridgeError::LedgerSubmissionFailed(reason),
            other => BridgeError::Client(other),
        })?;
        tracing::debug!("{} submitted {} for {}", layer, tx_hash, self.ctx.account);
        Ok(tx_hash)
    }

    /// Submit on `layer` and wait for inclusion; reverted receipts become errors
    async fn submit(&self, layer: Layer, instruction: PoolInstruction) -> Result<Receipt, BridgeError> {
        let tx_hash = self.send(layer, instruction).await?;

        let receipt = self
            .ctx
            .client(layer)
            .wait_for_inclusion(&tx_hash, self.ctx.inclusion_timeout, self.ctx.poll_interval)
            .await?
            .ok_or(BridgeError::InclusionTimeout(tx_hash))?;

        match receipt.error_code() {
            None => Ok(receipt),
            Some(code) => {
                let err = BridgeError::from_origin_code(code);
                tracing::debug!("{} transaction {} reverted: {}", layer, tx_hash, err);
                Err(err)
            }
        }
    }

    /// Submit on `layer`, then watch it from inclusion to its destination
    async fn settle(&self, layer: Layer, instruction: PoolInstruction) -> Result<Settlement, BridgeError> {
        let tx_hash = self.send(layer, instruction).await?;
        let direction = Direction::from_origin(layer);

        let report = match self.ctx.watcher.watch(tx_hash, direction).await {
            Ok(report) => report,
            Err(e @ WatchError::OriginFailed { .. }) => {
                let err = BridgeError::from(e);
                tracing::debug!("{} transaction {} reverted: {}", layer, tx_hash, err);
                return Err(err);
            }
            Err(e) => {
                tracing::warn!("Settlement of {} ({}) not observed: {}", tx_hash, direction, e);
                return Err(e.into());
            }
        };

        if let Some(code) = report.destination_receipt.error_code() {
            let err = BridgeError::from_destination_code(report.message_id, code);
            tracing::warn!("{} message {} failed: {}", direction, report.message_id, err);
            return Err(err);
        }

        tracing::info!(
            "{} settled: {} -> {} after {} relay polls",
            direction,
            tx_hash,
            report.destination_receipt.tx_hash,
            report.relay_polls
        );

        Ok(Settlement {
            origin: report.origin_receipt,
            message_id: report.message_id,
            destination: report.destination_receipt,
            direction,
        })
    }

    async fn read<T: BorshDeserialize>(
        &self,
        layer: Layer,
        query: StateQuery,
    ) -> Result<Option<T>, BridgeError> {
        match self.ctx.client(layer).read_state(&query).await? {
            Some(bytes) => Ok(Some(decode_state(&bytes)?)),
            None => Ok(None),
        }
    }
}
