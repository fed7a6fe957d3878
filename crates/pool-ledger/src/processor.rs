//! Pool Ledger Processor
//!
//! Executes pool instructions against per-token records. Each registered
//! token sits behind its own mutex, so a synchronize-then-mutate sequence
//! never interleaves with another mutation of the same pool even when the
//! hosting ledger does not serialize transactions for us.

use std::{collections::HashMap, sync::Arc};

use borsh::{BorshDeserialize, BorshSerialize};
use bridge_types::{FeeRates, Layer, OutboundMessage, StateQuery, FEE_RATE_DENOMINATOR};
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use solana_program::pubkey::Pubkey;

use crate::{
    error::PoolError,
    instruction::{CrossDomainCall, PoolInstruction},
    state::{FeeSplit, PoolInfo, UserInfo},
    token::TokenLedger,
};

/// Immutable pool configuration, fixed at initialization
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Chain hosting this pool
    pub layer: Layer,
    /// Address holding the pool's token balances
    pub address: Pubkey,
    /// Operator allowed to register tokens and withdraw owner fees
    pub owner: Pubkey,
    /// Cross-domain messenger allowed to deliver relayed calls
    pub messenger: Pubkey,
    /// Paired pool on the other chain
    pub peer_pool: Pubkey,
    pub fee_rates: FeeRates,
}

/// Everything recorded for one registered token
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenPool {
    pub info: PoolInfo,
    pub users: HashMap<Pubkey, UserInfo>,
    /// Deposit total last reported by the paired pool
    pub peer_deposit_amount: u128,
}

/// Outcome of a fast exit / fast onramp deposit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientDeposit {
    pub split: FeeSplit,
    /// Instructs the paired pool to pay `split.net_amount`
    pub message: OutboundMessage,
}

/// Liquidity pool for one chain
pub struct LiquidityPool {
    config: PoolConfig,
    tokens: Arc<dyn TokenLedger>,
    pools: DashMap<Pubkey, Arc<Mutex<TokenPool>>>,
}

impl LiquidityPool {
    /// Create a pool; rejects fee rates summing above 100%
    pub fn new(config: PoolConfig, tokens: Arc<dyn TokenLedger>) -> Result<Self, PoolError> {
        if config.fee_rates.total() > FEE_RATE_DENOMINATOR {
            return Err(PoolError::InvalidFeeRate);
        }

        Ok(Self {
            config,
            tokens,
            pools: DashMap::new(),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn layer(&self) -> Layer {
        self.config.layer
    }

    pub fn address(&self) -> Pubkey {
        self.config.address
    }

    /// Token ledger the pool settles against
    pub fn token_ledger(&self) -> &Arc<dyn TokenLedger> {
        &self.tokens
    }

    fn token_pool(&self, token: &Pubkey) -> Result<Arc<Mutex<TokenPool>>, PoolError> {
        self.pools
            .get(token)
            .map(|r| r.value().clone())
            .ok_or(PoolError::PoolNotRegistered)
    }

    fn message(&self, call: CrossDomainCall) -> OutboundMessage {
        OutboundMessage {
            sender: self.config.address,
            target: self.config.peer_pool,
            data: call.to_bytes(),
        }
    }

    fn sync_message(&self, info: &PoolInfo) -> OutboundMessage {
        self.message(CrossDomainCall::SyncLiquidity {
            token: info.paired_token(self.config.layer),
            user_deposit_amount: info.user_deposit_amount,
        })
    }

    // ============ Mutations ============

    /// Pair `l1_token` with `l2_token`, keyed by the token local to this chain
    pub fn register_pool(
        &self,
        caller: &Pubkey,
        l1_token: Pubkey,
        l2_token: Pubkey,
        slot: u64,
    ) -> Result<PoolInfo, PoolError> {
        if *caller != self.config.owner {
            return Err(PoolError::Unauthorized);
        }

        let info = PoolInfo::new(l1_token, l2_token, slot);
        match self.pools.entry(info.local_token(self.config.layer)) {
            Entry::Occupied(_) => Err(PoolError::AlreadyRegistered),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Mutex::new(TokenPool {
                    info: info.clone(),
                    ..Default::default()
                })));
                tracing::info!(
                    "{} pool registered {} <-> {}",
                    self.config.layer,
                    l1_token,
                    l2_token
                );
                Ok(info)
            }
        }
    }

    /// Stake `amount` of `token`, syncing the caller's reward first
    pub fn add_liquidity(
        &self,
        caller: &Pubkey,
        amount: u128,
        token: &Pubkey,
    ) -> Result<OutboundMessage, PoolError> {
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }

        let entry = self.token_pool(token)?;
        let mut pool = entry.lock();

        let user = pool.users.get(caller).cloned().unwrap_or_default();
        let new_amount = user
            .amount
            .checked_add(amount)
            .ok_or(PoolError::ArithmeticOverflow)?;
        let next_user = user.resynced(&pool.info, new_amount)?;
        let deposit_total = pool
            .info
            .user_deposit_amount
            .checked_add(amount)
            .ok_or(PoolError::ArithmeticOverflow)?;

        self.tokens
            .transfer(token, caller, &self.config.address, amount)?;

        pool.info.user_deposit_amount = deposit_total;
        pool.users.insert(*caller, next_user);

        tracing::debug!("addLiquidity: {} staked {} of {}", caller, amount, token);
        Ok(self.sync_message(&pool.info))
    }

    /// Unstake `amount` of `token` and send it to `recipient`
    pub fn withdraw_liquidity(
        &self,
        caller: &Pubkey,
        amount: u128,
        token: &Pubkey,
        recipient: &Pubkey,
    ) -> Result<OutboundMessage, PoolError> {
        let entry = self.token_pool(token)?;
        let mut pool = entry.lock();

        let Some(user) = pool.users.get(caller).cloned() else {
            if amount > 0 {
                return Err(PoolError::InsufficientStake);
            }
            return Ok(self.sync_message(&pool.info));
        };
        if amount > user.amount {
            return Err(PoolError::InsufficientStake);
        }

        let next_user = user.resynced(&pool.info, user.amount - amount)?;
        let deposit_total = pool
            .info
            .user_deposit_amount
            .checked_sub(amount)
            .ok_or(PoolError::ArithmeticOverflow)?;

        self.tokens
            .transfer(token, &self.config.address, recipient, amount)
            .map_err(|_| PoolError::InsufficientPoolLiquidity)?;

        pool.info.user_deposit_amount = deposit_total;
        pool.users.insert(*caller, next_user);

        tracing::debug!(
            "withdrawLiquidity: {} unstaked {} of {} to {}",
            caller,
            amount,
            token,
            recipient
        );
        Ok(self.sync_message(&pool.info))
    }

    /// Withdraw `amount` of pending reward; leaves `reward_debt` untouched
    pub fn withdraw_reward(
        &self,
        caller: &Pubkey,
        amount: u128,
        token: &Pubkey,
        recipient: &Pubkey,
    ) -> Result<(), PoolError> {
        let entry = self.token_pool(token)?;
        let mut pool = entry.lock();

        let pending = pool.users.get(caller).map(|u| u.pending_reward).unwrap_or(0);
        if amount > pending {
            return Err(PoolError::InsufficientReward);
        }

        self.tokens
            .transfer(token, &self.config.address, recipient, amount)
            .map_err(|_| PoolError::InsufficientPoolLiquidity)?;

        if let Some(user) = pool.users.get_mut(caller) {
            user.pending_reward = pending - amount;
        }

        tracing::debug!("withdrawReward: {} took {} of {}", caller, amount, token);
        Ok(())
    }

    /// Fast onramp on the L1 pool
    pub fn client_deposit_l1(
        &self,
        caller: &Pubkey,
        amount: u128,
        token: &Pubkey,
    ) -> Result<ClientDeposit, PoolError> {
        self.client_deposit(Layer::L1, caller, amount, token)
    }

    /// Fast exit on the L2 pool
    pub fn client_deposit_l2(
        &self,
        caller: &Pubkey,
        amount: u128,
        token: &Pubkey,
    ) -> Result<ClientDeposit, PoolError> {
        self.client_deposit(Layer::L2, caller, amount, token)
    }

    fn client_deposit(
        &self,
        expected_layer: Layer,
        caller: &Pubkey,
        amount: u128,
        token: &Pubkey,
    ) -> Result<ClientDeposit, PoolError> {
        if self.config.layer != expected_layer {
            return Err(PoolError::WrongLayer);
        }
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }

        let entry = self.token_pool(token)?;
        let mut pool = entry.lock();

        let split = FeeSplit::compute(amount, &self.config.fee_rates)?;
        let acc_owner_reward = pool
            .info
            .acc_owner_reward
            .checked_add(split.owner_fee)
            .ok_or(PoolError::ArithmeticOverflow)?;
        let acc_user_reward = pool
            .info
            .acc_user_reward
            .checked_add(split.user_fee)
            .ok_or(PoolError::ArithmeticOverflow)?;

        self.tokens
            .transfer(token, caller, &self.config.address, amount)?;

        pool.info.acc_owner_reward = acc_owner_reward;
        pool.info.acc_user_reward = acc_user_reward;

        let message = self.message(CrossDomainCall::ClientPay {
            to: *caller,
            amount: split.net_amount,
            token: pool.info.paired_token(self.config.layer),
        });

        tracing::debug!(
            "clientDeposit{}: {} deposited {} of {} (user fee {}, owner fee {}, net {})",
            self.config.layer,
            caller,
            amount,
            token,
            split.user_fee,
            split.owner_fee,
            split.net_amount
        );
        Ok(ClientDeposit { split, message })
    }

    /// Fold fees accrued since the last update into the per-share rate
    pub fn update_user_reward_per_share(&self, token: &Pubkey) -> Result<PoolInfo, PoolError> {
        let entry = self.token_pool(token)?;
        let mut pool = entry.lock();

        let mut info = pool.info.clone();
        info.update_user_reward_per_share()?;
        pool.info = info.clone();

        Ok(info)
    }

    /// Withdraw operator fees (owner only)
    pub fn withdraw_owner_reward(
        &self,
        caller: &Pubkey,
        amount: u128,
        token: &Pubkey,
        recipient: &Pubkey,
    ) -> Result<(), PoolError> {
        if *caller != self.config.owner {
            return Err(PoolError::Unauthorized);
        }

        let entry = self.token_pool(token)?;
        let mut pool = entry.lock();

        if amount > pool.info.acc_owner_reward {
            return Err(PoolError::InsufficientReward);
        }

        self.tokens
            .transfer(token, &self.config.address, recipient, amount)
            .map_err(|_| PoolError::InsufficientPoolLiquidity)?;
        pool.info.acc_owner_reward -= amount;

        Ok(())
    }

    /// Execute a call relayed from the paired pool
    pub fn relay_message(
        &self,
        sender: &Pubkey,
        xdomain_sender: &Pubkey,
        call: CrossDomainCall,
    ) -> Result<(), PoolError> {
        if *sender != self.config.messenger || *xdomain_sender != self.config.peer_pool {
            return Err(PoolError::Unauthorized);
        }

        match call {
            CrossDomainCall::ClientPay { to, amount, token } => self.client_pay(&to, amount, &token),
            CrossDomainCall::SyncLiquidity {
                token,
                user_deposit_amount,
            } => {
                let entry = self.token_pool(&token)?;
                entry.lock().peer_deposit_amount = user_deposit_amount;
                Ok(())
            }
        }
    }

    fn client_pay(&self, to: &Pubkey, amount: u128, token: &Pubkey) -> Result<(), PoolError> {
        let entry = self.token_pool(token)?;
        let _pool = entry.lock();

        if self.pool_balance(token) < amount {
            tracing::warn!(
                "{} pool cannot pay {} of {} to {}",
                self.config.layer,
                amount,
                token,
                to
            );
            return Err(PoolError::InsufficientPoolLiquidity);
        }

        self.tokens
            .transfer(token, &self.config.address, to, amount)
            .map_err(|_| PoolError::InsufficientPoolLiquidity)?;

        tracing::debug!("clientPay{}: paid {} of {} to {}", self.config.layer, amount, token, to);
        Ok(())
    }

    /// Decode and execute one instruction sent by `sender`
    ///
    /// Returns the cross-domain messages the instruction emitted.
    pub fn process(
        &self,
        sender: &Pubkey,
        instruction_data: &[u8],
        slot: u64,
    ) -> Result<Vec<OutboundMessage>, PoolError> {
        let instruction = PoolInstruction::from_bytes(instruction_data)
            .map_err(|_| PoolError::InvalidInstructionData)?;

        match instruction {
            PoolInstruction::RegisterPool { l1_token, l2_token } => {
                self.register_pool(sender, l1_token, l2_token, slot)?;
                Ok(Vec::new())
            }

            PoolInstruction::AddLiquidity { amount, token } => {
                Ok(vec![self.add_liquidity(sender, amount, &token)?])
            }

            PoolInstruction::WithdrawLiquidity {
                amount,
                token,
                recipient,
            } => Ok(vec![self.withdraw_liquidity(sender, amount, &token, &recipient)?]),

            PoolInstruction::WithdrawReward {
                amount,
                token,
                recipient,
            } => {
                self.withdraw_reward(sender, amount, &token, &recipient)?;
                Ok(Vec::new())
            }

            PoolInstruction::ClientDepositL1 { amount, token } => {
                Ok(vec![self.client_deposit_l1(sender, amount, &token)?.message])
            }

            PoolInstruction::ClientDepositL2 { amount, token } => {
                Ok(vec![self.client_deposit_l2(sender, amount, &token)?.message])
            }

            PoolInstruction::UpdateUserRewardPerShare { token } => {
                self.update_user_reward_per_share(&token)?;
                Ok(Vec::new())
            }

            PoolInstruction::WithdrawOwnerReward {
                amount,
                token,
                recipient,
            } => {
                self.withdraw_owner_reward(sender, amount, &token, &recipient)?;
                Ok(Vec::new())
            }

            PoolInstruction::RelayMessage {
                message_id,
                xdomain_sender,
                call,
            } => {
                tracing::debug!("{} pool executing message {}", self.config.layer, message_id);
                self.relay_message(sender, &xdomain_sender, call)?;
                Ok(Vec::new())
            }
        }
    }

    // ============ Reads ============

    pub fn pool_info(&self, token: &Pubkey) -> Option<PoolInfo> {
        self.pools.get(token).map(|r| r.value().lock().info.clone())
    }

    pub fn user_info(&self, token: &Pubkey, user: &Pubkey) -> Option<UserInfo> {
        self.pools
            .get(token)
            .and_then(|r| r.value().lock().users.get(user).cloned())
    }

    /// Reward the user could withdraw after a sync at the current rate
    pub fn pending_reward(&self, token: &Pubkey, user: &Pubkey) -> Result<u128, PoolError> {
        let entry = self.token_pool(token)?;
        let pool = entry.lock();
        match pool.users.get(user) {
            Some(info) => info.harvestable_reward(&pool.info),
            None => Ok(0),
        }
    }

    pub fn peer_deposit_amount(&self, token: &Pubkey) -> Option<u128> {
        self.pools
            .get(token)
            .map(|r| r.value().lock().peer_deposit_amount)
    }

    /// Balance of `token` held by the pool
    pub fn pool_balance(&self, token: &Pubkey) -> u128 {
        self.tokens.balance_of(token, &self.config.address)
    }

    pub fn fee_rates(&self) -> FeeRates {
        self.config.fee_rates
    }

    pub fn total_fee_rate(&self) -> u128 {
        self.config.fee_rates.total()
    }

    pub fn user_reward_fee_rate(&self) -> u128 {
        self.config.fee_rates.user_reward_fee_rate
    }

    pub fn owner_reward_fee_rate(&self) -> u128 {
        self.config.fee_rates.owner_reward_fee_rate
    }

    pub fn registered_tokens(&self) -> Vec<Pubkey> {
        self.pools.iter().map(|r| *r.key()).collect()
    }

    /// Answer a `readState` query with Borsh-encoded bytes
    pub fn query(&self, query: &StateQuery) -> Result<Option<Vec<u8>>, PoolError> {
        let encoded = match query {
            StateQuery::PoolInfo { token } => self.pool_info(token).map(|i| encode(&i)),
            StateQuery::UserInfo { token, user } => self.user_info(token, user).map(|i| encode(&i)),
            StateQuery::PendingReward { token, user } => match self.pending_reward(token, user) {
                Ok(amount) => Some(encode(&amount)),
                Err(PoolError::PoolNotRegistered) => None,
                Err(e) => return Err(e),
            },
            StateQuery::FeeRates => Some(encode(&self.config.fee_rates)),
            StateQuery::PoolBalance { token } => Some(encode(&self.pool_balance(token))),
            StateQuery::PeerDepositAmount { token } => {
                self.peer_deposit_amount(token).map(|a| encode(&a))
            }
        };
        Ok(encoded)
    }

    // ============ Snapshots ============

    /// Copy of every token record
    pub fn snapshot(&self) -> Vec<TokenPool> {
        self.pools
            .iter()
            .map(|r| r.value().lock().clone())
            .collect()
    }

    /// Load a record verbatim, replacing any existing one for the same token
    pub fn restore(&self, record: TokenPool) {
        let key = record.info.local_token(self.config.layer);
        self.pools.insert(key, Arc::new(Mutex::new(record)));
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

fn encode<T: BorshSerialize>(value: &T) -> Vec<u8> {
    borsh::to_vec(value).expect("pool state serialization should not fail")
}
