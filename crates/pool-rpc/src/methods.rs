//! RPC Methods - JSON-RPC method handlers
//!
//! Read-only view of one chain's pool. Amounts are `u128` and are returned
//! as decimal strings so JSON clients never lose precision.

use chain_runtime::ChainState;
use pool_ledger::{PoolError, PoolInfo, UserInfo};
use serde::{Deserialize, Serialize};
use solana_program::{clock::Slot, pubkey::Pubkey};
use std::str::FromStr;

/// RPC context shared across handlers
pub struct RpcContext {
    pub chain: ChainState,
}

impl RpcContext {
    pub fn new(chain: ChainState) -> Self {
        Self { chain }
    }
}

// ============ Request/Response Types ============

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseContext {
    pub slot: Slot,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInfoValue {
    pub l1_token_address: String,
    pub l2_token_address: String,
    pub user_deposit_amount: String,
    pub acc_user_reward: String,
    pub acc_owner_reward: String,
    pub last_acc_user_reward: String,
    pub acc_user_reward_per_share: String,
    pub latest_user_reward_per_share: String,
    pub start_time: u64,
}

impl From<PoolInfo> for PoolInfoValue {
    fn from(info: PoolInfo) -> Self {
        Self {
            l1_token_address: info.l1_token_address.to_string(),
            l2_token_address: info.l2_token_address.to_string(),
            user_deposit_amount: info.user_deposit_amount.to_string(),
            acc_user_reward: info.acc_user_reward.to_string(),
            acc_owner_reward: info.acc_owner_reward.to_string(),
            last_acc_user_reward: info.last_acc_user_reward.to_string(),
            acc_user_reward_per_share: info.acc_user_reward_per_share.to_string(),
            latest_user_reward_per_share: info.latest_user_reward_per_share.to_string(),
            start_time: info.start_time,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoValue {
    pub amount: String,
    pub reward_debt: String,
    pub pending_reward: String,
}

impl From<UserInfo> for UserInfoValue {
    fn from(info: UserInfo) -> Self {
        Self {
            amount: info.amount.to_string(),
            reward_debt: info.reward_debt.to_string(),
            pending_reward: info.pending_reward.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetPoolInfoResponse {
    pub context: ResponseContext,
    pub value: Option<PoolInfoValue>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetUserInfoResponse {
    pub context: ResponseContext,
    pub value: Option<UserInfoValue>,
}

// ============ RPC Handlers ============

pub fn parse_pubkey(value: &str) -> Result<Pubkey, RpcError> {
    Pubkey::from_str(value).map_err(|_| RpcError::InvalidParams(format!("Invalid pubkey: {}", value)))
}

fn context(ctx: &RpcContext) -> ResponseContext {
    ResponseContext {
        slot: ctx.chain.current_slot(),
    }
}

/// Handle getPoolInfo RPC method
pub fn handle_get_pool_info(ctx: &RpcContext, token: &Pubkey) -> Result<GetPoolInfoResponse, RpcError> {
    Ok(GetPoolInfoResponse {
        context: context(ctx),
        value: ctx.chain.pool.pool_info(token).map(PoolInfoValue::from),
    })
}

/// Handle getUserInfo RPC method
pub fn handle_get_user_info(
    ctx: &RpcContext,
    token: &Pubkey,
    user: &Pubkey,
) -> Result<GetUserInfoResponse, RpcError> {
    Ok(GetUserInfoResponse {
        context: context(ctx),
        value: ctx.chain.pool.user_info(token, user).map(UserInfoValue::from),
    })
}

/// Handle getPendingReward RPC method
pub fn handle_get_pending_reward(
    ctx: &RpcContext,
    token: &Pubkey,
    user: &Pubkey,
) -> Result<String, RpcError> {
    match ctx.chain.pool.pending_reward(token, user) {
        Ok(amount) => Ok(amount.to_string()),
        Err(PoolError::PoolNotRegistered) => Err(RpcError::InvalidParams(format!(
            "Token {} is not registered",
            token
        ))),
        Err(e) => Err(RpcError::InternalError(e.to_string())),
    }
}

/// Handle getPoolBalance RPC method
pub fn handle_get_pool_balance(ctx: &RpcContext, token: &Pubkey) -> Result<String, RpcError> {
    Ok(ctx.chain.pool.pool_balance(token).to_string())
}

/// Handle getTotalFeeRate RPC method
pub fn handle_get_total_fee_rate(ctx: &RpcContext) -> Result<u64, RpcError> {
    fee_rate(ctx.chain.pool.total_fee_rate())
}

/// Handle getUserRewardFeeRate RPC method
pub fn handle_get_user_reward_fee_rate(ctx: &RpcContext) -> Result<u64, RpcError> {
    fee_rate(ctx.chain.pool.user_reward_fee_rate())
}

/// Fee rates are parts per thousand, so they always fit a JSON number
fn fee_rate(rate: u128) -> Result<u64, RpcError> {
    u64::try_from(rate).map_err(|_| RpcError::InternalError(format!("Fee rate {} out of range", rate)))
}

/// Handle getSlot RPC method
pub fn handle_get_slot(ctx: &RpcContext) -> Result<Slot, RpcError> {
    Ok(ctx.chain.current_slot())
}

/// Handle getHealth RPC method
pub fn handle_get_health() -> Result<String, RpcError> {
    Ok("ok".to_string())
}

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
}

impl RpcError {
    /// JSON-RPC error code
    pub fn code(&self) -> i32 {
        match self {
            RpcError::InvalidParams(_) => -32602,
            RpcError::MethodNotFound(_) => -32601,
            RpcError::InternalError(_) => -32603,
        }
    }
}
