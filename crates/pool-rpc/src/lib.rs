//! Pool RPC - read-only JSON-RPC for one chain's liquidity pool
//!
//! HTTP JSON-RPC: getPoolInfo, getUserInfo, getPendingReward, getPoolBalance,
//! getTotalFeeRate, getUserRewardFeeRate, getSlot, getHealth, getVersion

pub mod http_server;
pub mod methods;

pub use http_server::{dispatch_method, HttpRpcServer};
pub use methods::{RpcContext, RpcError};

/// RPC Server configuration
#[derive(Clone, Debug)]
pub struct RpcServerConfig {
    /// L1 pool HTTP RPC bind address
    pub l1_http_addr: String,
    /// L2 pool HTTP RPC bind address
    pub l2_http_addr: String,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            l1_http_addr: "127.0.0.1:8545".to_string(),
            l2_http_addr: "127.0.0.1:9545".to_string(),
        }
    }
}
