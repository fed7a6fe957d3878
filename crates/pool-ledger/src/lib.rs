//! Pool Ledger - liquidity pools backing fast exits and fast onramps
//!
//! One `LiquidityPool` runs on each chain. Liquidity providers stake tokens
//! and earn a share of the fee charged on every fast exit (L2 -> L1) or fast
//! onramp (L1 -> L2); the operator takes the rest of the fee.
//!
//! Record Structure:
//! - PoolInfo: per-token deposit total, accrued fees, reward-per-share rate
//! - UserInfo: per-user stake, reward debt, pending reward

pub mod error;
pub mod instruction;
pub mod processor;
pub mod state;
pub mod token;

pub use error::PoolError;
pub use instruction::{CrossDomainCall, PoolInstruction};
pub use processor::{ClientDeposit, LiquidityPool, PoolConfig, TokenPool};
pub use state::{FeeSplit, PoolInfo, UserInfo};
pub use token::{InMemoryTokenLedger, TokenError, TokenLedger};
