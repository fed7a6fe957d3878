//! Bridge Orchestrator - pool operations with cross-domain settlement
//!
//! Ties the pool ledger and the watcher together:
//! - Explicit context (clients, watcher, acting account)
//! - Configuration and the deployment address book
//! - Submit-then-settle sequencing for every bridge operation

pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;

pub use config::{
    AddressBook, BridgeConfig, TokenPairConfig, ROLE_L1_MESSENGER, ROLE_L1_POOL, ROLE_L1_TOKEN,
    ROLE_L2_MESSENGER, ROLE_L2_POOL, ROLE_L2_TOKEN, ROLE_POOL_OWNER,
};
pub use context::BridgeContext;
pub use error::BridgeError;
pub use orchestrator::{BridgeOrchestrator, Settlement};
