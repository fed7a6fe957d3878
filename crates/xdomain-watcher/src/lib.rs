//! Cross-Domain Watcher - settlement tracking between L1 and L2
//!
//! Handles the asynchronous half of the bridge:
//! - Ledger client and message relay collaborators
//! - Polling an origin transaction through to its destination receipt
//! - Tracking concurrent watches by origin transaction hash

pub mod client;
pub mod watcher;

pub use client::{decode_state, ClientError, LedgerClient, Lookup, MessageRelay};
pub use watcher::{
    CrossDomainWatcher, WatchConfig, WatchError, WatchHandle, WatchPhase, WatchReport,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_WATCH_TIMEOUT_MS,
};
