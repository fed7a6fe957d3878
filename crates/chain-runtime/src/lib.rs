//! Chain Runtime - in-process devnet chains
//!
//! This crate provides a minimal ledger to run the bridge against:
//! - Ordered execution of pool transactions with receipts
//! - Block production on a fixed tick
//! - Disk persistence of pools and balances
//! - A local cross-domain messenger relaying pool messages between chains

pub mod block_producer;
pub mod client;
pub mod devnet;
pub mod messenger;
pub mod persistence;
pub mod processor;
pub mod receipt_store;

pub use block_producer::{BlockProducer, BlockProducerConfig, BlockUpdate, TransactionSender};
pub use client::LocalLedgerClient;
pub use devnet::{ChainAddresses, DevnetConfig, LocalDevnet};
pub use messenger::{LocalMessenger, MessengerEndpoint, DEFAULT_RELAY_DELAY_MS};
pub use persistence::{ChainMetadata, ChainPersistence, PersistentStore};
pub use processor::{ChainHead, ChainProcessor, ChainState};
pub use receipt_store::ReceiptStore;

/// Default block time in milliseconds
pub const BLOCK_TIME_MS: u64 = 100;

/// Maximum transactions per block
pub const MAX_TXS_PER_BLOCK: usize = 64;
