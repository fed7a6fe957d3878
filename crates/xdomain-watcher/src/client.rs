//! Ledger Client and Message Relay collaborators
//!
//! The watcher and the orchestrator only ever talk to a chain through these
//! two traits. The local devnet implements both in-process; a deployment
//! would put an RPC client behind them.

use std::time::Duration;

use async_trait::async_trait;
use borsh::BorshDeserialize;
use bridge_types::{Direction, Layer, MessageId, Receipt, StateQuery, Transaction, TxHash};
use solana_program::pubkey::Pubkey;
use thiserror::Error;
use tokio::time::Instant;

/// Errors reported by a ledger client or message relay
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The ledger refused the transaction outright
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// The ledger or relay could not be reached
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// State bytes did not decode as the expected type
    #[error("Failed to decode ledger state: {0}")]
    Decode(String),
}

/// Answer from a relay that may not know yet
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup<T> {
    Ready(T),
    Pending,
}

impl<T> Lookup<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Lookup::Ready(_))
    }
}

/// Access to one ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Ledger this client talks to
    fn layer(&self) -> Layer;

    /// Queue a transaction, returning its hash
    async fn submit(&self, tx: Transaction) -> Result<TxHash, ClientError>;

    /// Receipt of an included transaction, `None` while pending
    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, ClientError>;

    /// Borsh-encoded answer to `query`, `None` if nothing is recorded
    async fn read_state(&self, query: &StateQuery) -> Result<Option<Vec<u8>>, ClientError>;

    async fn balance_of(&self, token: &Pubkey, account: &Pubkey) -> Result<u128, ClientError>;

    /// Poll `receipt` until the transaction is included or `timeout` elapses
    ///
    /// Returns `Ok(None)` on timeout. Read errors count as "not yet".
    async fn wait_for_inclusion(
        &self,
        tx_hash: &TxHash,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Option<Receipt>, ClientError> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(Some(receipt)),
                Ok(None) => {}
                Err(e) => tracing::warn!("{} receipt lookup for {} failed: {}", self.layer(), tx_hash, e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep_until((now + poll_interval).min(deadline)).await;
        }
    }
}

/// Cross-domain message relay
#[async_trait]
pub trait MessageRelay: Send + Sync {
    /// Identifier of the message emitted by `origin_tx`
    async fn message_id_of(
        &self,
        direction: Direction,
        origin_tx: &TxHash,
    ) -> Result<Lookup<MessageId>, ClientError>;

    /// Receipt of the destination-chain transaction executing `message_id`
    async fn destination_receipt_of(
        &self,
        direction: Direction,
        message_id: &MessageId,
    ) -> Result<Lookup<Receipt>, ClientError>;
}

/// Decode `read_state` bytes
pub fn decode_state<T: BorshDeserialize>(bytes: &[u8]) -> Result<T, ClientError> {
    T::try_from_slice(bytes).map_err(|e| ClientError::Decode(e.to_string()))
}
