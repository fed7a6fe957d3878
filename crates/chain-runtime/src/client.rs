//! In-process ledger client for a devnet chain

use crate::{block_producer::TransactionSender, processor::ChainState};
use async_trait::async_trait;
use bridge_types::{Layer, Receipt, StateQuery, Transaction, TxHash};
use pool_ledger::TokenLedger;
use solana_program::{clock::Slot, pubkey::Pubkey};
use xdomain_watcher::{ClientError, LedgerClient};

/// Ledger client talking straight to a chain in the same process
#[derive(Clone)]
pub struct LocalLedgerClient {
    state: ChainState,
    sender: TransactionSender,
}

impl LocalLedgerClient {
    pub fn new(state: ChainState, sender: TransactionSender) -> Self {
        Self { state, sender }
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn current_slot(&self) -> Slot {
        self.state.current_slot()
    }
}

#[async_trait]
impl LedgerClient for LocalLedgerClient {
    fn layer(&self) -> Layer {
        self.state.layer
    }

    async fn submit(&self, tx: Transaction) -> Result<TxHash, ClientError> {
        if self.state.receipts.contains(&tx.hash()) {
            return Err(ClientError::Rejected(format!(
                "transaction {} already included",
                tx.hash()
            )));
        }

        self.sender.send(tx).map_err(ClientError::Rejected)
    }

    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, ClientError> {
        Ok(self.state.receipts.get(tx_hash))
    }

    async fn read_state(&self, query: &StateQuery) -> Result<Option<Vec<u8>>, ClientError> {
        self.state
            .pool
            .query(query)
            .map_err(|e| ClientError::Rejected(e.to_string()))
    }

    async fn balance_of(&self, token: &Pubkey, account: &Pubkey) -> Result<u128, ClientError> {
        Ok(self.state.tokens.balance_of(token, account))
    }
}
