//! Chain Transaction Processor
//!
//! Executes pool transactions in order, one block at a time, and records a
//! receipt for each. This is the whole "virtual machine" of a devnet chain:
//! every transaction is a pool instruction.

use crate::receipt_store::ReceiptStore;
use bridge_types::{Layer, Receipt, Transaction, TxStatus};
use parking_lot::{Mutex, MutexGuard, RwLock};
use pool_ledger::{InMemoryTokenLedger, LiquidityPool};
use solana_program::{clock::Slot, hash::Hash};
use std::sync::Arc;

/// Chain tip
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainHead {
    /// Slot the next block will be produced at
    pub slot: Slot,
    /// Hash of the last produced block
    pub blockhash: Hash,
}

impl Default for ChainHead {
    fn default() -> Self {
        Self {
            slot: 0,
            blockhash: Hash::default(),
        }
    }
}

/// Everything readers of a chain share with its block producer
#[derive(Clone)]
pub struct ChainState {
    pub layer: Layer,
    pub pool: Arc<LiquidityPool>,
    pub tokens: Arc<InMemoryTokenLedger>,
    pub receipts: ReceiptStore,
    head: Arc<RwLock<ChainHead>>,
    /// Held for the whole of a block; holders see state between blocks
    block: Arc<Mutex<()>>,
}

impl ChainState {
    pub fn new(layer: Layer, pool: Arc<LiquidityPool>, tokens: Arc<InMemoryTokenLedger>) -> Self {
        Self {
            layer,
            pool,
            tokens,
            receipts: ReceiptStore::new(),
            head: Arc::new(RwLock::new(ChainHead::default())),
            block: Arc::new(Mutex::new(())),
        }
    }

    /// Wait for the block in progress, then hold off the next one
    pub fn block_boundary(&self) -> MutexGuard<'_, ()> {
        self.block.lock()
    }

    pub fn head(&self) -> ChainHead {
        *self.head.read()
    }

    pub fn current_slot(&self) -> Slot {
        self.head.read().slot
    }

    pub fn current_blockhash(&self) -> Hash {
        self.head.read().blockhash
    }

    /// Reset the tip (persistence reload)
    pub fn restore_head(&self, head: ChainHead) {
        *self.head.write() = head;
    }
}

/// Chain Transaction Processor
pub struct ChainProcessor {
    state: ChainState,
}

impl ChainProcessor {
    pub fn new(state: ChainState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    /// Execute one transaction at the current slot and record its receipt
    pub fn process_transaction(&self, tx: &Transaction) -> Receipt {
        let slot = self.state.current_slot();
        let tx_hash = tx.hash();

        let receipt = match self.state.pool.process(&tx.sender, &tx.data, slot) {
            Ok(messages) => Receipt {
                tx_hash,
                slot,
                status: TxStatus::Success,
                messages,
            },
            Err(e) => {
                tracing::debug!("{} tx {} failed: {}", self.state.layer, tx_hash, e);
                Receipt {
                    tx_hash,
                    slot,
                    status: TxStatus::Failed { code: e.code() },
                    messages: Vec::new(),
                }
            }
        };

        self.state.receipts.insert(receipt.clone());
        receipt
    }

    /// Execute a batch in order, skipping replays of already-included hashes
    pub fn process_transactions(&self, txs: &[Transaction]) -> Vec<Receipt> {
        let mut receipts = Vec::with_capacity(txs.len());

        for tx in txs {
            if self.state.receipts.contains(&tx.hash()) {
                tracing::warn!("{} dropping replayed tx {}", self.state.layer, tx.hash());
                continue;
            }
            receipts.push(self.process_transaction(tx));
        }

        receipts
    }

    /// Seal the current slot and move to the next one
    pub fn advance_slot(&self) {
        let mut head = self.state.head.write();
        head.blockhash = solana_program::hash::hashv(&[
            head.blockhash.as_ref(),
            &head.slot.to_le_bytes(),
        ]);
        head.slot += 1;

        tracing::trace!("{} advanced to slot {}", self.state.layer, head.slot);
    }

    pub fn current_slot(&self) -> Slot {
        self.state.current_slot()
    }

    pub fn current_blockhash(&self) -> Hash {
        self.state.current_blockhash()
    }
}
