//! In-memory receipt storage using DashMap for concurrent access

use bridge_types::{Receipt, TxHash};
use dashmap::DashMap;
use solana_program::clock::Slot;
use std::sync::Arc;

/// Thread-safe receipt index
///
/// Written by the block producer, read by ledger clients and the relay.
#[derive(Clone, Default)]
pub struct ReceiptStore {
    receipts: Arc<DashMap<TxHash, Receipt>>,
    /// slot -> tx hashes in execution order
    by_slot: Arc<DashMap<Slot, Vec<TxHash>>>,
}

impl ReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tx_hash: &TxHash) -> Option<Receipt> {
        self.receipts.get(tx_hash).map(|r| r.value().clone())
    }

    pub fn insert(&self, receipt: Receipt) {
        let (slot, tx_hash) = (receipt.slot, receipt.tx_hash);
        self.receipts.insert(tx_hash, receipt);
        self.by_slot.entry(slot).or_default().push(tx_hash);
    }

    /// Receipts of the block at `slot`, in execution order
    pub fn at_slot(&self, slot: Slot) -> Vec<Receipt> {
        let Some(hashes) = self.by_slot.get(&slot).map(|h| h.value().clone()) else {
            return Vec::new();
        };
        hashes.iter().filter_map(|tx_hash| self.get(tx_hash)).collect()
    }

    pub fn contains(&self, tx_hash: &TxHash) -> bool {
        self.receipts.contains_key(tx_hash)
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::TxStatus;
    use solana_program::hash::Hash;

    #[test]
    fn test_clones_share_storage() {
        let store = ReceiptStore::new();
        let reader = store.clone();
        let tx_hash = Hash::new_unique();

        store.insert(Receipt {
            tx_hash,
            slot: 3,
            status: TxStatus::Success,
            messages: Vec::new(),
        });

        assert!(reader.contains(&tx_hash));
        assert_eq!(reader.get(&tx_hash).unwrap().slot, 3);
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn test_at_slot_keeps_execution_order() {
        let store = ReceiptStore::new();
        let hashes: Vec<_> = (0..3).map(|_| Hash::new_unique()).collect();
        for (i, tx_hash) in hashes.iter().enumerate() {
            store.insert(Receipt {
                tx_hash: *tx_hash,
                slot: if i == 1 { 4 } else { 9 },
                status: TxStatus::Success,
                messages: Vec::new(),
            });
        }

        let block: Vec<_> = store.at_slot(9).into_iter().map(|r| r.tx_hash).collect();
        assert_eq!(block, vec![hashes[0], hashes[2]]);
        assert_eq!(store.at_slot(4).len(), 1);
        assert!(store.at_slot(5).is_empty());
    }
}
