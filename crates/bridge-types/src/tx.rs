//! Transactions, receipts and cross-domain message identities

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use solana_program::{hash::Hash, pubkey::Pubkey};

use crate::Direction;

/// Transaction hashes reuse the Solana 32-byte hash type
pub type TxHash = Hash;

/// A transaction submitted to one ledger
///
/// `data` is a Borsh-encoded pool instruction. Transactions are not signed;
/// `sender` is taken at face value by the local ledger.
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub sender: Pubkey,
    /// Disambiguates otherwise identical transactions from the same sender
    pub nonce: u64,
    pub data: Vec<u8>,
}

impl Transaction {
    pub fn new(sender: Pubkey, nonce: u64, data: Vec<u8>) -> Self {
        Self {
            sender,
            nonce,
            data,
        }
    }

    /// Content hash identifying this transaction on its ledger
    pub fn hash(&self) -> TxHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.sender.as_ref());
        hasher.update(&self.nonce.to_le_bytes());
        hasher.update(&self.data);
        Hash::new_from_array(*hasher.finalize().as_bytes())
    }
}

/// Relay-assigned correlator linking an origin transaction to its
/// destination-chain execution
#[derive(
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
pub struct MessageId(pub [u8; 32]);

impl MessageId {
    /// Identifier of the `index`-th message emitted by `origin_tx`
    pub fn derive(direction: Direction, origin_tx: &TxHash, index: u32) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"xdomain-message");
        hasher.update(&[direction as u8]);
        hasher.update(origin_tx.as_ref());
        hasher.update(&index.to_le_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

/// A "send message" event emitted by a pool on its origin chain
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Pool that emitted the message
    pub sender: Pubkey,
    /// Pool on the other chain that must execute it
    pub target: Pubkey,
    /// Borsh-encoded instruction for the target
    pub data: Vec<u8>,
}

/// Execution outcome recorded in a receipt
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    /// Reverted with the pool error code
    Failed { code: u32 },
}

/// Receipt of an included transaction
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    /// Slot the transaction was included in
    pub slot: u64,
    pub status: TxStatus,
    /// Cross-domain messages emitted (empty when the transaction failed)
    pub messages: Vec<OutboundMessage>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        matches!(self.status, TxStatus::Success)
    }

    /// Error code if the transaction reverted
    pub fn error_code(&self) -> Option<u32> {
        match self.status {
            TxStatus::Success => None,
            TxStatus::Failed { code } => Some(code),
        }
    }
}

/// Read-only queries answered through `readState`
///
/// Results come back as Borsh bytes: `PoolInfo`, `UserInfo`, `FeeRates`, or a
/// bare `u128` for the amount queries.
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum StateQuery {
    PoolInfo { token: Pubkey },
    UserInfo { token: Pubkey, user: Pubkey },
    /// Harvestable reward: pending plus not-yet-synced share
    PendingReward { token: Pubkey, user: Pubkey },
    FeeRates,
    PoolBalance { token: Pubkey },
    /// Deposit total last reported by the paired pool
    PeerDepositAmount { token: Pubkey },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_hash_depends_on_nonce() {
        let sender = Pubkey::new_unique();
        let a = Transaction::new(sender, 1, vec![1, 2, 3]);
        let b = Transaction::new(sender, 2, vec![1, 2, 3]);
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.clone().hash());
    }

    #[test]
    fn test_message_id_unique_per_origin() {
        let tx = Hash::new_unique();
        let first = MessageId::derive(Direction::L2ToL1, &tx, 0);
        let second = MessageId::derive(Direction::L2ToL1, &tx, 1);
        let other_tx = MessageId::derive(Direction::L2ToL1, &Hash::new_unique(), 0);
        assert_ne!(first, second);
        assert_ne!(first, other_tx);
    }
}
