//! Persistence Layer for devnet chain state
//!
//! Uses sled embedded database to persist pool records and token balances
//! across restarts. State is saved periodically and on shutdown.

use crate::processor::{ChainHead, ChainState};
use borsh::{BorshDeserialize, BorshSerialize};
use bridge_types::Layer;
use pool_ledger::{PoolInfo, TokenPool, UserInfo};
use serde::{Deserialize, Serialize};
use sled::Db;
use solana_program::{clock::Slot, hash::Hash, pubkey::Pubkey};
use std::path::Path;

/// Metadata about the chain state
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChainMetadata {
    pub layer: Layer,
    /// Next slot to produce
    pub slot: Slot,
    /// Last sealed blockhash
    pub blockhash: [u8; 32],
    /// Registered token pools
    pub pool_count: u64,
    /// User stake records across all pools
    pub user_count: u64,
    /// Non-zero token balances
    pub balance_count: u64,
    /// Last save timestamp (unix seconds)
    pub last_save_ts: i64,
}

/// Pool record as stored; user records live in their own tree
#[derive(BorshSerialize, BorshDeserialize)]
struct StoredPool {
    info: PoolInfo,
    peer_deposit_amount: u128,
}

/// Persistent storage for one chain
pub struct PersistentStore {
    db: Db,
    /// local token -> StoredPool
    pools: sled::Tree,
    /// local token || user -> UserInfo
    users: sled::Tree,
    /// token || account -> u128 LE
    balances: sled::Tree,
    metadata: sled::Tree,
}

fn pair_key(a: &Pubkey, b: &Pubkey) -> [u8; 64] {
    let mut key = [0u8; 64];
    key[..32].copy_from_slice(a.as_ref());
    key[32..].copy_from_slice(b.as_ref());
    key
}

fn split_pair_key(key: &[u8]) -> anyhow::Result<(Pubkey, Pubkey)> {
    if key.len() != 64 {
        anyhow::bail!("Invalid key length {}", key.len());
    }
    let first: [u8; 32] = key[..32].try_into()?;
    let second: [u8; 32] = key[32..].try_into()?;
    Ok((Pubkey::new_from_array(first), Pubkey::new_from_array(second)))
}

impl PersistentStore {
    /// Open or create a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let db = sled::open(&path)?;
        let pools = db.open_tree("pools")?;
        let users = db.open_tree("users")?;
        let balances = db.open_tree("balances")?;
        let metadata = db.open_tree("metadata")?;

        tracing::info!("Opened persistent store at {:?}", path.as_ref());

        Ok(Self {
            db,
            pools,
            users,
            balances,
            metadata,
        })
    }

    /// Store a token pool and all of its user records
    pub fn store_pool(&self, layer: Layer, record: &TokenPool) -> anyhow::Result<()> {
        let token = record.info.local_token(layer);
        let stored = StoredPool {
            info: record.info.clone(),
            peer_deposit_amount: record.peer_deposit_amount,
        };
        self.pools.insert(token.as_ref(), borsh::to_vec(&stored)?)?;

        for (user, info) in &record.users {
            self.users
                .insert(pair_key(&token, user), borsh::to_vec(info)?)?;
        }

        Ok(())
    }

    /// Load every token pool with its users
    pub fn get_all_pools(&self) -> anyhow::Result<Vec<TokenPool>> {
        let mut records = Vec::new();

        for result in self.pools.iter() {
            let (key, value) = result?;
            let stored = StoredPool::try_from_slice(&value)?;

            let mut record = TokenPool {
                info: stored.info,
                peer_deposit_amount: stored.peer_deposit_amount,
                ..Default::default()
            };

            for entry in self.users.scan_prefix(&key) {
                let (user_key, user_value) = entry?;
                let (_, user) = split_pair_key(&user_key)?;
                record
                    .users
                    .insert(user, UserInfo::try_from_slice(&user_value)?);
            }

            records.push(record);
        }

        Ok(records)
    }

    /// Replace all stored balances
    pub fn store_balances(&self, balances: &[(Pubkey, Pubkey, u128)]) -> anyhow::Result<()> {
        self.balances.clear()?;

        let mut batch = sled::Batch::default();
        for (token, account, amount) in balances {
            batch.insert(&pair_key(token, account)[..], &amount.to_le_bytes()[..]);
        }
        self.balances.apply_batch(batch)?;

        Ok(())
    }

    pub fn get_all_balances(&self) -> anyhow::Result<Vec<(Pubkey, Pubkey, u128)>> {
        let mut balances = Vec::new();

        for result in self.balances.iter() {
            let (key, value) = result?;
            let (token, account) = split_pair_key(&key)?;
            let amount: [u8; 16] = value
                .as_ref()
                .try_into()
                .map_err(|_| anyhow::anyhow!("Invalid balance length"))?;
            balances.push((token, account, u128::from_le_bytes(amount)));
        }

        Ok(balances)
    }

    /// Save chain metadata
    pub fn save_metadata(&self, metadata: &ChainMetadata) -> anyhow::Result<()> {
        let bytes = bincode::serialize(metadata)?;
        self.metadata.insert("chain", bytes)?;
        Ok(())
    }

    /// Load chain metadata
    pub fn load_metadata(&self) -> anyhow::Result<Option<ChainMetadata>> {
        match self.metadata.get("chain")? {
            Some(bytes) => {
                let metadata: ChainMetadata = bincode::deserialize(&bytes)?;
                Ok(Some(metadata))
            }
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> anyhow::Result<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) -> anyhow::Result<()> {
        self.pools.clear()?;
        self.users.clear()?;
        self.balances.clear()?;
        self.metadata.clear()?;
        Ok(())
    }
}

/// Extension trait to add persistence to a chain
pub trait ChainPersistence {
    /// Save pools, balances and the chain tip; returns the pool count
    fn save_to_disk(&self, store: &PersistentStore) -> anyhow::Result<usize>;

    /// Load everything saved by `save_to_disk`; returns the pool count
    fn load_from_disk(&self, store: &PersistentStore) -> anyhow::Result<usize>;
}

impl ChainPersistence for ChainState {
    fn save_to_disk(&self, store: &PersistentStore) -> anyhow::Result<usize> {
        let (records, balances, head) = {
            let _block = self.block_boundary();
            (self.pool.snapshot(), self.tokens.snapshot(), self.head())
        };
        let mut user_count = 0;

        for record in &records {
            store.store_pool(self.layer, record)?;
            user_count += record.users.len();
        }

        store.store_balances(&balances)?;

        store.save_metadata(&ChainMetadata {
            layer: self.layer,
            slot: head.slot,
            blockhash: head.blockhash.to_bytes(),
            pool_count: records.len() as u64,
            user_count: user_count as u64,
            balance_count: balances.len() as u64,
            last_save_ts: chrono::Utc::now().timestamp(),
        })?;

        store.flush()?;
        tracing::info!(
            "Saved {} state: {} pools, {} users, {} balances at slot {}",
            self.layer,
            records.len(),
            user_count,
            balances.len(),
            head.slot
        );

        Ok(records.len())
    }

    fn load_from_disk(&self, store: &PersistentStore) -> anyhow::Result<usize> {
        let _block = self.block_boundary();
        if let Some(metadata) = store.load_metadata()? {
            if metadata.layer != self.layer {
                anyhow::bail!(
                    "Store holds {} state, cannot load into {}",
                    metadata.layer,
                    self.layer
                );
            }
            self.restore_head(ChainHead {
                slot: metadata.slot,
                blockhash: Hash::new_from_array(metadata.blockhash),
            });
        }

        let records = store.get_all_pools()?;
        let count = records.len();
        for record in records {
            self.pool.restore(record);
        }

        for (token, account, amount) in store.get_all_balances()? {
            self.tokens.set_balance(token, account, amount);
        }

        tracing::info!("Loaded {} pools for {} from disk", count, self.layer);

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_and_load_pool() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();

        let l1_token = Pubkey::new_unique();
        let l2_token = Pubkey::new_unique();
        let user = Pubkey::new_unique();
        let mut record = TokenPool {
            info: PoolInfo::new(l1_token, l2_token, 9),
            peer_deposit_amount: 77,
            ..Default::default()
        };
        record.info.user_deposit_amount = 100;
        record.users.insert(
            user,
            UserInfo {
                amount: 100,
                reward_debt: 4,
                pending_reward: 2,
            },
        );

        store.store_pool(Layer::L2, &record).unwrap();
        store.flush().unwrap();

        let loaded = store.get_all_pools().unwrap();
        assert_eq!(loaded, vec![record]);
    }

    #[test]
    fn test_balances_are_replaced() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();
        let token = Pubkey::new_unique();
        let alice = Pubkey::new_unique();
        let bob = Pubkey::new_unique();

        store.store_balances(&[(token, alice, 5), (token, bob, 6)]).unwrap();
        store.store_balances(&[(token, bob, 7)]).unwrap();

        assert_eq!(store.get_all_balances().unwrap(), vec![(token, bob, 7)]);
    }

    #[test]
    fn test_metadata() {
        let dir = tempdir().unwrap();
        let store = PersistentStore::open(dir.path()).unwrap();

        let metadata = ChainMetadata {
            layer: Layer::L1,
            slot: 1000,
            blockhash: [42u8; 32],
            pool_count: 2,
            user_count: 5,
            balance_count: 9,
            last_save_ts: 12345,
        };

        store.save_metadata(&metadata).unwrap();

        assert_eq!(store.load_metadata().unwrap().unwrap(), metadata);
    }
}
