//! Bridge Configuration
//!
//! Two JSON files drive a deployment: the address book (role name to
//! base58 address, written once when the contracts are set up) and the
//! bridge config (fees, timing, and which address-book roles form token
//! pairs).

use std::{collections::BTreeMap, path::Path, time::Duration};

use bridge_types::{FeeRates, FEE_RATE_DENOMINATOR};
use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;
use xdomain_watcher::{WatchConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WATCH_TIMEOUT_MS};

use crate::error::BridgeError;

/// Liquidity pool on L1
pub const ROLE_L1_POOL: &str = "L1LiquidityPool";
/// Liquidity pool on L2
pub const ROLE_L2_POOL: &str = "L2LiquidityPool";
pub const ROLE_L1_MESSENGER: &str = "l1MessengerAddress";
pub const ROLE_L2_MESSENGER: &str = "l2MessengerAddress";
/// Operator of both pools
pub const ROLE_POOL_OWNER: &str = "PoolOwner";
pub const ROLE_L1_TOKEN: &str = "L1ERC20";
pub const ROLE_L2_TOKEN: &str = "L2DepositedERC20";

/// Flat role -> address table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressBook {
    entries: BTreeMap<String, String>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(json).map_err(|e| BridgeError::Config(format!("address book: {}", e)))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, BridgeError> {
        serde_json::to_string_pretty(self).map_err(|e| BridgeError::Config(e.to_string()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), BridgeError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Address recorded for `role`
    pub fn get(&self, role: &str) -> Result<Pubkey, BridgeError> {
        let encoded = self
            .entries
            .get(role)
            .ok_or_else(|| BridgeError::Config(format!("address book has no {}", role)))?;
        decode_address(role, encoded)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.entries.contains_key(role)
    }

    pub fn insert(&mut self, role: impl Into<String>, address: &Pubkey) {
        self.entries.insert(role.into(), address.to_string());
    }

    /// Address for `role`, recording a fresh one if missing
    pub fn get_or_insert_with(
        &mut self,
        role: &str,
        make: impl FnOnce() -> Pubkey,
    ) -> Result<Pubkey, BridgeError> {
        if !self.contains(role) {
            self.insert(role, &make());
        }
        self.get(role)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decode_address(role: &str, encoded: &str) -> Result<Pubkey, BridgeError> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| BridgeError::Config(format!("{} is not base58: {}", role, e)))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| BridgeError::Config(format!("{} is not a 32-byte address", role)))?;
    Ok(Pubkey::new_from_array(array))
}

/// Token pair named by address-book roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPairConfig {
    pub l1_token: String,
    pub l2_token: String,
}

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub fee_rates: FeeRates,
    /// Deadline for a whole cross-domain watch
    pub watch_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Backoff cap; equal to `poll_interval_ms` for a fixed interval
    pub max_poll_interval_ms: u64,
    /// Deadline for an origin transaction to be included
    pub inclusion_timeout_ms: u64,
    pub block_time_ms: u64,
    /// Delay before the local messenger delivers a message
    pub relay_delay_ms: u64,
    pub token_pairs: Vec<TokenPairConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            fee_rates: FeeRates::default(),
            watch_timeout_ms: DEFAULT_WATCH_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            inclusion_timeout_ms: 30_000,
            block_time_ms: 100,
            relay_delay_ms: 200,
            token_pairs: vec![TokenPairConfig {
                l1_token: ROLE_L1_TOKEN.to_string(),
                l2_token: ROLE_L2_TOKEN.to_string(),
            }],
        }
    }
}

impl BridgeConfig {
    /// Parse and validate
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| BridgeError::Config(format!("bridge config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.fee_rates.total() > FEE_RATE_DENOMINATOR {
            return Err(BridgeError::Config(format!(
                "fee rates sum to {} of {}",
                self.fee_rates.total(),
                FEE_RATE_DENOMINATOR
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(BridgeError::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.block_time_ms == 0 {
            return Err(BridgeError::Config("block_time_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig::default()
            .with_timeout(Duration::from_millis(self.watch_timeout_ms))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_backoff(Duration::from_millis(self.max_poll_interval_ms))
    }

    pub fn inclusion_timeout(&self) -> Duration {
        Duration::from_millis(self.inclusion_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn relay_delay(&self) -> Duration {
        Duration::from_millis(self.relay_delay_ms)
    }

    /// Resolve `token_pairs` to `(l1_token, l2_token)` addresses
    pub fn token_pairs(&self, book: &AddressBook) -> Result<Vec<(Pubkey, Pubkey)>, BridgeError> {
        self.token_pairs
            .iter()
            .map(|pair| Ok((book.get(&pair.l1_token)?, book.get(&pair.l2_token)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_book_lookup() {
        let pool = Pubkey::new_unique();
        let json = format!(r#"{{ "L1LiquidityPool": "{}" }}"#, pool);
        let book = AddressBook::from_json(&json).unwrap();

        assert_eq!(book.get(ROLE_L1_POOL).unwrap(), pool);
        assert!(matches!(book.get(ROLE_L2_POOL), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_address_book_rejects_bad_address() {
        let book = AddressBook::from_json(r#"{ "L1ERC20": "0xdeadbeef" }"#).unwrap();
        assert!(book.get(ROLE_L1_TOKEN).is_err());

        let short = AddressBook::from_json(r#"{ "L1ERC20": "3yZe7d" }"#).unwrap();
        assert!(short.get(ROLE_L1_TOKEN).is_err());
    }

    #[test]
    fn test_address_book_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addresses.json");

        let mut book = AddressBook::new();
        let owner = book.get_or_insert_with(ROLE_POOL_OWNER, Pubkey::new_unique).unwrap();
        assert_eq!(
            book.get_or_insert_with(ROLE_POOL_OWNER, Pubkey::new_unique).unwrap(),
            owner
        );
        book.save(&path).unwrap();

        let loaded = AddressBook::load(&path).unwrap();
        assert_eq!(loaded, book);
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = BridgeConfig::from_json(r#"{ "watch_timeout_ms": 5000 }"#).unwrap();
        assert_eq!(config.watch_timeout_ms, 5000);
        assert_eq!(config.fee_rates, FeeRates::default());
        assert_eq!(config.watch_config().timeout, Duration::from_millis(5000));
        assert_eq!(config.token_pairs.len(), 1);
    }

    #[test]
    fn test_invalid_fee_rates_rejected() {
        let json = r#"{ "fee_rates": { "user_reward_fee_rate": 900, "owner_reward_fee_rate": 200 } }"#;
        assert!(matches!(BridgeConfig::from_json(json), Err(BridgeError::Config(_))));

        let config = BridgeConfig {
            fee_rates: FeeRates {
                user_reward_fee_rate: u128::MAX,
                owner_reward_fee_rate: u128::MAX,
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_token_pairs_resolve_through_book() {
        let mut book = AddressBook::new();
        let l1 = Pubkey::new_unique();
        let l2 = Pubkey::new_unique();
        book.insert(ROLE_L1_TOKEN, &l1);
        book.insert(ROLE_L2_TOKEN, &l2);

        let pairs = BridgeConfig::default().token_pairs(&book).unwrap();
        assert_eq!(pairs, vec![(l1, l2)]);
    }
}
