//! Devnet Configuration
//!
//! Turns the address book and bridge config into the devnet's wiring.

use bridge_orchestrator::{
    AddressBook, BridgeConfig, BridgeError, ROLE_L1_MESSENGER, ROLE_L1_POOL, ROLE_L2_MESSENGER,
    ROLE_L2_POOL, ROLE_POOL_OWNER,
};
use chain_runtime::{ChainAddresses, DevnetConfig};
use solana_program::pubkey::Pubkey;

/// Roles every devnet needs besides the token pairs
const DEVNET_ROLES: [&str; 5] = [
    ROLE_POOL_OWNER,
    ROLE_L1_POOL,
    ROLE_L2_POOL,
    ROLE_L1_MESSENGER,
    ROLE_L2_MESSENGER,
];

fn random_address() -> Pubkey {
    Pubkey::new_from_array(rand::random())
}

/// Record a fresh address for every missing role; returns how many were added
pub fn complete_address_book(
    book: &mut AddressBook,
    bridge: &BridgeConfig,
) -> Result<usize, BridgeError> {
    let before = book.len();

    let mut roles: Vec<&str> = DEVNET_ROLES.to_vec();
    for pair in &bridge.token_pairs {
        roles.push(&pair.l1_token);
        roles.push(&pair.l2_token);
    }
    for role in roles {
        book.get_or_insert_with(role, random_address)?;
    }

    Ok(book.len() - before)
}

/// Devnet wiring for a completed address book
pub fn devnet_config(
    bridge: &BridgeConfig,
    book: &AddressBook,
    verbose: bool,
) -> Result<DevnetConfig, BridgeError> {
    let mut config = DevnetConfig::new(book.get(ROLE_POOL_OWNER)?)
        .with_fee_rates(bridge.fee_rates)
        .with_block_time_ms(bridge.block_time_ms)
        .with_relay_delay(bridge.relay_delay());

    config.l1 = ChainAddresses {
        pool: book.get(ROLE_L1_POOL)?,
        messenger: book.get(ROLE_L1_MESSENGER)?,
    };
    config.l2 = ChainAddresses {
        pool: book.get(ROLE_L2_POOL)?,
        messenger: book.get(ROLE_L2_MESSENGER)?,
    };
    config.block.verbose = verbose;

    Ok(config)
}
