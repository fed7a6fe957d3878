//! Bridge Context
//!
//! Everything an orchestrator needs, built once and shared by reference.

use std::{sync::Arc, time::Duration};

use bridge_types::Layer;
use solana_program::pubkey::Pubkey;
use xdomain_watcher::{CrossDomainWatcher, LedgerClient, MessageRelay};

use crate::config::BridgeConfig;

/// Clients, watcher and acting account for one orchestrator
#[derive(Clone)]
pub struct BridgeContext {
    /// Account sending every transaction
    pub account: Pubkey,
    pub l1: Arc<dyn LedgerClient>,
    pub l2: Arc<dyn LedgerClient>,
    pub watcher: Arc<CrossDomainWatcher>,
    pub inclusion_timeout: Duration,
    pub poll_interval: Duration,
}

impl BridgeContext {
    pub fn new(
        account: Pubkey,
        l1: Arc<dyn LedgerClient>,
        l2: Arc<dyn LedgerClient>,
        relay: Arc<dyn MessageRelay>,
        config: &BridgeConfig,
    ) -> Self {
        let watcher = Arc::new(CrossDomainWatcher::new(
            l1.clone(),
            l2.clone(),
            relay,
            config.watch_config(),
        ));

        Self {
            account,
            l1,
            l2,
            watcher,
            inclusion_timeout: config.inclusion_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Same clients and watcher, acting for `account`
    pub fn for_account(&self, account: Pubkey) -> Self {
        Self {
            account,
            ..self.clone()
        }
    }

    pub fn client(&self, layer: Layer) -> &Arc<dyn LedgerClient> {
        match layer {
            Layer::L1 => &self.l1,
            Layer::L2 => &self.l2,
        }
    }
}
