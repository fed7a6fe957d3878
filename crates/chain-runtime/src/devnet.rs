//! Local Devnet - two chains, their pools, and the messenger between them

use crate::{
    block_producer::{BlockProducer, BlockProducerConfig},
    client::LocalLedgerClient,
    messenger::{LocalMessenger, MessengerEndpoint, DEFAULT_RELAY_DELAY_MS},
    processor::{ChainProcessor, ChainState},
};
use bridge_types::{FeeRates, Layer};
use pool_ledger::{InMemoryTokenLedger, LiquidityPool, PoolConfig, PoolError};
use solana_program::pubkey::Pubkey;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use xdomain_watcher::{LedgerClient, MessageRelay};

/// Addresses of the bridge contracts on one chain
#[derive(Clone, Copy, Debug)]
pub struct ChainAddresses {
    /// Liquidity pool (holds pooled balances)
    pub pool: Pubkey,
    /// Cross-domain messenger
    pub messenger: Pubkey,
}

impl ChainAddresses {
    pub fn new_unique() -> Self {
        Self {
            pool: Pubkey::new_unique(),
            messenger: Pubkey::new_unique(),
        }
    }
}

/// Devnet configuration
#[derive(Clone, Debug)]
pub struct DevnetConfig {
    /// Pool operator on both chains
    pub owner: Pubkey,
    pub fee_rates: FeeRates,
    pub l1: ChainAddresses,
    pub l2: ChainAddresses,
    pub block: BlockProducerConfig,
    pub relay_delay: Duration,
}

impl DevnetConfig {
    /// Fresh addresses for everything
    pub fn new(owner: Pubkey) -> Self {
        Self {
            owner,
            fee_rates: FeeRates::default(),
            l1: ChainAddresses::new_unique(),
            l2: ChainAddresses::new_unique(),
            block: BlockProducerConfig::default(),
            relay_delay: Duration::from_millis(DEFAULT_RELAY_DELAY_MS),
        }
    }

    pub fn with_block_time_ms(mut self, block_time_ms: u64) -> Self {
        self.block = self.block.with_block_time_ms(block_time_ms);
        self
    }

    pub fn with_relay_delay(mut self, delay: Duration) -> Self {
        self.relay_delay = delay;
        self
    }

    pub fn with_fee_rates(mut self, fee_rates: FeeRates) -> Self {
        self.fee_rates = fee_rates;
        self
    }

    fn chain(&self, layer: Layer) -> ChainAddresses {
        match layer {
            Layer::L1 => self.l1,
            Layer::L2 => self.l2,
        }
    }
}

/// Both chains plus the relay, wired but possibly not yet running
pub struct LocalDevnet {
    pub l1: ChainState,
    pub l2: ChainState,
    pub l1_client: Arc<LocalLedgerClient>,
    pub l2_client: Arc<LocalLedgerClient>,
    pub messenger: Arc<LocalMessenger>,
    producers: Vec<BlockProducer>,
    running: Vec<Arc<AtomicBool>>,
    producer_tasks: Vec<JoinHandle<()>>,
    messenger_task: Option<JoinHandle<()>>,
}

impl LocalDevnet {
    /// Build both chains; nothing runs until `start`
    pub fn new(config: &DevnetConfig) -> Result<Self, PoolError> {
        let (l1, l1_producer) = Self::build_chain(config, Layer::L1)?;
        let (l2, l2_producer) = Self::build_chain(config, Layer::L2)?;

        let l1_sender = l1_producer.transaction_sender();
        let l2_sender = l2_producer.transaction_sender();

        let messenger = Arc::new(LocalMessenger::new(
            MessengerEndpoint {
                address: config.l1.messenger,
                state: l1.clone(),
                sender: l1_sender.clone(),
            },
            MessengerEndpoint {
                address: config.l2.messenger,
                state: l2.clone(),
                sender: l2_sender.clone(),
            },
            config.relay_delay,
        ));

        let running = vec![l1_producer.running_flag(), l2_producer.running_flag()];

        Ok(Self {
            l1_client: Arc::new(LocalLedgerClient::new(l1.clone(), l1_sender)),
            l2_client: Arc::new(LocalLedgerClient::new(l2.clone(), l2_sender)),
            l1,
            l2,
            messenger,
            producers: vec![l1_producer, l2_producer],
            running,
            producer_tasks: Vec::new(),
            messenger_task: None,
        })
    }

    fn build_chain(
        config: &DevnetConfig,
        layer: Layer,
    ) -> Result<(ChainState, BlockProducer), PoolError> {
        let local = config.chain(layer);
        let peer = config.chain(layer.peer());
        let tokens = Arc::new(InMemoryTokenLedger::new());

        let pool = LiquidityPool::new(
            PoolConfig {
                layer,
                address: local.pool,
                owner: config.owner,
                messenger: local.messenger,
                peer_pool: peer.pool,
                fee_rates: config.fee_rates,
            },
            tokens.clone(),
        )?;

        let state = ChainState::new(layer, Arc::new(pool), tokens);
        let producer = BlockProducer::new(ChainProcessor::new(state.clone()), config.block.clone());
        Ok((state, producer))
    }

    pub fn chain(&self, layer: Layer) -> &ChainState {
        match layer {
            Layer::L1 => &self.l1,
            Layer::L2 => &self.l2,
        }
    }

    pub fn client(&self, layer: Layer) -> Arc<dyn LedgerClient> {
        match layer {
            Layer::L1 => self.l1_client.clone(),
            Layer::L2 => self.l2_client.clone(),
        }
    }

    pub fn relay(&self) -> Arc<dyn MessageRelay> {
        self.messenger.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.producer_tasks.is_empty()
    }

    /// Spawn both block producers and the messenger
    pub fn start(&mut self) {
        if self.producers.is_empty() {
            return;
        }

        let l1_updates = self.producers[0].subscribe();
        let l2_updates = self.producers[1].subscribe();
        self.messenger_task = Some(self.messenger.spawn(l1_updates, l2_updates));

        for producer in self.producers.drain(..) {
            self.producer_tasks.push(tokio::spawn(producer.run_async()));
        }

        tracing::info!("Devnet started");
    }

    /// Stop block production and relaying
    pub async fn shutdown(&mut self) {
        for flag in &self.running {
            flag.store(false, Ordering::SeqCst);
        }

        for task in self.producer_tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!("Block producer task failed: {}", e);
            }
        }

        if let Some(task) = self.messenger_task.take() {
            task.abort();
        }

        tracing::info!("Devnet stopped");
    }
}
