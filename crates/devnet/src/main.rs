//! Fast Bridge Devnet
//!
//! Runs an L1 and an L2 chain in one process, each hosting a liquidity
//! pool, with a local messenger relaying pool messages between them.
//! Each chain serves read-only JSON-RPC. State is persisted to disk and
//! survives restarts.

use anyhow::Result;
use bridge_orchestrator::{
    AddressBook, BridgeConfig, BridgeContext, BridgeError, BridgeOrchestrator, ROLE_POOL_OWNER,
};
use bridge_types::Layer;
use chain_runtime::{ChainPersistence, ChainState, LocalDevnet, PersistentStore};
use clap::Parser;
use pool_ledger::PoolError;
use pool_rpc::{HttpRpcServer, RpcContext, RpcServerConfig};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

/// Fast-liquidity bridge devnet
#[derive(Parser, Debug)]
#[command(name = "fastbridge-devnet")]
#[command(about = "Local L1/L2 chains with fast-liquidity pools and a message relay", long_about = None)]
struct Args {
    /// Address book (role -> address); created if missing
    #[arg(long)]
    addresses: Option<PathBuf>,

    /// Bridge config JSON (defaults when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for persistent state
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// L1 pool HTTP RPC bind address
    #[arg(long)]
    l1_rpc_addr: Option<String>,

    /// L2 pool HTTP RPC bind address
    #[arg(long)]
    l2_rpc_addr: Option<String>,

    /// Block time in milliseconds (overrides config)
    #[arg(long)]
    block_time_ms: Option<u64>,

    /// Message relay delay in milliseconds (overrides config)
    #[arg(long)]
    relay_delay_ms: Option<u64>,

    /// Save state every N slots (0 = only on shutdown)
    #[arg(long, default_value = "300")]
    save_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let mut bridge = match &args.config {
        Some(path) => BridgeConfig::load(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(block_time_ms) = args.block_time_ms {
        bridge.block_time_ms = block_time_ms;
    }
    if let Some(relay_delay_ms) = args.relay_delay_ms {
        bridge.relay_delay_ms = relay_delay_ms;
    }
    bridge.validate()?;

    let defaults = RpcServerConfig::default();
    let rpc = RpcServerConfig {
        l1_http_addr: args.l1_rpc_addr.clone().unwrap_or(defaults.l1_http_addr),
        l2_http_addr: args.l2_rpc_addr.clone().unwrap_or(defaults.l2_http_addr),
    };

    tracing::info!("Starting fast bridge devnet");
    tracing::info!("  L1 HTTP RPC: {}", rpc.l1_http_addr);
    tracing::info!("  L2 HTTP RPC: {}", rpc.l2_http_addr);
    tracing::info!("  Block time: {}ms", bridge.block_time_ms);
    tracing::info!("  Relay delay: {}ms", bridge.relay_delay_ms);
    tracing::info!("  Data directory: {:?}", args.data_dir);
    tracing::info!("  Save interval: {} slots", args.save_interval);

    // Create data directory if it doesn't exist
    std::fs::create_dir_all(&args.data_dir)?;

    // Address book
    let addresses_path = args
        .addresses
        .clone()
        .unwrap_or_else(|| args.data_dir.join("addresses.json"));
    let mut book = if addresses_path.exists() {
        AddressBook::load(&addresses_path)?
    } else {
        AddressBook::new()
    };
    let added = config::complete_address_book(&mut book, &bridge)?;
    if added > 0 {
        book.save(&addresses_path)?;
        tracing::info!("Recorded {} new addresses in {:?}", added, addresses_path);
    }

    let devnet_config = config::devnet_config(&bridge, &book, args.verbose)?;
    let mut devnet = LocalDevnet::new(&devnet_config)?;

    // Open persistent stores and load existing state
    let l1_store = Arc::new(PersistentStore::open(args.data_dir.join("l1"))?);
    let l2_store = Arc::new(PersistentStore::open(args.data_dir.join("l2"))?);
    for (chain, store) in [(&devnet.l1, &l1_store), (&devnet.l2, &l2_store)] {
        match store.load_metadata()? {
            Some(metadata) => {
                tracing::info!(
                    "Loading {} state from disk: slot {}, {} pools",
                    chain.layer,
                    metadata.slot,
                    metadata.pool_count
                );
                chain.load_from_disk(store)?;
            }
            None => tracing::info!("No existing {} state found, starting fresh", chain.layer),
        }
    }

    devnet.start();

    // Register configured token pairs on both pools
    let owner = BridgeOrchestrator::new(Arc::new(BridgeContext::new(
        book.get(ROLE_POOL_OWNER)?,
        devnet.client(Layer::L1),
        devnet.client(Layer::L2),
        devnet.relay(),
        &bridge,
    )));
    for (l1_token, l2_token) in bridge.token_pairs(&book)? {
        for layer in [Layer::L1, Layer::L2] {
            match owner.register_pool(layer, l1_token, l2_token).await {
                Ok(_) => {}
                Err(BridgeError::Ledger(PoolError::AlreadyRegistered)) => {
                    tracing::info!("{} pool for {} already registered", layer, l1_token);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start HTTP RPC servers
    let servers = [
        (devnet.l1.clone(), rpc.l1_http_addr.clone()),
        (devnet.l2.clone(), rpc.l2_http_addr.clone()),
    ]
    .into_iter()
    .map(|(chain, addr)| spawn_rpc_server(chain, addr, shutdown_rx.clone()))
    .collect::<Vec<_>>();

    // Periodic save to disk
    let saver = (args.save_interval > 0).then(|| {
        let period = Duration::from_millis(bridge.block_time_ms.saturating_mul(args.save_interval));
        let chains = [
            (devnet.l1.clone(), l1_store.clone()),
            (devnet.l2.clone(), l2_store.clone()),
        ];
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                for (chain, store) in &chains {
                    save_chain(chain, store);
                }
            }
        })
    });

    tracing::info!("Devnet running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");

    if let Some(task) = saver {
        task.abort();
    }
    let _ = shutdown_tx.send(true);
    devnet.shutdown().await;

    // Save state before exit
    save_chain(&devnet.l1, &l1_store);
    save_chain(&devnet.l2, &l2_store);

    for server in servers {
        if let Err(e) = server.await {
            tracing::error!("HTTP RPC server task failed: {}", e);
        }
    }

    tracing::info!("Devnet stopped");

    Ok(())
}

fn spawn_rpc_server(
    chain: ChainState,
    addr: String,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let layer = chain.layer;
        let server = HttpRpcServer::new(Arc::new(RpcContext::new(chain)));
        let signal = async move {
            let _ = shutdown.changed().await;
        };
        if let Err(e) = server.run(&addr, signal).await {
            tracing::error!("{} HTTP RPC server error: {}", layer, e);
        }
    })
}

fn save_chain(chain: &ChainState, store: &PersistentStore) {
    if let Err(e) = chain.save_to_disk(store) {
        tracing::error!("Failed to save {} state: {}", chain.layer, e);
    }
}
