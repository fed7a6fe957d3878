//! Block Producer - devnet block loop
//!
//! Drains the transaction queue once per tick, executes the batch against
//! the pool, seals the slot and broadcasts the receipts to subscribers.

use crate::{processor::ChainProcessor, BLOCK_TIME_MS, MAX_TXS_PER_BLOCK};
use bridge_types::{Layer, Receipt, Transaction, TxHash};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use solana_program::{clock::Slot, hash::Hash};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::broadcast;

/// Block update event sent to subscribers
#[derive(Clone, Debug)]
pub struct BlockUpdate {
    pub layer: Layer,
    /// Slot the transactions were executed at
    pub slot: Slot,
    /// Blockhash sealing this block
    pub blockhash: Hash,
    /// Number of transactions processed
    pub transaction_count: usize,
    /// Receipts in execution order
    pub receipts: Vec<Receipt>,
    /// Block production time in microseconds
    pub processing_time_us: u64,
}

/// Block producer configuration
#[derive(Clone, Debug)]
pub struct BlockProducerConfig {
    /// Block time in milliseconds
    pub block_time_ms: u64,
    /// Maximum transactions per block
    pub max_txs_per_block: usize,
    /// Transaction queue capacity
    pub queue_capacity: usize,
    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for BlockProducerConfig {
    fn default() -> Self {
        Self {
            block_time_ms: BLOCK_TIME_MS,
            max_txs_per_block: MAX_TXS_PER_BLOCK,
            queue_capacity: 1024,
            verbose: false,
        }
    }
}

impl BlockProducerConfig {
    pub fn with_block_time_ms(mut self, block_time_ms: u64) -> Self {
        self.block_time_ms = block_time_ms.max(1);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Handle for submitting transactions to the block producer
#[derive(Clone)]
pub struct TransactionSender {
    sender: Sender<Transaction>,
}

impl TransactionSender {
    /// Queue a transaction for the next block
    pub fn send(&self, tx: Transaction) -> Result<TxHash, String> {
        self.try_submit(tx)
            .map_err(|e| format!("Failed to submit transaction: {}", e))
    }

    /// Queue a transaction, handing it back if the queue is full
    pub fn try_submit(&self, tx: Transaction) -> Result<TxHash, TrySendError<Transaction>> {
        let tx_hash = tx.hash();
        self.sender.try_send(tx)?;
        Ok(tx_hash)
    }
}

/// Block Producer
pub struct BlockProducer {
    processor: ChainProcessor,
    tx_receiver: Receiver<Transaction>,
    tx_sender: Sender<Transaction>,
    update_sender: broadcast::Sender<BlockUpdate>,
    config: BlockProducerConfig,
    running: Arc<AtomicBool>,
}

impl BlockProducer {
    pub fn new(processor: ChainProcessor, config: BlockProducerConfig) -> Self {
        let (tx_sender, tx_receiver) = bounded(config.queue_capacity);
        let (update_sender, _) = broadcast::channel(256);

        Self {
            processor,
            tx_receiver,
            tx_sender,
            update_sender,
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get a sender for submitting transactions
    pub fn transaction_sender(&self) -> TransactionSender {
        TransactionSender {
            sender: self.tx_sender.clone(),
        }
    }

    /// Subscribe to block updates
    pub fn subscribe(&self) -> broadcast::Receiver<BlockUpdate> {
        self.update_sender.subscribe()
    }

    /// Flag that stops `run_async` after the current tick once cleared
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn current_slot(&self) -> Slot {
        self.processor.current_slot()
    }

    /// Produce one block from whatever is queued
    ///
    /// Returns `None` if every sender is gone.
    pub fn produce_block(&mut self) -> Option<BlockUpdate> {
        let tick_start = Instant::now();
        let mut pending_txs = Vec::with_capacity(self.config.max_txs_per_block);

        // Drain transaction queue
        loop {
            match self.tx_receiver.try_recv() {
                Ok(tx) => {
                    pending_txs.push(tx);
                    if pending_txs.len() >= self.config.max_txs_per_block {
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("Transaction channel disconnected");
                    return None;
                }
            }
        }

        let block = self.processor.state().block_boundary();
        let slot = self.processor.current_slot();
        let receipts = if pending_txs.is_empty() {
            Vec::new()
        } else {
            self.processor.process_transactions(&pending_txs)
        };

        self.processor.advance_slot();
        drop(block);
        let processing_time = tick_start.elapsed();

        let update = BlockUpdate {
            layer: self.processor.state().layer,
            slot,
            blockhash: self.processor.current_blockhash(),
            transaction_count: receipts.len(),
            receipts,
            processing_time_us: processing_time.as_micros() as u64,
        };

        // Broadcast to subscribers (ignore errors if no subscribers)
        let _ = self.update_sender.send(update.clone());

        if update.transaction_count > 0 || self.config.verbose {
            tracing::debug!(
                "{} slot {} | {} txs | {:.2}ms",
                update.layer,
                slot,
                update.transaction_count,
                processing_time.as_secs_f64() * 1000.0
            );
        }

        Some(update)
    }

    /// Run the block producer asynchronously (tokio)
    pub async fn run_async(mut self) {
        let block_duration = Duration::from_millis(self.config.block_time_ms);
        let mut interval = tokio::time::interval(block_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            "{} block producer started ({}ms blocks)",
            self.processor.state().layer,
            self.config.block_time_ms
        );

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;

            let Some(update) = self.produce_block() else {
                break;
            };

            // Warn if we're falling behind
            if update.processing_time_us > block_duration.as_micros() as u64 {
                tracing::warn!(
                    "{} block {} took {:.2}ms (target: {}ms)",
                    update.layer,
                    update.slot,
                    update.processing_time_us as f64 / 1000.0,
                    self.config.block_time_ms
                );
            }
        }

        tracing::info!(
            "{} block producer stopped at slot {}",
            self.processor.state().layer,
            self.processor.current_slot()
        );
    }
}
