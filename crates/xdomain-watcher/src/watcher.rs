//! Cross-Domain Watcher
//!
//! Resolves an origin-chain transaction to the destination-chain receipt of
//! the message it emitted:
//!
//! Submitted -> MessagePending -> MessageKnown -> Settled
//!
//! Every phase polls on an interval against one deadline for the whole
//! watch. Nothing is retried past the deadline and nothing is rolled back.

use std::{sync::Arc, time::Duration};

use bridge_types::{Direction, Layer, MessageId, Receipt, TxHash};
use dashmap::{mapref::entry::Entry, DashMap};
use thiserror::Error;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::Instant,
};

use crate::client::{LedgerClient, Lookup, MessageRelay};

/// Default watch timeout
pub const DEFAULT_WATCH_TIMEOUT_MS: u64 = 60_000;

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// How far a watch has progressed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchPhase {
    /// Waiting for the origin transaction to be included
    Submitted,
    /// Origin included, waiting for the relay to assign a message id
    MessagePending,
    /// Waiting for the destination receipt of this message
    MessageKnown(MessageId),
    Settled,
}

impl std::fmt::Display for WatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchPhase::Submitted => f.write_str("SUBMITTED"),
            WatchPhase::MessagePending => f.write_str("MESSAGE_PENDING"),
            WatchPhase::MessageKnown(id) => write!(f, "MESSAGE_KNOWN({})", id),
            WatchPhase::Settled => f.write_str("SETTLED"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// Deadline passed before settlement; the origin effect stands
    #[error("Watch of {tx_hash} timed out in phase {phase}")]
    WatchTimeout { tx_hash: TxHash, phase: WatchPhase },

    /// Origin transaction reverted, so no message will follow
    #[error("Origin transaction {} reverted", .receipt.tx_hash)]
    OriginFailed { receipt: Receipt },

    #[error("Transaction {0} is already being watched")]
    DuplicateWatch(TxHash),

    #[error("Watch of {0} was cancelled")]
    Cancelled(TxHash),
}

/// Watch timing
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Deadline for the whole watch
    pub timeout: Duration,
    /// Initial interval between polls
    pub poll_interval: Duration,
    /// Backoff cap; equal to `poll_interval` for a fixed interval
    pub max_poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_WATCH_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl WatchConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fixed poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self.max_poll_interval = interval;
        self
    }

    /// Double the interval after each pending poll, up to `max`
    pub fn with_backoff(mut self, max: Duration) -> Self {
        self.max_poll_interval = max.max(self.poll_interval);
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_poll_interval)
    }
}

/// Everything a settled watch resolved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchReport {
    pub origin_receipt: Receipt,
    pub message_id: MessageId,
    pub destination_receipt: Receipt,
    /// Relay queries made across both relay phases
    pub relay_polls: u32,
}

/// Removes a watch from the registry however it ends
struct ActiveWatch<'a> {
    registry: &'a DashMap<TxHash, WatchPhase>,
    tx_hash: TxHash,
    observer: Option<watch::Sender<WatchPhase>>,
}

impl ActiveWatch<'_> {
    fn advance(&self, phase: WatchPhase) {
        self.registry.insert(self.tx_hash, phase);
        if let Some(observer) = &self.observer {
            observer.send_replace(phase);
        }
    }
}

impl Drop for ActiveWatch<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.tx_hash);
    }
}

/// Deadline plus the current backoff step
struct PollClock {
    deadline: Instant,
    interval: Duration,
}

/// Polls both ledgers and the relay to settle cross-domain transactions
pub struct CrossDomainWatcher {
    l1: Arc<dyn LedgerClient>,
    l2: Arc<dyn LedgerClient>,
    relay: Arc<dyn MessageRelay>,
    config: WatchConfig,
    active: DashMap<TxHash, WatchPhase>,
}

impl CrossDomainWatcher {
    pub fn new(
        l1: Arc<dyn LedgerClient>,
        l2: Arc<dyn LedgerClient>,
        relay: Arc<dyn MessageRelay>,
        config: WatchConfig,
    ) -> Self {
        Self {
            l1,
            l2,
            relay,
            config,
            active: DashMap::new(),
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn client(&self, layer: Layer) -> &Arc<dyn LedgerClient> {
        match layer {
            Layer::L1 => &self.l1,
            Layer::L2 => &self.l2,
        }
    }

    /// Phase of an in-flight watch
    pub fn status(&self, tx_hash: &TxHash) -> Option<WatchPhase> {
        self.active.get(tx_hash).map(|r| *r.value())
    }

    pub fn active_watches(&self) -> usize {
        self.active.len()
    }

    /// Watch `tx_hash` until it settles on the destination chain
    pub async fn watch(
        &self,
        tx_hash: TxHash,
        direction: Direction,
    ) -> Result<WatchReport, WatchError> {
        let guard = self.register(tx_hash, None)?;
        self.run(&guard, direction).await
    }

    /// Run a watch as a background task
    pub fn spawn(self: &Arc<Self>, tx_hash: TxHash, direction: Direction) -> WatchHandle {
        let (phase_tx, phase_rx) = watch::channel(WatchPhase::Submitted);
        let watcher = Arc::clone(self);

        let task = tokio::spawn(async move {
            let guard = watcher.register(tx_hash, Some(phase_tx))?;
            watcher.run(&guard, direction).await
        });

        WatchHandle {
            tx_hash,
            phase: phase_rx,
            task,
        }
    }

    fn register(
        &self,
        tx_hash: TxHash,
        observer: Option<watch::Sender<WatchPhase>>,
    ) -> Result<ActiveWatch<'_>, WatchError> {
        match self.active.entry(tx_hash) {
            Entry::Occupied(_) => Err(WatchError::DuplicateWatch(tx_hash)),
            Entry::Vacant(vacant) => {
                vacant.insert(WatchPhase::Submitted);
                Ok(ActiveWatch {
                    registry: &self.active,
                    tx_hash,
                    observer,
                })
            }
        }
    }

    async fn run(
        &self,
        guard: &ActiveWatch<'_>,
        direction: Direction,
    ) -> Result<WatchReport, WatchError> {
        let tx_hash = guard.tx_hash;
        let origin = self.client(direction.origin());
        let mut clock = PollClock {
            deadline: Instant::now() + self.config.timeout,
            interval: self.config.poll_interval,
        };
        let mut relay_polls = 0u32;

        tracing::debug!("Watching {} ({})", tx_hash, direction);

        // Origin inclusion
        let origin_receipt = loop {
            match origin.receipt(&tx_hash).await {
                Ok(Some(receipt)) => break receipt,
                Ok(None) => {}
                Err(e) => tracing::warn!("{} receipt lookup for {} failed: {}", origin.layer(), tx_hash, e),
            }
            self.pause(&mut clock, tx_hash, WatchPhase::Submitted).await?;
        };

        if !origin_receipt.is_success() {
            tracing::debug!("Origin transaction {} reverted, nothing to relay", tx_hash);
            return Err(WatchError::OriginFailed {
                receipt: origin_receipt,
            });
        }

        guard.advance(WatchPhase::MessagePending);
        clock.interval = self.config.poll_interval;

        // Message identifier
        let message_id = loop {
            relay_polls += 1;
            match self.relay.message_id_of(direction, &tx_hash).await {
                Ok(Lookup::Ready(id)) => break id,
                Ok(Lookup::Pending) => {}
                Err(e) => tracing::warn!("Message lookup for {} failed: {}", tx_hash, e),
            }
            self.pause(&mut clock, tx_hash, WatchPhase::MessagePending).await?;
        };

        let known = WatchPhase::MessageKnown(message_id);
        guard.advance(known);
        clock.interval = self.config.poll_interval;

        // Destination receipt
        let destination_receipt = loop {
            relay_polls += 1;
            match self.relay.destination_receipt_of(direction, &message_id).await {
                Ok(Lookup::Ready(receipt)) => break receipt,
                Ok(Lookup::Pending) => {}
                Err(e) => tracing::warn!("Destination lookup for {} failed: {}", message_id, e),
            }
            self.pause(&mut clock, tx_hash, known).await?;
        };

        guard.advance(WatchPhase::Settled);
        tracing::debug!(
            "{} settled as {} after {} relay polls",
            tx_hash,
            destination_receipt.tx_hash,
            relay_polls
        );

        Ok(WatchReport {
            origin_receipt,
            message_id,
            destination_receipt,
            relay_polls,
        })
    }

    /// Sleep until the next poll, or fail once the deadline has passed
    async fn pause(
        &self,
        clock: &mut PollClock,
        tx_hash: TxHash,
        phase: WatchPhase,
    ) -> Result<(), WatchError> {
        let now = Instant::now();
        if now >= clock.deadline {
            tracing::warn!("Watch of {} timed out in phase {}", tx_hash, phase);
            return Err(WatchError::WatchTimeout { tx_hash, phase });
        }

        tokio::time::sleep_until((now + clock.interval).min(clock.deadline)).await;
        clock.interval = self.config.next_interval(clock.interval);
        Ok(())
    }
}

/// Handle to a spawned watch
pub struct WatchHandle {
    tx_hash: TxHash,
    phase: watch::Receiver<WatchPhase>,
    task: JoinHandle<Result<WatchReport, WatchError>>,
}

impl WatchHandle {
    pub fn tx_hash(&self) -> TxHash {
        self.tx_hash
    }

    /// Most recent phase
    pub fn phase(&self) -> WatchPhase {
        *self.phase.borrow()
    }

    /// Receiver notified on every phase change
    pub fn subscribe(&self) -> watch::Receiver<WatchPhase> {
        self.phase.clone()
    }

    /// Stop polling; the origin transaction is unaffected
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the watch to end
    pub async fn join(self) -> Result<WatchReport, WatchError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(WatchError::Cancelled(self.tx_hash)),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}
