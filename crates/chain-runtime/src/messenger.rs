//! Local Cross-Domain Messenger
//!
//! Watches both chains' blocks for messages emitted by the pools, assigns
//! each a `MessageId`, and after the relay delay submits a `RelayMessage`
//! transaction to the other chain. Deliveries to one chain keep the order
//! their origin blocks produced them in.
//!
//! Blocks missed by a lagging subscription are rebuilt from the origin
//! chain's receipts, and deliveries wait out a full transaction queue, so
//! every message a committed transaction emitted is eventually relayed.

use crate::{
    block_producer::{BlockUpdate, TransactionSender},
    processor::ChainState,
};
use async_trait::async_trait;
use bridge_types::{Direction, Layer, MessageId, Receipt, Transaction, TxHash};
use crossbeam_channel::TrySendError;
use dashmap::DashMap;
use pool_ledger::{CrossDomainCall, PoolInstruction};
use solana_program::{clock::Slot, pubkey::Pubkey};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::Instant,
};
use xdomain_watcher::{ClientError, Lookup, MessageRelay};

/// Default delay between a message being emitted and relayed
pub const DEFAULT_RELAY_DELAY_MS: u64 = 200;

/// First wait before resubmitting to a full transaction queue
const QUEUE_RETRY_MIN: Duration = Duration::from_millis(2);

/// Backoff cap for a full transaction queue
const QUEUE_RETRY_MAX: Duration = Duration::from_millis(250);

/// The messenger's presence on one chain
#[derive(Clone)]
pub struct MessengerEndpoint {
    /// Sender the local pool accepts relayed calls from
    pub address: Pubkey,
    pub state: ChainState,
    pub sender: TransactionSender,
}

struct Delivery {
    message_id: MessageId,
    ready_at: Instant,
    xdomain_sender: Pubkey,
    data: Vec<u8>,
}

/// In-process relay between the two devnet chains
pub struct LocalMessenger {
    l1: MessengerEndpoint,
    l2: MessengerEndpoint,
    relay_delay: Duration,
    /// (direction, origin tx) -> id of the first message it emitted
    message_ids: DashMap<(Direction, TxHash), MessageId>,
    /// message id -> destination relay tx
    relayed: DashMap<MessageId, TxHash>,
    nonce: AtomicU64,
}

impl LocalMessenger {
    pub fn new(l1: MessengerEndpoint, l2: MessengerEndpoint, relay_delay: Duration) -> Self {
        Self {
            l1,
            l2,
            relay_delay,
            message_ids: DashMap::new(),
            relayed: DashMap::new(),
            nonce: AtomicU64::new(0),
        }
    }

    fn endpoint(&self, layer: Layer) -> &MessengerEndpoint {
        match layer {
            Layer::L1 => &self.l1,
            Layer::L2 => &self.l2,
        }
    }

    /// Messages relayed so far
    pub fn relayed_count(&self) -> usize {
        self.relayed.len()
    }

    /// Start relaying blocks from both chains
    ///
    /// Relaying starts at each chain's current slot. The task ends once both
    /// chains stop producing and every queued delivery has been submitted.
    pub fn spawn(
        self: &Arc<Self>,
        l1_updates: broadcast::Receiver<BlockUpdate>,
        l2_updates: broadcast::Receiver<BlockUpdate>,
    ) -> JoinHandle<()> {
        let messenger = Arc::clone(self);
        let start = [self.l1.state.current_slot(), self.l2.state.current_slot()];

        tokio::spawn(async move {
            let (to_l1, l1_queue) = mpsc::unbounded_channel();
            let (to_l2, l2_queue) = mpsc::unbounded_channel();

            tokio::join!(
                messenger.observe(start, l1_updates, l2_updates, to_l1, to_l2),
                messenger.deliver(Layer::L1, l1_queue),
                messenger.deliver(Layer::L2, l2_queue),
            );

            tracing::info!("Messenger stopped after relaying {} messages", messenger.relayed_count());
        })
    }

    async fn observe(
        &self,
        start: [Slot; 2],
        mut l1_updates: broadcast::Receiver<BlockUpdate>,
        mut l2_updates: broadcast::Receiver<BlockUpdate>,
        to_l1: mpsc::UnboundedSender<Delivery>,
        to_l2: mpsc::UnboundedSender<Delivery>,
    ) {
        const ORIGINS: [Layer; 2] = [Layer::L1, Layer::L2];
        let mut open = [true, true];
        let mut next_slot = start;

        while open[0] || open[1] {
            let (idx, result) = tokio::select! {
                r = l1_updates.recv(), if open[0] => (0, r),
                r = l2_updates.recv(), if open[1] => (1, r),
            };

            let origin = ORIGINS[idx];
            // Messages emitted on L1 are delivered to L2 and vice versa
            let queue = match origin {
                Layer::L1 => &to_l2,
                Layer::L2 => &to_l1,
            };

            match result {
                Ok(update) => {
                    self.catch_up(origin, &mut next_slot[idx], update.slot, queue);
                    if update.slot >= next_slot[idx] {
                        self.forward(origin, queue, self.record(origin, &update.receipts));
                        next_slot[idx] = update.slot + 1;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Messenger lagged {} blocks behind {}, rebuilding from receipts",
                        skipped,
                        origin
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    let head = self.endpoint(origin).state.current_slot();
                    self.catch_up(origin, &mut next_slot[idx], head, queue);
                    open[idx] = false;
                }
            }
        }
    }

    /// Record every block of `origin` from `next` up to, not including, `until`
    fn catch_up(
        &self,
        origin: Layer,
        next: &mut Slot,
        until: Slot,
        queue: &mpsc::UnboundedSender<Delivery>,
    ) {
        let receipts = &self.endpoint(origin).state.receipts;
        while *next < until {
            let block = receipts.at_slot(*next);
            if !block.is_empty() {
                tracing::debug!("Recovered {} block {} from receipts", origin, next);
                self.forward(origin, queue, self.record(origin, &block));
            }
            *next += 1;
        }
    }

    /// Queue deliveries; returns how many were accepted
    fn forward(
        &self,
        origin: Layer,
        queue: &mpsc::UnboundedSender<Delivery>,
        deliveries: Vec<Delivery>,
    ) -> usize {
        let mut queued = 0;
        for delivery in deliveries {
            match queue.send(delivery) {
                Ok(()) => queued += 1,
                Err(e) => tracing::error!(
                    "Delivery queue for {} messages closed, message {} dropped",
                    Direction::from_origin(origin),
                    e.0.message_id
                ),
            }
        }
        queued
    }

    /// Assign ids to every message in a block
    fn record(&self, origin: Layer, receipts: &[Receipt]) -> Vec<Delivery> {
        let direction = Direction::from_origin(origin);
        let ready_at = Instant::now() + self.relay_delay;
        let mut deliveries = Vec::new();

        for receipt in receipts.iter().filter(|r| r.is_success()) {
            for (index, message) in receipt.messages.iter().enumerate() {
                let message_id = MessageId::derive(direction, &receipt.tx_hash, index as u32);
                if index == 0 {
                    self.message_ids
                        .insert((direction, receipt.tx_hash), message_id);
                }

                tracing::debug!(
                    "{} message {} from tx {}",
                    direction,
                    message_id,
                    receipt.tx_hash
                );

                deliveries.push(Delivery {
                    message_id,
                    ready_at,
                    xdomain_sender: message.sender,
                    data: message.data.clone(),
                });
            }
        }

        deliveries
    }

    async fn deliver(&self, destination: Layer, mut queue: mpsc::UnboundedReceiver<Delivery>) {
        while let Some(delivery) = queue.recv().await {
            tokio::time::sleep_until(delivery.ready_at).await;

            match self.relay(destination, &delivery).await {
                Ok(tx_hash) => {
                    self.relayed.insert(delivery.message_id, tx_hash);
                }
                Err(e) => tracing::error!(
                    "Failed to relay message {} to {}: {}",
                    delivery.message_id,
                    destination,
                    e
                ),
            }
        }
    }

    /// Submit the relay transaction, waiting while the queue is full
    async fn relay(&self, destination: Layer, delivery: &Delivery) -> Result<TxHash, String> {
        let call = CrossDomainCall::from_bytes(&delivery.data)
            .map_err(|e| format!("undecodable message: {}", e))?;
        let endpoint = self.endpoint(destination);

        let mut tx = Transaction::new(
            endpoint.address,
            self.nonce.fetch_add(1, Ordering::Relaxed),
            PoolInstruction::RelayMessage {
                message_id: delivery.message_id,
                xdomain_sender: delivery.xdomain_sender,
                call,
            }
            .to_bytes(),
        );

        let mut backoff = QUEUE_RETRY_MIN;
        loop {
            match endpoint.sender.try_submit(tx) {
                Ok(tx_hash) => return Ok(tx_hash),
                Err(TrySendError::Full(returned)) => {
                    tracing::debug!(
                        "{} queue full, retrying message {} in {:?}",
                        destination,
                        delivery.message_id,
                        backoff
                    );
                    tx = returned;
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2).min(QUEUE_RETRY_MAX);
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(format!("{} transaction queue closed", destination));
                }
            }
        }
    }
}

#[async_trait]
impl MessageRelay for LocalMessenger {
    async fn message_id_of(
        &self,
        direction: Direction,
        origin_tx: &TxHash,
    ) -> Result<Lookup<MessageId>, ClientError> {
        Ok(match self.message_ids.get(&(direction, *origin_tx)) {
            Some(id) => Lookup::Ready(*id.value()),
            None => Lookup::Pending,
        })
    }

    async fn destination_receipt_of(
        &self,
        direction: Direction,
        message_id: &MessageId,
    ) -> Result<Lookup<Receipt>, ClientError> {
        let Some(tx_hash) = self.relayed.get(message_id).map(|r| *r.value()) else {
            return Ok(Lookup::Pending);
        };

        let receipts = &self.endpoint(direction.destination()).state.receipts;
        Ok(match receipts.get(&tx_hash) {
            Some(receipt) => Lookup::Ready(receipt),
            None => Lookup::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::{DevnetConfig, LocalDevnet};
    use bridge_types::{OutboundMessage, TxStatus};
    use solana_program::hash::Hash;

    fn block(messages: usize, status: TxStatus) -> Vec<Receipt> {
        let message = OutboundMessage {
            sender: Pubkey::new_unique(),
            target: Pubkey::new_unique(),
            data: vec![1, 2, 3],
        };
        vec![Receipt {
            tx_hash: Hash::new_unique(),
            slot: 0,
            status,
            messages: vec![message; messages],
        }]
    }

    #[test]
    fn test_record_skips_failed_and_indexes_first_message() {
        let devnet = LocalDevnet::new(&DevnetConfig::new(Pubkey::new_unique())).unwrap();
        let messenger = &devnet.messenger;

        let receipts = block(2, TxStatus::Success);
        let deliveries = messenger.record(Layer::L2, &receipts);
        assert_eq!(deliveries.len(), 2);
        assert_eq!(
            *messenger
                .message_ids
                .get(&(Direction::L2ToL1, receipts[0].tx_hash))
                .unwrap(),
            deliveries[0].message_id
        );
        assert_ne!(deliveries[0].message_id, deliveries[1].message_id);

        assert!(messenger
            .record(Layer::L2, &block(1, TxStatus::Failed { code: 1 }))
            .is_empty());
    }

    #[test]
    fn test_forward_reports_closed_queue() {
        let devnet = LocalDevnet::new(&DevnetConfig::new(Pubkey::new_unique())).unwrap();
        let messenger = &devnet.messenger;

        let (queue, mut receiver) = mpsc::unbounded_channel();
        let deliveries = messenger.record(Layer::L1, &block(2, TxStatus::Success));
        assert_eq!(messenger.forward(Layer::L1, &queue, deliveries), 2);
        assert!(receiver.try_recv().is_ok());

        drop(receiver);
        let deliveries = messenger.record(Layer::L1, &block(1, TxStatus::Success));
        assert_eq!(messenger.forward(Layer::L1, &queue, deliveries), 0);
    }
}
