use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow};
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::app_config::BrokerConfig;
use crate::backends::{file, in_mem};
use crate::topics::TopicRegistry;

/// 📮 The broker boundary: named durable queues, one consumer stream per queue.
///
/// # Contract 📜
/// - `declare_queue` is idempotent. Declaring twice hands out a second stream on the same queue.
/// - Each stream holds at most `prefetch` unsettled deliveries at once.
/// - Every [`Delivery`] must be settled with `ack` or `reject`. One that is dropped
///   unsettled goes back on its queue marked redelivered. At-least-once, not exactly-once.
/// - `close` closes every queue. Consumers still drain what was already queued, then see
///   the end of their stream.
/// - `open_feed` starts whatever producer the backend carries with it, if any.
#[async_trait]
pub(crate) trait Broker: std::fmt::Debug + Send + Sync {
    async fn declare_queue(&self, queue: &str, prefetch: usize) -> Result<DeliveryStream>;
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<()>;
    async fn open_feed(&self, registry: &TopicRegistry) -> Result<()>;
    async fn close(&self);
}

/// 🎭 The many faces of a Broker.
#[derive(Debug, Clone)]
pub(crate) enum BrokerBackend {
    InMemory(in_mem::InMemoryBroker),
    File(file::FileBroker),
}

impl BrokerBackend {
    pub(crate) async fn from_config(config: BrokerConfig) -> Result<Self> {
        match config {
            BrokerConfig::InMemory => Ok(BrokerBackend::InMemory(in_mem::InMemoryBroker::new())),
            BrokerConfig::File(file_config) => Ok(BrokerBackend::File(
                file::FileBroker::new(file_config)
                    .await
                    .context("💀 Could not set up the file replay broker")?,
            )),
        }
    }
}

#[async_trait]
impl Broker for BrokerBackend {
    async fn declare_queue(&self, queue: &str, prefetch: usize) -> Result<DeliveryStream> {
        match self {
            BrokerBackend::InMemory(b) => b.declare_queue(queue, prefetch).await,
            BrokerBackend::File(b) => b.declare_queue(queue, prefetch).await,
        }
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        match self {
            BrokerBackend::InMemory(b) => b.publish(queue, payload).await,
            BrokerBackend::File(b) => b.publish(queue, payload).await,
        }
    }

    async fn open_feed(&self, registry: &TopicRegistry) -> Result<()> {
        match self {
            BrokerBackend::InMemory(b) => b.open_feed(registry).await,
            BrokerBackend::File(b) => b.open_feed(registry).await,
        }
    }

    async fn close(&self) {
        match self {
            BrokerBackend::InMemory(b) => b.close().await,
            BrokerBackend::File(b) => b.close().await,
        }
    }
}

// ============================================================
// 📦 Envelopes, settlements, and the ledger that counts them
// ============================================================

/// 📦 A payload sitting in a queue.
#[derive(Debug, Clone)]
pub(crate) struct Envelope {
    pub(crate) payload: Vec<u8>,
    pub(crate) redelivered: bool,
}

impl Envelope {
    pub(crate) fn fresh(payload: Vec<u8>) -> Self {
        Self {
            payload,
            redelivered: false,
        }
    }
}

/// ✅ or 🗑️, what the consumer decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Acked,
    Rejected { requeue: bool },
}

/// 🧾 One settled delivery, as the test ledger remembers it.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct Settlement {
    pub(crate) queue: String,
    pub(crate) payload: Vec<u8>,
    pub(crate) redelivered: bool,
    pub(crate) outcome: Outcome,
}

/// 📊 Settlement totals at one moment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SettlementTotals {
    pub(crate) acked: u64,
    pub(crate) rejected: u64,
    pub(crate) requeued: u64,
}

/// 🧾 Every ack and reject, as running totals.
///
/// Counters only: the ledger is the same size after ten messages and after ten million.
/// Test builds also keep each settlement so tests can see which message got which verdict.
#[derive(Debug, Default)]
pub(crate) struct SettlementLedger {
    acked: AtomicU64,
    rejected: AtomicU64,
    requeued: AtomicU64,
    #[cfg(test)]
    history: tokio::sync::Mutex<Vec<Settlement>>,
}

impl SettlementLedger {
    async fn record(&self, queue: &str, envelope: Envelope, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Acked => &self.acked,
            Outcome::Rejected { requeue: false } => &self.rejected,
            Outcome::Rejected { requeue: true } => &self.requeued,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        #[cfg(test)]
        self.history.lock().await.push(Settlement {
            queue: queue.to_string(),
            payload: envelope.payload,
            redelivered: envelope.redelivered,
            outcome,
        });
        #[cfg(not(test))]
        let _ = (queue, envelope);
    }

    pub(crate) fn totals(&self) -> SettlementTotals {
        SettlementTotals {
            acked: self.acked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    pub(crate) async fn history(&self) -> Vec<Settlement> {
        self.history.lock().await.clone()
    }
}

pub(crate) type Ledger = Arc<SettlementLedger>;

// ============================================================
// 🚰 DeliveryStream and Delivery
// ============================================================

/// 🚰 One consumer's view of one queue.
#[derive(Debug)]
pub(crate) struct DeliveryStream {
    queue: String,
    rx: Receiver<Envelope>,
    requeue_tx: Sender<Envelope>,
    prefetch: Arc<Semaphore>,
    ledger: Ledger,
}

impl DeliveryStream {
    pub(crate) fn new(
        queue: impl Into<String>,
        rx: Receiver<Envelope>,
        requeue_tx: Sender<Envelope>,
        prefetch: usize,
        ledger: Ledger,
    ) -> Self {
        Self {
            queue: queue.into(),
            rx,
            requeue_tx,
            prefetch: Arc::new(Semaphore::new(prefetch)),
            ledger,
        }
    }

    pub(crate) fn queue(&self) -> &str {
        &self.queue
    }

    /// ⏳ Wait for the next delivery. `None` once the queue is closed and drained.
    ///
    /// Blocks first on a prefetch slot, then on the queue itself. No polling.
    pub(crate) async fn next(&mut self) -> Option<Delivery> {
        let permit = self.prefetch.clone().acquire_owned().await.ok()?;
        let envelope = self.rx.recv().await.ok()?;
        Some(Delivery {
            queue: self.queue.clone(),
            envelope: Some(envelope),
            requeue_tx: self.requeue_tx.clone(),
            ledger: self.ledger.clone(),
            _permit: permit,
        })
    }
}

/// 📨 One message in a consumer's hands, waiting for a verdict.
///
/// Holding it holds one prefetch slot. Settling (or dropping) it gives the slot back.
#[derive(Debug)]
pub(crate) struct Delivery {
    queue: String,
    // -- Some until settled. Drop looks at this to decide whether to requeue.
    envelope: Option<Envelope>,
    requeue_tx: Sender<Envelope>,
    ledger: Ledger,
    _permit: OwnedSemaphorePermit,
}

impl Delivery {
    pub(crate) fn payload(&self) -> &[u8] {
        self.envelope
            .as_ref()
            .map(|envelope| envelope.payload.as_slice())
            .unwrap_or_default()
    }

    pub(crate) fn redelivered(&self) -> bool {
        self.envelope
            .as_ref()
            .is_some_and(|envelope| envelope.redelivered)
    }

    /// ✅ Processed. Forget about it.
    pub(crate) async fn ack(mut self) -> Result<()> {
        self.settle(Outcome::Acked).await
    }

    /// 🗑️ Not processed. With `requeue` it goes back on the queue, without it it is gone.
    pub(crate) async fn reject(mut self, requeue: bool) -> Result<()> {
        self.settle(Outcome::Rejected { requeue }).await
    }

    async fn settle(&mut self, outcome: Outcome) -> Result<()> {
        let envelope = self
            .envelope
            .take()
            .ok_or_else(|| anyhow!("💀 delivery on '{}' was already settled", self.queue))?;

        let requeued = match outcome {
            Outcome::Rejected { requeue: true } => self
                .requeue_tx
                .try_send(Envelope {
                    payload: envelope.payload.clone(),
                    redelivered: true,
                })
                .map_err(|_| {
                    anyhow!(
                        "💀 queue '{}' is closed, the rejected message could not be requeued",
                        self.queue
                    )
                }),
            _ => Ok(()),
        };

        self.ledger.record(&self.queue, envelope, outcome).await;
        requeued
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        // -- unsettled means the consumer died holding it, the broker takes it back
        if let Some(envelope) = self.envelope.take() {
            let requeued = self.requeue_tx.try_send(Envelope {
                payload: envelope.payload,
                redelivered: true,
            });
            if requeued.is_err() {
                warn!(
                    "⚠️ an unsettled delivery on '{}' was dropped after its queue closed, it is gone",
                    self.queue
                );
            }
        }
    }
}
