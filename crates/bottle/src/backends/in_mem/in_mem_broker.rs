use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backends::Broker;
use crate::backends::broker::{DeliveryStream, Envelope, Ledger};
use crate::topics::TopicRegistry;

#[derive(Debug, Clone)]
struct Queue {
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self { tx, rx }
    }
}

/// 📮 Named queues in RAM. Clone it freely, every clone talks to the same queues.
///
/// Queues spring into existence on first `declare_queue` *or* first `publish`, so a
/// producer that shows up before the consumer doesn't lose anything. Durable, for as
/// long as the process is.
#[derive(Debug, Clone, Default)]
pub(crate) struct InMemoryBroker {
    queues: Arc<Mutex<HashMap<String, Queue>>>,
    ledger: Ledger,
    closed: Arc<AtomicBool>,
}

impl InMemoryBroker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    async fn queue(&self, name: &str) -> Result<Queue> {
        if self.is_closed() {
            bail!("💀 broker is closed, queue '{name}' is not taking visitors");
        }
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(name.to_string()).or_insert_with(|| {
            debug!("📮 declared queue '{name}'");
            Queue::new()
        });
        Ok(queue.clone())
    }

    /// 🚪 True once `close` ran. Closed stays closed.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[cfg(test)]
    /// 🧾 Every ack and reject so far, oldest first.
    pub(crate) async fn settlements(&self) -> Vec<crate::backends::broker::Settlement> {
        self.ledger.history().await
    }

    #[cfg(test)]
    /// 📏 Messages sitting in `queue`, not yet handed to a consumer.
    pub(crate) async fn depth(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map_or(0, |queue| queue.rx.len())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_queue(&self, queue: &str, prefetch: usize) -> Result<DeliveryStream> {
        let Queue { tx, rx } = self.queue(queue).await?;
        Ok(DeliveryStream::new(queue, rx, tx, prefetch, self.ledger.clone()))
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        let Queue { tx, .. } = self.queue(queue).await?;
        if tx.send(Envelope::fresh(payload)).await.is_err() {
            bail!("💀 queue '{queue}' closed while we were publishing to it");
        }
        Ok(())
    }

    async fn open_feed(&self, _registry: &TopicRegistry) -> Result<()> {
        // -- whoever shares this process publishes directly, there is no feed to open
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let queues = self.queues.lock().await;
        for (name, queue) in queues.iter() {
            queue.tx.close();
            debug!("🚪 closed queue '{name}' with {} message(s) left to drain", queue.rx.len());
        }
        let totals = self.ledger.totals();
        info!(
            "🚪 in-memory broker closed {} queue(s) after {} ack(s), {} reject(s), {} requeue(s)",
            queues.len(),
            totals.acked,
            totals.rejected,
            totals.requeued
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::broker::{Outcome, SettlementTotals};
    use std::time::Duration;

    #[tokio::test]
    async fn the_one_where_early_messages_wait_for_their_consumer() -> Result<()> {
        let broker = InMemoryBroker::new();
        broker.publish("poem_love", b"first".to_vec()).await?;
        assert_eq!(broker.depth("poem_love").await, 1);

        let mut stream = broker.declare_queue("poem_love", 10).await?;
        let delivery = stream.next().await.expect("the early message is still there");
        assert_eq!(delivery.payload(), b"first");
        assert!(!delivery.redelivered());
        delivery.ack().await?;

        let settlements = broker.settlements().await;
        assert_eq!(settlements.len(), 1);
        assert_eq!(settlements[0].outcome, Outcome::Acked);
        assert_eq!(settlements[0].queue, "poem_love");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_prefetch_keeps_the_consumer_on_a_short_leash() -> Result<()> {
        let broker = InMemoryBroker::new();
        for payload in [b"a", b"b"] {
            broker.publish("q", payload.to_vec()).await?;
        }
        let mut stream = broker.declare_queue("q", 1).await?;

        let held = stream.next().await.expect("first delivery");
        let blocked = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(blocked.is_err(), "second delivery must wait for a prefetch slot");

        held.ack().await?;
        let second = stream.next().await.expect("slot freed, second delivery flows");
        assert_eq!(second.payload(), b"b");
        second.ack().await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_dropped_delivery_comes_back_redelivered() -> Result<()> {
        let broker = InMemoryBroker::new();
        broker.publish("q", b"fragile".to_vec()).await?;
        let mut stream = broker.declare_queue("q", 10).await?;

        let delivery = stream.next().await.expect("delivery");
        drop(delivery);

        let again = stream.next().await.expect("the broker took it back");
        assert_eq!(again.payload(), b"fragile");
        assert!(again.redelivered());
        again.ack().await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_reject_without_requeue_is_final() -> Result<()> {
        let broker = InMemoryBroker::new();
        broker.publish("q", b"bad".to_vec()).await?;
        broker.publish("q", b"retry me".to_vec()).await?;
        let mut stream = broker.declare_queue("q", 10).await?;

        stream.next().await.expect("bad").reject(false).await?;
        stream.next().await.expect("retry").reject(true).await?;
        assert_eq!(broker.depth("q").await, 1, "only the requeued one is back");

        let settlements = broker.settlements().await;
        assert_eq!(settlements[0].outcome, Outcome::Rejected { requeue: false });
        assert_eq!(settlements[1].outcome, Outcome::Rejected { requeue: true });
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_close_lets_consumers_drain_then_says_goodbye() -> Result<()> {
        let broker = InMemoryBroker::new();
        let mut stream = broker.declare_queue("q", 10).await?;
        broker.publish("q", b"last words".to_vec()).await?;
        broker.close().await;

        let delivery = stream.next().await.expect("buffered message survives close");
        delivery.ack().await?;
        assert!(stream.next().await.is_none());
        assert!(broker.publish("q", b"too late".to_vec()).await.is_err());
        assert!(broker.declare_queue("other", 1).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_ledger_counts_instead_of_hoarding() -> Result<()> {
        let broker = InMemoryBroker::new();
        let mut stream = broker.declare_queue("q", 10).await?;
        let payload = vec![b'x'; 1024];
        for round in 0..300 {
            broker.publish("q", payload.clone()).await?;
            let delivery = stream.next().await.expect("just published");
            if round % 3 == 0 {
                delivery.reject(false).await?;
            } else {
                delivery.ack().await?;
            }
        }
        broker.publish("q", b"once more".to_vec()).await?;
        stream.next().await.expect("retry").reject(true).await?;
        stream.next().await.expect("requeued").ack().await?;

        assert_eq!(
            broker.ledger.totals(),
            SettlementTotals {
                acked: 201,
                rejected: 100,
                requeued: 1,
            }
        );
        Ok(())
    }
}
