//! 🎬 *[a queue fills with lines of poetry. somewhere, a basket waits.]*
//! *[the clock on the wall reads 2:47am. the poets are still typing.]*
//!
//! 🧺 The TopicWorker: one topic, one queue, one accumulator, one loop. It takes a
//! delivery, decides what it is, feeds the basket, ships the poem when the basket is
//! full, and settles the delivery. Then it does it again. Until the queue closes.
//!
//! ⚠️ A bad message never stops the loop. It gets rejected, counted, and forgotten.

use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Worker;
use crate::accumulator::Accumulator;
use crate::backends::{Delivery, DeliveryStream, PoemSink, SinkBackend};
use crate::common::{Fragment, Poem};
use crate::report::TopicReport;
use crate::topics::{TopicRegistry, TopicRoute};

/// 🧺 One topic's consumer. Owns its stream and its accumulator, borrows nobody's.
#[derive(Debug)]
pub(crate) struct TopicWorker {
    route: TopicRoute,
    registry: Arc<TopicRegistry>,
    stream: DeliveryStream,
    accumulator: Accumulator,
    sink: Arc<SinkBackend>,
    report: TopicReport,
}

impl TopicWorker {
    pub(crate) fn new(
        route: TopicRoute,
        registry: Arc<TopicRegistry>,
        stream: DeliveryStream,
        accumulator: Accumulator,
        sink: Arc<SinkBackend>,
    ) -> Self {
        let report = TopicReport::new(route.name.clone());
        Self {
            route,
            registry,
            stream,
            accumulator,
            sink,
            report,
        }
    }

    /// 📨 One delivery, start to settlement.
    ///
    /// Decode failures and processing faults end in a reject without requeue. Anything
    /// that decoded and belongs here is acked, after the sink call (if any) returned.
    async fn handle(&mut self, delivery: Delivery) -> Result<()> {
        if delivery.redelivered() {
            debug!("🔁 '{}' got a redelivery, processing it again", self.route.name);
        }

        let fragment = match Fragment::from_payload(delivery.payload(), &self.registry) {
            Ok(fragment) => fragment,
            Err(err) => {
                warn!(
                    "🗑️ '{}' rejected a malformed payload ({} bytes): {err:#}",
                    self.stream.queue(),
                    delivery.payload().len()
                );
                self.report.malformed += 1;
                return delivery.reject(false).await;
            }
        };

        match self.process(fragment).await {
            Ok(()) => delivery.ack().await,
            Err(err) => {
                error!("💥 '{}' failed to process a fragment: {err:#}", self.route.name);
                self.report.faulted += 1;
                delivery.reject(false).await
            }
        }
    }

    async fn process(&mut self, fragment: Fragment) -> Result<()> {
        if fragment.topic != self.route.name {
            bail!(
                "💀 a '{}' fragment showed up on '{}', which belongs to '{}'",
                fragment.topic,
                self.stream.queue(),
                self.route.name
            );
        }
        self.report.accepted += 1;
        if let Some(poem) = self.accumulator.add_fragment(fragment) {
            self.persist(poem).await;
        }
        Ok(())
    }

    /// 💾 Hand the poem to the sink. A failure is logged and counted, never retried.
    async fn persist(&mut self, poem: Poem) {
        let line_count = poem.line_count;
        let author_count = poem.authors.len();
        match self.sink.store(&self.route.table, poem).await {
            Ok(receipt) => {
                self.report.poems_stored += 1;
                let id = receipt
                    .id
                    .map(|id| format!("#{id}"))
                    .unwrap_or_else(|| "(no id)".to_string());
                info!(
                    "💾 Saved {} poem {id} in '{}' with {line_count} lines from {author_count} authors",
                    self.route.name, receipt.table
                );
            }
            Err(err) => {
                self.report.sink_failures += 1;
                error!(
                    "💀 '{}' lost a poem of {line_count} lines, the sink said no: {err:#}",
                    self.route.name
                );
            }
        }
    }
}

impl Worker for TopicWorker {
    fn start(mut self) -> JoinHandle<Result<TopicReport>> {
        tokio::spawn(async move {
            debug!("📥 TopicWorker for '{}' listening on '{}'", self.route.name, self.stream.queue());
            while let Some(delivery) = self.stream.next().await {
                self.handle(delivery).await?;
            }

            // -- 🏁 stream closed and drained. whatever is left in the basket goes nowhere.
            self.report.partial_discarded = self.accumulator.count();
            if self.report.partial_discarded > 0 {
                warn!(
                    "🧺 '{}' shut down with {} of {} lines collected, discarding them",
                    self.route.name,
                    self.accumulator.count(),
                    self.accumulator.target()
                );
            }
            debug!("🏁 TopicWorker for '{}' is done", self.route.name);
            Ok(self.report)
        })
    }
}
