//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where every topic wanted its own poet..."
//! 🎬 "One supervisor dared to hire them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor: declares every topic's queue, builds every topic's basket, and
//! starts one worker per topic. Then it waits for them to clock out.
//!
//! ⚠️ DO NOT MAKE THIS PUB EVER
//! 💀 WORKERS ARE THE SUPERVISOR'S PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT

mod workers;

use std::sync::Arc;

use anyhow::{Context, Result};
use rand::SeedableRng;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::accumulator::{Accumulator, TopicRng};
use crate::app_config::RuntimeConfig;
use crate::backends::{Broker, BrokerBackend, SinkBackend};
use crate::report::TopicReport;
use crate::topics::TopicRegistry;
use workers::{TopicWorker, Worker};

/// 📦 The Supervisor. Runs once, then it's gone: `start_workers` eats it.
#[derive(Debug)]
pub(crate) struct Supervisor {
    registry: Arc<TopicRegistry>,
    runtime: RuntimeConfig,
}

/// 👷 The running workers, one per topic, waiting to be joined.
#[derive(Debug)]
pub(crate) struct Crew {
    handles: Vec<(String, JoinHandle<Result<TopicReport>>)>,
}

impl Supervisor {
    pub(crate) fn new(registry: Arc<TopicRegistry>, runtime: RuntimeConfig) -> Self {
        Self { registry, runtime }
    }

    /// 🧵 Unleash the workers! One queue, one accumulator, one task per topic.
    ///
    /// With a configured seed, topic number `i` (in registry order) seeds its generator
    /// with `seed + i`, so a rerun rolls the same targets. Without one, entropy.
    pub(crate) async fn start_workers(self, broker: &BrokerBackend, sink: Arc<SinkBackend>) -> Result<Crew> {
        let range = self.runtime.target_range()?;
        info!(
            "🎲 {} topic(s) will draw poem lengths from [{}, {}]",
            self.registry.len(),
            range.min(),
            range.max()
        );
        let mut handles = Vec::with_capacity(self.registry.len());

        for (index, route) in self.registry.routes().enumerate() {
            let stream = broker
                .declare_queue(&route.queue, self.runtime.prefetch_count)
                .await
                .context(format!("💀 Could not declare queue '{}' for topic '{}'", route.queue, route.name))?;
            let rng = match self.runtime.seed {
                Some(seed) => TopicRng::seed_from_u64(seed.wrapping_add(index as u64)),
                None => TopicRng::from_entropy(),
            };
            let accumulator = Accumulator::new(route.name.clone(), range, rng);
            let worker = TopicWorker::new(
                route.clone(),
                self.registry.clone(),
                stream,
                accumulator,
                sink.clone(),
            );
            info!("🚀 topic '{}' is live on queue '{}'", route.name, route.queue);
            handles.push((route.name.clone(), worker.start()));
        }

        Ok(Crew { handles })
    }
}

impl Crew {
    /// ⏳ Wait for every worker to finish. A worker that died is logged, the rest still report.
    pub(crate) async fn join(self) -> Vec<TopicReport> {
        let (topics, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        let mut reports = Vec::with_capacity(results.len());
        for (topic, result) in topics.into_iter().zip(results) {
            match result {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(err)) => error!("💀 worker for '{topic}' gave up: {err:#}"),
                Err(join_err) => error!("💀 worker for '{topic}' crashed: {join_err}"),
            }
        }
        reports
    }
}
