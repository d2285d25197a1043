use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::backends::Broker;
use crate::backends::broker::DeliveryStream;
use crate::backends::in_mem::InMemoryBroker;
use crate::topics::TopicRegistry;

// -- 📂 FileBrokerConfig lives right next to the FileBroker that uses it.
#[derive(Debug, Deserialize, Clone)]
pub struct FileBrokerConfig {
    /// 📄 NDJSON, one fragment payload per line.
    pub file_name: String,
}

/// 📊 What a replay did with the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ReplayStats {
    pub(crate) published: usize,
    pub(crate) unroutable: usize,
    /// 🛑 The queues were closed under us (Ctrl-C) before the file ran out.
    pub(crate) interrupted: bool,
}

/// 📂 FileBroker: a producer and a broker in one trench coat.
///
/// Queues are the in-memory kind. `open_feed` reads the whole file, drops every line on
/// the queue of the topic it names, then closes the broker: workers drain what they were
/// given and the process winds down on its own.
///
/// 🧠 Routing only peeks at `topic`. Full validation is the worker's job, so a line with
/// a good topic and a bad body still reaches its worker and gets rejected there, exactly
/// like a bad message from a real producer would.
#[derive(Debug, Clone)]
pub(crate) struct FileBroker {
    queues: InMemoryBroker,
    config: FileBrokerConfig,
}

#[derive(Deserialize)]
struct TopicPeek {
    topic: String,
}

impl FileBroker {
    /// 🚀 Checks the file is there now rather than after every worker has started.
    pub(crate) async fn new(config: FileBrokerConfig) -> Result<Self> {
        tokio::fs::metadata(&config.file_name).await.context(format!(
            "💀 The fragment file '{}' would not budge. We knocked. We pleaded. \
             We checked if it existed (it might not). The door remained closed.",
            config.file_name
        ))?;
        Ok(Self {
            queues: InMemoryBroker::new(),
            config,
        })
    }

    pub(crate) async fn replay(&self, registry: &TopicRegistry) -> Result<ReplayStats> {
        let bytes = tokio::fs::read(&self.config.file_name)
            .await
            .context(format!("💀 Could not read fragment file '{}'", self.config.file_name))?;

        let mut stats = ReplayStats::default();
        let mut start = 0;
        // -- 🔍 memchr finds the newlines, we do the rest
        let ends = memchr::memchr_iter(b'\n', &bytes).chain(std::iter::once(bytes.len()));
        for (line_number, end) in ends.enumerate() {
            let line = &bytes[start..end];
            start = (end + 1).min(bytes.len());
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let route = serde_json::from_slice::<TopicPeek>(line)
                .ok()
                .and_then(|peek| registry.route(&peek.topic));
            match route {
                Some(route) => {
                    if let Err(err) = self.queues.publish(&route.queue, line.to_vec()).await {
                        if self.queues.is_closed() {
                            // -- shutdown beat us to the end of the file, that's a drain, not a failure
                            warn!(
                                "🛑 queues closed during replay of '{}', stopping at line {}",
                                self.config.file_name,
                                line_number + 1
                            );
                            stats.interrupted = true;
                            break;
                        }
                        return Err(err);
                    }
                    stats.published += 1;
                }
                None => {
                    warn!(
                        "⚠️ line {} of '{}' names no known topic, skipping it",
                        line_number + 1,
                        self.config.file_name
                    );
                    stats.unroutable += 1;
                }
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl Broker for FileBroker {
    async fn declare_queue(&self, queue: &str, prefetch: usize) -> Result<DeliveryStream> {
        self.queues.declare_queue(queue, prefetch).await
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        self.queues.publish(queue, payload).await
    }

    async fn open_feed(&self, registry: &TopicRegistry) -> Result<()> {
        let replayed = self.replay(registry).await;
        // -- close even when the replay failed halfway, or the workers wait forever
        self.close().await;
        let stats = replayed?;
        info!(
            "📂 replayed '{}'{}: {} fragment(s) queued, {} unroutable line(s) skipped",
            self.config.file_name,
            if stats.interrupted { " (cut short by shutdown)" } else { "" },
            stats.published,
            stats.unroutable
        );
        Ok(())
    }

    async fn close(&self) {
        self.queues.close().await;
    }
}
