//! 📜 bottle: lines of poetry go in one topic at a time, whole poems come out.
//!
//! Fragments arrive on per-topic broker queues. Each topic keeps a basket that fills up
//! to a randomly drawn number of lines, and the moment it's full, the lines become a
//! poem and the poem goes to the sink. Then a new number is drawn and it starts over.
//!
//! 🦆 A message in a bottle, except the bottle is a queue and the message is iambic.

pub mod accumulator;
pub mod app_config;
pub(crate) mod backends;
pub mod common;
pub mod report;
mod supervisors;
pub mod topics;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app_config::AppConfig;
use crate::backends::{Broker, BrokerBackend, PoemSink, SinkBackend};
use crate::report::TopicReport;
use crate::supervisors::Supervisor;
use crate::topics::TopicRegistry;

/// 🚀 Build everything the config asks for, run until the broker closes, report.
///
/// Only startup can fail: config, broker, sink, queue declarations. Once the workers
/// are running, every failure is per message and ends up in the reports instead.
pub async fn run(app_config: AppConfig) -> Result<Vec<TopicReport>> {
    app_config.validate()?;
    let registry = TopicRegistry::from_config(&app_config.topics)?;
    let broker = BrokerBackend::from_config(app_config.broker_config.clone()).await?;
    let sink = SinkBackend::from_config(app_config.sink_config.clone()).await?;
    run_with(app_config, registry, broker, sink).await
}

async fn run_with(
    app_config: AppConfig,
    registry: TopicRegistry,
    broker: BrokerBackend,
    sink: SinkBackend,
) -> Result<Vec<TopicReport>> {
    let registry = Arc::new(registry);
    sink.prepare(&registry.tables())
        .await
        .context("💀 The sink would not set up its tables")?;

    let crew = Supervisor::new(registry.clone(), app_config.runtime.clone())
        .start_workers(&broker, Arc::new(sink))
        .await?;
    info!("🎬 {} topic worker(s) running", registry.len());

    // 🛑 Ctrl-C closes the queues. Workers drain what's already queued and clock out.
    let shutdown_broker = broker.clone();
    let shutdown = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, closing the queues and draining");
            shutdown_broker.close().await;
        }
    });

    let fed = broker.open_feed(&registry).await;
    if fed.is_err() {
        // -- the workers would otherwise wait on queues nobody will ever feed or close
        broker.close().await;
    }
    let reports = crew.join().await;
    shutdown.abort();
    fed.context("💀 The broker feed failed")?;

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{BrokerConfig, FileBrokerConfig, RuntimeConfig, SinkConfig, TopicConfig};
    use crate::backends::in_mem::InMemoryPoemSink;
    use std::io::Write;

    #[tokio::test]
    async fn the_one_where_a_file_of_fragments_becomes_poems_end_to_end() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        for (author, content, topic) in [
            (1, "line one", "Nature"),
            (7, "roses", "Love"),
            (2, "line two", "Nature"),
            (1, "line three", "Nature"),
            (9, "violets", "Love"),
        ] {
            writeln!(file, r#"{{"author":{author},"content":"{content}","topic":"{topic}"}}"#)?;
        }
        writeln!(file, r#"{{"author":3,"content":"","topic":"Nature"}}"#)?;

        let app_config = AppConfig {
            topics: vec![
                TopicConfig {
                    name: "Nature".to_string(),
                    queue: None,
                    table: None,
                },
                TopicConfig {
                    name: "Love".to_string(),
                    queue: None,
                    table: Some("love_poems".to_string()),
                },
            ],
            runtime: RuntimeConfig {
                min_lines: 3,
                max_lines: 3,
                prefetch_count: 10,
                seed: Some(42),
            },
            broker_config: BrokerConfig::File(FileBrokerConfig {
                file_name: file.path().display().to_string(),
            }),
            sink_config: SinkConfig::InMemory,
        };
        let registry = TopicRegistry::from_config(&app_config.topics)?;
        let broker = BrokerBackend::from_config(app_config.broker_config.clone()).await?;
        let memory = InMemoryPoemSink::new();

        let mut reports = run_with(app_config, registry, broker, SinkBackend::InMemory(memory.clone())).await?;
        reports.sort_by(|a, b| a.topic.cmp(&b.topic));

        let poems = memory.poems().await;
        assert_eq!(poems.len(), 1);
        assert_eq!(poems[0].table, "Nature");
        assert_eq!(poems[0].poem.content, "line one\nline two\nline three");

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].topic, "Love");
        assert_eq!(reports[0].partial_discarded, 2);
        assert_eq!(reports[1].topic, "Nature");
        assert_eq!(reports[1].poems_stored, 1);
        assert_eq!(reports[1].malformed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_bad_range_never_gets_off_the_ground() {
        let app_config = AppConfig {
            topics: vec![TopicConfig {
                name: "Nature".to_string(),
                queue: None,
                table: None,
            }],
            runtime: RuntimeConfig {
                min_lines: 9,
                max_lines: 2,
                ..RuntimeConfig::default()
            },
            broker_config: BrokerConfig::InMemory,
            sink_config: SinkConfig::InMemory,
        };
        assert!(run(app_config).await.is_err());
    }
}
