use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app_config::SinkConfig;
use crate::backends::{file, http, in_mem};
use crate::common::Poem;

/// 🗄️ A sink that persists finished poems, pure I/O, zero logic.
///
/// # Contract 📜
/// - `prepare` runs once at startup with every table the topics map to. Idempotent:
///   "create if not exists", never "drop and recreate".
/// - `store` writes one poem into one table and says where it landed. Several topic
///   workers call it at the same time, so implementations take `&self` and handle their
///   own locking.
/// - A failed `store` is the caller's problem to log. Sinks do not retry.
#[async_trait]
pub(crate) trait PoemSink: std::fmt::Debug + Send + Sync {
    async fn prepare(&self, tables: &[String]) -> Result<()>;
    async fn store(&self, table: &str, poem: Poem) -> Result<PoemReceipt>;
}

/// 🧾 Where a poem ended up. `id` is `None` when the storage didn't tell us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PoemReceipt {
    pub(crate) table: String,
    pub(crate) id: Option<u64>,
}

/// 📜 The storage row shape: auto id, text blob, timestamp, serialized author ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PoemRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) poem_id: Option<u64>,
    pub(crate) content: String,
    pub(crate) time_stamp: DateTime<Utc>,
    pub(crate) author_ids: Vec<u64>,
}

impl PoemRow {
    pub(crate) fn new(poem: &Poem, poem_id: Option<u64>) -> Self {
        Self {
            poem_id,
            content: poem.content.clone(),
            time_stamp: poem.created_at,
            author_ids: poem.authors.iter().copied().collect(),
        }
    }
}

/// 🎭 The many faces of a Sink.
#[derive(Debug)]
pub(crate) enum SinkBackend {
    InMemory(in_mem::InMemoryPoemSink),
    File(file::FilePoemSink),
    Http(http::HttpPoemSink),
}

impl SinkBackend {
    pub(crate) async fn from_config(config: SinkConfig) -> Result<Self> {
        let backend = match config {
            SinkConfig::InMemory => SinkBackend::InMemory(in_mem::InMemoryPoemSink::new()),
            SinkConfig::File(file_config) => SinkBackend::File(
                file::FilePoemSink::new(file_config)
                    .await
                    .context("💀 Could not set up the file poem sink")?,
            ),
            SinkConfig::Http(http_config) => SinkBackend::Http(
                http::HttpPoemSink::new(http_config)
                    .context("💀 Could not set up the HTTP poem sink")?,
            ),
        };
        Ok(backend)
    }
}

#[async_trait]
impl PoemSink for SinkBackend {
    async fn prepare(&self, tables: &[String]) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.prepare(tables).await,
            SinkBackend::File(sink) => sink.prepare(tables).await,
            SinkBackend::Http(sink) => sink.prepare(tables).await,
        }
    }

    async fn store(&self, table: &str, poem: Poem) -> Result<PoemReceipt> {
        match self {
            SinkBackend::InMemory(sink) => sink.store(table, poem).await,
            SinkBackend::File(sink) => sink.store(table, poem).await,
            SinkBackend::Http(sink) => sink.store(table, poem).await,
        }
    }
}
