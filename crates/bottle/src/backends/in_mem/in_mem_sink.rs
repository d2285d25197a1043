use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backends::PoemSink;
use crate::backends::sink::PoemReceipt;
use crate::common::Poem;

/// 📜 One poem the in-memory sink is holding on to.
#[derive(Debug, Clone)]
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) struct StoredPoem {
    pub(crate) table: String,
    pub(crate) id: u64,
    pub(crate) poem: Poem,
}

/// 📦 A sink that never forgets. Unlike my dad, who forgot my soccer game in 1998.
///
/// Clone-able because tests need to peek inside after handing a copy to the workers.
/// The `Arc`s mean every clone shares the same shelf.
///
/// 🔧 `fail_stores(true)` makes every following `store` fail, for watching the engine
/// cope with a storage outage without actually unplugging anything.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryPoemSink {
    stored: Arc<Mutex<Vec<StoredPoem>>>,
    failing: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
    // -- while held, each store parks until `release_one`
    #[cfg(test)]
    held: Arc<AtomicBool>,
    #[cfg(test)]
    gate: Arc<tokio::sync::Notify>,
}

impl InMemoryPoemSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn fail_stores(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn hold_stores(&self) {
        self.held.store(true, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn release_one(&self) {
        self.gate.notify_one();
    }

    #[cfg(test)]
    /// 🔢 Every `store` call, failed ones included.
    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) async fn poems(&self) -> Vec<StoredPoem> {
        self.stored.lock().await.clone()
    }
}

#[async_trait]
impl PoemSink for InMemoryPoemSink {
    async fn prepare(&self, tables: &[String]) -> Result<()> {
        debug!("🧠 in-memory sink has room for {} table(s), it always does", tables.len());
        Ok(())
    }

    async fn store(&self, table: &str, poem: Poem) -> Result<PoemReceipt> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        #[cfg(test)]
        if self.held.load(Ordering::Acquire) {
            self.gate.notified().await;
        }
        if self.failing.load(Ordering::Acquire) {
            bail!("💀 in-memory sink was told to fail, and it is a very obedient sink");
        }

        // 🔒 The Mutex is load-bearing. Several topic workers store at once.
        let mut stored = self.stored.lock().await;
        let id = stored.iter().filter(|row| row.table == table).count() as u64 + 1;
        stored.push(StoredPoem {
            table: table.to_string(),
            id,
            poem,
        });
        Ok(PoemReceipt {
            table: table.to_string(),
            id: Some(id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn the_one_where_each_table_counts_its_own_ids() -> Result<()> {
        let sink = InMemoryPoemSink::new();
        let poem = |topic: &str| Poem::new(topic, &["x".to_string()], BTreeSet::from([1]));

        assert_eq!(sink.store("Love", poem("Love")).await?.id, Some(1));
        assert_eq!(sink.store("Death", poem("Death")).await?.id, Some(1));
        assert_eq!(sink.store("Love", poem("Love")).await?.id, Some(2));
        assert_eq!(sink.poems().await.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_sink_is_told_to_fail_and_does() -> Result<()> {
        let sink = InMemoryPoemSink::new();
        sink.fail_stores(true);
        let poem = Poem::new("Love", &["x".to_string()], BTreeSet::from([1]));
        assert!(sink.store("Love", poem.clone()).await.is_err());
        assert!(sink.poems().await.is_empty());

        sink.fail_stores(false);
        sink.store("Love", poem).await?;
        assert_eq!(sink.attempts(), 2);
        assert_eq!(sink.poems().await.len(), 1);
        Ok(())
    }
}
