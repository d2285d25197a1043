// ai
//! 🗺️ Topics: the closed set of categories poems are sorted into.
//!
//! Every topic knows three names: its own, the queue its fragments arrive on,
//! and the table its poems land in. The mapping is built once at startup from config
//! and never touched again. No runtime topic creation. No surprise topics. 🦆

use std::collections::{BTreeMap, HashSet};

use anyhow::{Result, bail};

use crate::app_config::TopicConfig;

/// 📮 Every queue name starts like this. Tradition.
pub const QUEUE_PREFIX: &str = "poem_";

/// 🎭 The topics you get when config doesn't say otherwise.
pub const DEFAULT_TOPICS: [&str; 5] = ["Love", "Death", "Nature", "Beauty", "Random"];

/// 🧭 Where one topic's fragments come from and where its poems go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRoute {
    pub name: String,
    pub queue: String,
    pub table: String,
}

impl TopicRoute {
    /// 🔧 `Nature` → queue `poem_nature`, table `Nature`.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            queue: default_queue_name(&name),
            table: name.clone(),
            name,
        }
    }
}

pub(crate) fn default_queue_name(topic: &str) -> String {
    format!("{QUEUE_PREFIX}{}", topic.to_lowercase())
}

/// 📚 The immutable topic → (queue, table) lookup.
///
/// Iteration order is the topic name order, which keeps startup logs and reports stable.
#[derive(Debug, Clone)]
pub struct TopicRegistry {
    routes: BTreeMap<String, TopicRoute>,
}

impl TopicRegistry {
    /// 🏗️ Build the registry from config, refusing anything that would let two topics
    /// share a queue or a table. Shared queues would mix fragments across topics,
    /// which is the one thing this whole service promises never to do.
    pub fn from_config(topics: &[TopicConfig]) -> Result<Self> {
        if topics.is_empty() {
            bail!("💀 No topics configured. A poetry service with no topics is just a very expensive sleep().");
        }

        let mut routes = BTreeMap::new();
        let mut queues = HashSet::new();
        let mut tables = HashSet::new();
        for topic in topics {
            let route = topic.route();
            if route.name.trim().is_empty() {
                bail!("💀 A topic with a blank name snuck into the config.");
            }
            if !queues.insert(route.queue.clone()) {
                bail!("💀 Queue '{}' is claimed by more than one topic", route.queue);
            }
            if !tables.insert(route.table.clone()) {
                bail!("💀 Table '{}' is claimed by more than one topic", route.table);
            }
            if routes.insert(route.name.clone(), route).is_some() {
                bail!("💀 Topic '{}' is configured twice", topic.name);
            }
        }
        Ok(Self { routes })
    }

    pub fn default_topics() -> Self {
        let routes = DEFAULT_TOPICS
            .iter()
            .map(|name| (name.to_string(), TopicRoute::with_defaults(*name)))
            .collect();
        Self { routes }
    }

    pub fn route(&self, topic: &str) -> Option<&TopicRoute> {
        self.routes.get(topic)
    }

    pub fn routes(&self) -> impl Iterator<Item = &TopicRoute> {
        self.routes.values()
    }

    pub fn topic_names(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn tables(&self) -> Vec<String> {
        self.routes.values().map(|route| route.table.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(name: &str) -> TopicConfig {
        TopicConfig {
            name: name.to_string(),
            queue: None,
            table: None,
        }
    }

    #[test]
    fn the_one_where_defaults_follow_the_poem_prefix_tradition() {
        let registry = TopicRegistry::default_topics();
        assert_eq!(registry.len(), 5);
        let nature = registry.route("Nature").expect("Nature is a default topic");
        assert_eq!(nature.queue, "poem_nature");
        assert_eq!(nature.table, "Nature");
    }

    #[test]
    fn the_one_where_explicit_names_win_over_defaults() -> Result<()> {
        let registry = TopicRegistry::from_config(&[TopicConfig {
            name: "Haiku".to_string(),
            queue: Some("short_stuff".to_string()),
            table: Some("haikus".to_string()),
        }])?;
        let haiku = registry.route("Haiku").expect("configured topic");
        assert_eq!(haiku.queue, "short_stuff");
        assert_eq!(haiku.table, "haikus");
        Ok(())
    }

    #[test]
    fn the_one_where_duplicates_and_emptiness_are_refused() {
        assert!(TopicRegistry::from_config(&[]).is_err());
        assert!(TopicRegistry::from_config(&[topic("Love"), topic("Love")]).is_err());
        assert!(TopicRegistry::from_config(&[topic("  ")]).is_err());

        let shared_queue = TopicConfig {
            name: "Amor".to_string(),
            queue: Some("poem_love".to_string()),
            table: None,
        };
        assert!(TopicRegistry::from_config(&[topic("Love"), shared_queue]).is_err());
    }
}
