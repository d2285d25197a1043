//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.

use anyhow::{Context, bail};
use serde::Deserialize;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use std::path::Path;
use tracing::info;

use crate::accumulator::TargetRange;
use crate::topics::{DEFAULT_TOPICS, TopicRegistry, TopicRoute, default_queue_name};

pub use crate::backends::{FileBrokerConfig, FileSinkConfig, HttpSinkConfig};

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🏷️ The closed set of topics. Leave it out and you get the classic five.
    #[serde(default = "default_topics")]
    pub topics: Vec<TopicConfig>,
    #[serde(default, alias = "supervisor_config")]
    pub runtime: RuntimeConfig,
    /// 📮 Where fragments come from.
    pub broker_config: BrokerConfig,
    /// 🗄️ Where finished poems go.
    pub sink_config: SinkConfig,
}

impl AppConfig {
    /// 🔍 Catch the configs that parse fine but make no sense, before any worker starts.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.runtime.target_range()?;
        if self.runtime.prefetch_count == 0 {
            bail!("💀 prefetch_count must be at least 1, or no fragment will ever be delivered.");
        }
        TopicRegistry::from_config(&self.topics)?;
        Ok(())
    }
}

/// 🏷️ One topic, and optionally where its queue and table live.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub name: String,
    /// 📮 Defaults to `poem_<lowercase name>`.
    #[serde(default)]
    pub queue: Option<String>,
    /// 🗄️ Defaults to the topic name.
    #[serde(default)]
    pub table: Option<String>,
}

impl TopicConfig {
    pub fn route(&self) -> TopicRoute {
        TopicRoute {
            name: self.name.clone(),
            queue: self
                .queue
                .clone()
                .unwrap_or_else(|| default_queue_name(&self.name)),
            table: self.table.clone().unwrap_or_else(|| self.name.clone()),
        }
    }
}

fn default_topics() -> Vec<TopicConfig> {
    DEFAULT_TOPICS
        .iter()
        .map(|name| TopicConfig {
            name: name.to_string(),
            queue: None,
            table: None,
        })
        .collect()
}

/// 🎛️ The knobs the workers read. Read-only once the workers are running.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 📏 Shortest poem, inclusive.
    #[serde(default = "default_min_lines", alias = "min_line_count")]
    pub min_lines: usize,
    /// 📏 Longest poem, inclusive.
    #[serde(default = "default_max_lines", alias = "max_line_count")]
    pub max_lines: usize,
    /// 🚦 Max unsettled deliveries a topic's consumer may hold at once.
    #[serde(default = "default_prefetch_count", alias = "prefetch")]
    pub prefetch_count: usize,
    /// 🎲 Fix the dice. Absent means fresh entropy every run.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_min_lines() -> usize {
    3
}

fn default_max_lines() -> usize {
    100
}

fn default_prefetch_count() -> usize {
    10
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            min_lines: default_min_lines(),
            max_lines: default_max_lines(),
            prefetch_count: default_prefetch_count(),
            seed: None,
        }
    }
}

impl RuntimeConfig {
    pub fn target_range(&self) -> anyhow::Result<TargetRange> {
        TargetRange::new(self.min_lines, self.max_lines)
            .context("💀 runtime.min_lines / runtime.max_lines do not describe a usable range")
    }
}

/// 📮 The broker boundary, picked by config.
#[derive(Debug, Deserialize, Clone, Default)]
pub enum BrokerConfig {
    /// 🧠 Queues in RAM. Only code in this process can publish to them, so a run on this
    /// broker lasts until Ctrl-C closes it.
    #[default]
    InMemory,
    /// 📂 Replay an NDJSON file of fragments, then drain and stop.
    File(FileBrokerConfig),
}

/// 🗄️ The storage boundary, picked by config.
#[derive(Debug, Deserialize, Clone)]
pub enum SinkConfig {
    InMemory,
    File(FileSinkConfig),
    Http(HttpSinkConfig),
}

/// 🚀 Load the config from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`BOTTLE_*`, nested keys split on `__`) with an
/// optional TOML file. TOML wins on conflicts. No file means env vars only.
///
/// 💀 Returns an error if config is unparseable or parses into nonsense.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("BOTTLE_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (BOTTLE_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (BOTTLE_*). \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config
        .validate()
        .context("💀 The configuration parsed, but it does not add up")?;
    Ok(app_config)
}
