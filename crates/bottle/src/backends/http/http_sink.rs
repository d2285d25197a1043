use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::debug;

use crate::backends::PoemSink;
use crate::backends::sink::{PoemReceipt, PoemRow};
use crate::common::Poem;

#[derive(Debug, Deserialize, Clone)]
pub struct HttpSinkConfig {
    /// 📡 Base URL. Each table is a path segment under it: `{url}/{table}`.
    pub url: String,
    /// 🔒 Username. The bouncer at the club. Except the club is a database.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. "password123" is not a password. It is a confession.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key, the velvet rope variant. Wins over basic auth when both are set.
    #[serde(default)]
    pub api_key: Option<String>,
    /// ⏱️ Whole-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

/// 🧾 What a storage service may answer with. Anything else still counts as stored.
#[derive(Deserialize)]
struct StoredResponse {
    poem_id: u64,
}

/// 📡 HttpPoemSink: one POST per poem, JSON row in the body.
///
/// A 2xx means stored. Anything else, including a timeout, is a failure for the worker
/// to log. We never retry: a poem lost to a flaky API is lost, and the topic moves on.
#[derive(Debug)]
pub(crate) struct HttpPoemSink {
    client: reqwest::Client,
    sink_config: HttpSinkConfig,
}

impl HttpPoemSink {
    pub(crate) fn new(sink_config: HttpSinkConfig) -> Result<Self> {
        // 🔧 10 seconds to shake hands, `timeout_secs` for the whole conversation.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(sink_config.timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. The TLS stack wept. The architect shrugged.")?;
        Ok(Self {
            client,
            sink_config,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.sink_config.url.trim_end_matches('/'), table)
    }
}

#[async_trait]
impl PoemSink for HttpPoemSink {
    async fn prepare(&self, tables: &[String]) -> Result<()> {
        // -- schema lives with the storage service, there is nothing for us to create
        debug!(
            "📡 HTTP sink will post to {} table endpoint(s) under '{}'",
            tables.len(),
            self.sink_config.url
        );
        Ok(())
    }

    async fn store(&self, table: &str, poem: Poem) -> Result<PoemReceipt> {
        let url = self.table_url(table);
        let body = serde_json::to_string(&PoemRow::new(&poem, None))
            .context("💀 A poem refused to become JSON")?;

        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(api_key) = &self.sink_config.api_key {
            request = request.header(AUTHORIZATION, format!("ApiKey {api_key}"));
        } else if let Some(username) = &self.sink_config.username {
            request = request.basic_auth(username, self.sink_config.password.as_ref());
        }

        let response = request
            .send()
            .await
            .context(format!("💀 POST to '{url}' never got an answer"))?
            .error_for_status()
            .context(format!("💀 '{url}' said no to our poem"))?;
        let text = response.text().await.unwrap_or_default();
        let id = serde_json::from_str::<StoredResponse>(&text)
            .ok()
            .map(|stored| stored.poem_id);

        Ok(PoemReceipt {
            table: table.to_string(),
            id,
        })
    }
}
