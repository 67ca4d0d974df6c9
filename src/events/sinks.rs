use crate::events::{Event, EventSink, EventSinkKind};
use crate::utils::error::{NodewatcherError, Result};
use crate::utils::validation::{validate_range, validate_url};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

fn parse_config<T: serde::de::DeserializeOwned>(sink: &str, config: &toml::Table) -> Result<T> {
    toml::Value::Table(config.clone())
        .try_into()
        .map_err(|e| NodewatcherError::ConfigValidationError {
            field: format!("event_sinks.{}", sink),
            message: e.to_string(),
        })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingSinkConfig {
    #[serde(default)]
    level: LogLevel,
}

/// Writes events to the log.
#[derive(Debug)]
pub struct LoggingSink {
    level: LogLevel,
}

impl LoggingSink {
    pub fn level(&self) -> LogLevel {
        self.level
    }
}

#[async_trait]
impl EventSink for LoggingSink {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn deliver(&self, event: &Event) -> Result<()> {
        let node = event.node.map(|n| n.to_string()).unwrap_or_default();
        match self.level {
            LogLevel::Debug => {
                tracing::debug!(node = %node, data = %event.data, "📣 {}.{}", event.source, event.kind)
            }
            LogLevel::Info => {
                tracing::info!(node = %node, data = %event.data, "📣 {}.{}", event.source, event.kind)
            }
            LogLevel::Warn => {
                tracing::warn!(node = %node, data = %event.data, "📣 {}.{}", event.source, event.kind)
            }
            LogLevel::Error => {
                tracing::error!(node = %node, data = %event.data, "📣 {}.{}", event.source, event.kind)
            }
        }
        Ok(())
    }
}

impl EventSinkKind for LoggingSink {
    const NAME: &'static str = "logging";

    fn from_config(config: &toml::Table) -> Result<Self> {
        let config: LoggingSinkConfig = parse_config(Self::NAME, config)?;
        Ok(Self {
            level: config.level,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WebhookSinkConfig {
    url: String,
    #[serde(default = "default_webhook_timeout")]
    timeout_seconds: u64,
}

fn default_webhook_timeout() -> u64 {
    5
}

/// POSTs each event as JSON to an HTTP endpoint.
#[derive(Debug)]
pub struct WebhookSink {
    url: String,
    client: Client,
}

#[async_trait]
impl EventSink for WebhookSink {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn deliver(&self, event: &Event) -> Result<()> {
        tracing::debug!("Posting {}.{} to {}", event.source, event.kind, self.url);
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl EventSinkKind for WebhookSink {
    const NAME: &'static str = "webhook";

    fn from_config(config: &toml::Table) -> Result<Self> {
        let config: WebhookSinkConfig = parse_config(Self::NAME, config)?;
        validate_url("event_sinks.webhook.url", &config.url)?;
        validate_range("event_sinks.webhook.timeout_seconds", config.timeout_seconds, 1, 300)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            url: config.url,
            client,
        })
    }
}
