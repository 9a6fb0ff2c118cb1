use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::CollectorConfig;
use crate::domain::{ConversationMessage, PrivacyWarning};

/// Send failure, split by whether the collector answered at all. The
/// dispatcher treats every `Rejected` status uniformly; the distinction
/// only decides retry versus fallback persistence.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The transport itself failed: connect error, timeout, DNS. No
    /// delivery channel was reachable.
    #[error("collector unreachable: {0}")]
    Unreachable(String),
    /// The collector answered with a non-success status.
    #[error("collector rejected request with status {0}")]
    Rejected(u16),
}

impl CollectorError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, CollectorError::Unreachable(_))
    }
}

/// Remote store boundary. Production uses [`HttpCollector`]; tests swap in
/// scripted doubles.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn send_message(&self, message: &ConversationMessage) -> Result<(), CollectorError>;
    async fn send_warning(&self, warning: &PrivacyWarning) -> Result<(), CollectorError>;
    async fn send_message_batch(
        &self,
        messages: &[&ConversationMessage],
    ) -> Result<(), CollectorError>;
    async fn send_warning_batch(
        &self,
        warnings: &[&PrivacyWarning],
    ) -> Result<(), CollectorError>;
    /// Liveness probe for reconciliation; true means reachable.
    async fn health(&self) -> bool;
}

#[derive(Serialize)]
struct MessageBatchBody<'a> {
    messages: &'a [&'a ConversationMessage],
}

#[derive(Serialize)]
struct WarningBatchBody<'a> {
    warnings: &'a [&'a PrivacyWarning],
}

/// Acknowledgment shape for batch posts; ids are whatever the backing
/// store generated. Parsed leniently because acceptance is already signaled
/// by the status code.
#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    ids: Vec<serde_json::Value>,
}

#[derive(Clone)]
pub struct HttpCollector {
    http: Client,
    base_url: Url,
    send_timeout: Duration,
}

impl HttpCollector {
    pub fn new(http: Client, config: &CollectorConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid collector base URL {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("collector base URL {} cannot carry paths", base_url);
        }
        Ok(Self {
            http,
            base_url,
            send_timeout: config.send_timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        // join only fails on cannot-be-a-base URLs, rejected at construction.
        self.base_url.join(path).unwrap_or_else(|_| self.base_url.clone())
    }

    async fn post<T: Serialize + ?Sized + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, CollectorError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .timeout(self.send_timeout)
            .json(body)
            .send()
            .await
            .map_err(map_send_error)?;
        response.error_for_status().map_err(map_send_error)
    }

    async fn log_batch_ack(path: &str, response: reqwest::Response) {
        match response.json::<BatchResponse>().await {
            Ok(ack) => tracing::debug!(
                target: "collector",
                path,
                success = ack.success,
                accepted = ack.ids.len(),
                "batch acknowledged"
            ),
            Err(err) => tracing::debug!(
                target: "collector",
                path,
                error = %err,
                "batch accepted but acknowledgment body was unparseable"
            ),
        }
    }
}

fn map_send_error(err: reqwest::Error) -> CollectorError {
    match err.status() {
        Some(status) => CollectorError::Rejected(status.as_u16()),
        None => CollectorError::Unreachable(err.to_string()),
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn send_message(&self, message: &ConversationMessage) -> Result<(), CollectorError> {
        self.post("/events/messages", message).await?;
        Ok(())
    }

    async fn send_warning(&self, warning: &PrivacyWarning) -> Result<(), CollectorError> {
        self.post("/events/warnings", warning).await?;
        Ok(())
    }

    async fn send_message_batch(
        &self,
        messages: &[&ConversationMessage],
    ) -> Result<(), CollectorError> {
        let path = "/events/messages/batch";
        let response = self.post(path, &MessageBatchBody { messages }).await?;
        Self::log_batch_ack(path, response).await;
        Ok(())
    }

    async fn send_warning_batch(
        &self,
        warnings: &[&PrivacyWarning],
    ) -> Result<(), CollectorError> {
        let path = "/events/warnings/batch";
        let response = self.post(path, &WarningBatchBody { warnings }).await?;
        Self::log_batch_ack(path, response).await;
        Ok(())
    }

    async fn health(&self) -> bool {
        let request = self
            .http
            .get(self.endpoint("/health"))
            .timeout(self.send_timeout)
            .send()
            .await;
        match request {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tracing::debug!(target: "collector", error = %err, "health probe failed");
                false
            }
        }
    }
}
