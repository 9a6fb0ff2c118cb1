use anyhow::{Context, Result};
use reqwest::Client;

use crate::config::GeminiConfig;

use super::inference::{build_request, parse_response, RiskAnalysis, GEMINI_API_BASE};

/// Supplementary classifier. Fallible by nature; every call is time-boxed
/// so a stuck request can never stall anything that awaits it.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(http: Client, config: GeminiConfig) -> Self {
        Self { http, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    pub async fn analyze(&self, message_text: &str) -> Result<RiskAnalysis> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .context("GEMINI_API_KEY must be configured for supplementary analysis")?;

        let url = format!("{GEMINI_API_BASE}/{}:generateContent", self.config.model);
        let response = self
            .http
            .post(url)
            .query(&[("key", api_key.as_str())])
            .timeout(self.config.request_timeout)
            .json(&build_request(message_text))
            .send()
            .await?
            .error_for_status()?;

        parse_response(response).await
    }
}
