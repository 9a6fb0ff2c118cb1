use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub collector: CollectorConfig,
    pub delivery: DeliveryConfig,
    pub detection: DetectionConfig,
    pub gemini: GeminiConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub base_url: String,
    /// Per-send timeout so a stuck call cannot hold the flush flag forever.
    pub send_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Shorter tick that flushes early once either queue reaches batch size.
    pub eager_interval: Duration,
    pub reconcile_interval: Duration,
    pub max_retries: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_interval: Duration::from_secs(30),
            eager_interval: Duration::from_secs(5),
            reconcile_interval: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Text shorter than this is DOM churn, not conversation.
    pub min_message_chars: usize,
    /// Window in which an identical (element, sender, content) observation
    /// is treated as a duplicate mutation event.
    pub dedup_window: Duration,
    pub warning_retention: Duration,
    pub maintenance_interval: Duration,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_message_chars: 2,
            dedup_window: Duration::from_secs(2),
            warning_retention: Duration::from_secs(24 * 60 * 60),
            maintenance_interval: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub db_filename: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
}
