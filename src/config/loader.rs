use std::env;
use std::time::Duration;

use super::env::{
    AppConfig, CollectorConfig, ConfigError, DeliveryConfig, DetectionConfig, DirectoryConfig,
    GeminiConfig, LoggingConfig,
};

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            env::var("COLLECTOR_BASE_URL").map_err(|_| ConfigError::Missing("COLLECTOR_BASE_URL"))?;

        let collector = CollectorConfig {
            base_url,
            send_timeout: millis("COLLECTOR_SEND_TIMEOUT_MS", 10_000),
        };

        let defaults = DeliveryConfig::default();
        let delivery = DeliveryConfig {
            batch_size: parse("QUEUE_BATCH_SIZE").unwrap_or(defaults.batch_size),
            flush_interval: millis("QUEUE_FLUSH_INTERVAL_MS", 30_000),
            eager_interval: millis("QUEUE_EAGER_INTERVAL_MS", 5_000),
            reconcile_interval: millis("RECONCILE_INTERVAL_MS", 30_000),
            max_retries: parse("QUEUE_MAX_RETRIES").unwrap_or(defaults.max_retries),
        };

        let detect_defaults = DetectionConfig::default();
        let detection = DetectionConfig {
            min_message_chars: parse("MIN_MESSAGE_CHARS")
                .unwrap_or(detect_defaults.min_message_chars),
            dedup_window: millis("DEDUP_WINDOW_MS", 2_000),
            warning_retention: Duration::from_secs(
                parse::<u64>("WARNING_RETENTION_HOURS").unwrap_or(24) * 60 * 60,
            ),
            maintenance_interval: millis("MAINTENANCE_INTERVAL_MS", 60 * 60 * 1_000),
        };

        let gemini = GeminiConfig {
            api_key: env::var("GEMINI_API_KEY").ok().filter(|v| !v.is_empty()),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-pro".to_string()),
            request_timeout: millis("GEMINI_TIMEOUT_MS", 10_000),
        };

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            db_filename: env::var("DB_FILENAME").unwrap_or_else(|_| "fallback.db".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        Ok(Self {
            collector,
            delivery,
            detection,
            gemini,
            directories,
            logging,
        })
    }
}

fn parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse::<T>().ok())
}

fn millis(key: &str, default: u64) -> Duration {
    Duration::from_millis(parse(key).unwrap_or(default))
}
