pub mod env;
mod loader;

pub use env::{
    AppConfig, CollectorConfig, DeliveryConfig, DetectionConfig, DirectoryConfig, GeminiConfig,
};
pub use loader::load_config;
