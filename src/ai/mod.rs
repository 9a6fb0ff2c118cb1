pub mod analyzer;
pub mod client;
pub mod inference;

pub use analyzer::MessageAnalyzer;
pub use client::GeminiClient;
