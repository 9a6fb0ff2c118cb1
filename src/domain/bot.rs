use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inferred purpose of a detected chat widget, first matching bucket wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotCategory {
    CustomerService,
    SalesMarketing,
    GeneralAssistant,
    ChatBot,
    Unknown,
}

/// A conversational widget the classifier matched on some page.
///
/// Identity is the structural fingerprint plus discovery time; the tracker
/// keeps at most one live bot per fingerprint within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedBot {
    pub id: String,
    pub fingerprint: String,
    pub score: i32,
    pub category: BotCategory,
    pub url: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
    pub conversation_count: usize,
    pub warning_count: usize,
}
