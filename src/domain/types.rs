use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{bot::DetectedBot, message::{ConversationMessage, PrivacyWarning}};

/// Static sensitivity ranking of a risk type. Ordering is by sensitivity,
/// so the overall level of a message is simply the max over its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Per-match strength, derived from how much of the message the match covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Domain events published by the tracker for any interested subscriber
/// (local surfacing, supplementary analysis). Delivery to the collector
/// goes through the queue, not through this bus.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    BotDetected(DetectedBot),
    Message(ConversationMessage),
    Warning(PrivacyWarning),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueSnapshot {
    pub messages: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionStats {
    pub total_bots: usize,
    pub total_conversations: usize,
    pub total_warnings: usize,
    pub last_updated: DateTime<Utc>,
}

impl Default for DetectionStats {
    fn default() -> Self {
        Self {
            total_bots: 0,
            total_conversations: 0,
            total_warnings: 0,
            last_updated: Utc::now(),
        }
    }
}

/// Delivery-layer accounting. Drops are counted here, never resurrected.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub retried: u64,
    pub dropped: u64,
    pub persisted: u64,
    pub replayed: u64,
}
