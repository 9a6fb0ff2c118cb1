use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::types::{Confidence, RiskSeverity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Bot,
    User,
}

/// One pattern or context-rule match inside a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub matched_text: String,
    pub confidence: Confidence,
    pub severity: RiskSeverity,
}

/// A single observed exchange with a detected bot. Immutable once built;
/// appended to the owning bot's history in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub bot_id: String,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub hostname: Option<String>,
    pub risks: Vec<RiskEntry>,
    pub risk_level: Option<RiskSeverity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningOrigin {
    PatternScan,
    AiAnalysis,
}

/// Derived from a message whose risk list is non-empty, or synthesized by
/// the supplementary analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyWarning {
    pub bot_id: String,
    pub sender: Sender,
    pub origin: WarningOrigin,
    pub content: String,
    pub risks: Vec<RiskEntry>,
    pub severity: RiskSeverity,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl PrivacyWarning {
    /// Builds the deterministic warning for a message with a non-empty
    /// risk list. The overall severity is already on the message.
    pub fn from_message(message: &ConversationMessage) -> Option<Self> {
        let severity = message.risk_level?;
        if message.risks.is_empty() {
            return None;
        }
        Some(Self {
            bot_id: message.bot_id.clone(),
            sender: message.sender,
            origin: WarningOrigin::PatternScan,
            content: message.content.clone(),
            risks: message.risks.clone(),
            severity,
            url: message.url.clone(),
            timestamp: message.timestamp,
            explanation: None,
            recommendation: None,
        })
    }

    pub fn risk_kinds(&self) -> Vec<&str> {
        self.risks.iter().map(|r| r.kind.as_str()).collect()
    }
}
