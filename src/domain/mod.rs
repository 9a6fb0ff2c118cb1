pub mod bot;
pub mod message;
pub mod types;

pub use bot::{BotCategory, DetectedBot};
pub use message::{ConversationMessage, PrivacyWarning, RiskEntry, Sender, WarningOrigin};
pub use types::{
    Confidence, DeliveryStats, DetectionStats, MonitorEvent, QueueSnapshot, RiskSeverity,
};
