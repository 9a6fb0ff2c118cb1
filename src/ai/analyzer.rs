use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::{
    Confidence, ConversationMessage, MonitorEvent, PrivacyWarning, RiskEntry, Sender,
    WarningOrigin,
};
use crate::infrastructure::shutdown::ShutdownListener;
use crate::monitor::ConversationTracker;
use crate::risk::patterns::severity_for;

use super::client::GeminiClient;
use super::inference::RiskAnalysis;

/// Second-opinion pass over bot-authored messages. Strictly additive: it
/// only ever records extra warnings, and any failure is logged and dropped.
pub struct MessageAnalyzer {
    client: GeminiClient,
    tracker: Arc<ConversationTracker>,
}

impl MessageAnalyzer {
    pub fn new(client: GeminiClient, tracker: Arc<ConversationTracker>) -> Self {
        Self { client, tracker }
    }

    pub fn spawn(
        self: Arc<Self>,
        mut events: broadcast::Receiver<MonitorEvent>,
        mut shutdown: ShutdownListener,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = events.recv() => match result {
                        Ok(MonitorEvent::Message(message)) if message.sender == Sender::Bot => {
                            self.inspect(message).await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(target: "ai", skipped, "analyzer fell behind event bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.notified() => break,
                }
            }
            tracing::info!(target: "ai", "message analyzer stopped");
        })
    }

    async fn inspect(&self, message: ConversationMessage) {
        match self.client.analyze(&message.content).await {
            Ok(analysis) => {
                if let Some(warning) = synthesize_warning(&message, &analysis) {
                    tracing::info!(
                        target: "ai",
                        bot_id = %warning.bot_id,
                        severity = ?warning.severity,
                        "supplementary analysis flagged bot message"
                    );
                    self.tracker.record_analysis_warning(warning);
                }
            }
            Err(err) => {
                tracing::debug!(target: "ai", error = %err, "supplementary analysis failed");
            }
        }
    }
}

/// A warning is synthesized only for medium or high verdicts. Risk names
/// reported by the model reuse the pattern severity table so the two
/// sources stay comparable downstream.
pub fn synthesize_warning(
    message: &ConversationMessage,
    analysis: &RiskAnalysis,
) -> Option<PrivacyWarning> {
    let severity = analysis.severity()?;
    let risks = analysis
        .risks
        .iter()
        .map(|kind| RiskEntry {
            kind: kind.clone(),
            matched_text: kind.clone(),
            confidence: Confidence::High,
            severity: severity_for(kind),
        })
        .collect();

    Some(PrivacyWarning {
        bot_id: message.bot_id.clone(),
        sender: message.sender,
        origin: WarningOrigin::AiAnalysis,
        content: message.content.clone(),
        risks,
        severity,
        url: message.url.clone(),
        timestamp: Utc::now(),
        explanation: analysis.explanation.clone(),
        recommendation: analysis.recommendation.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RiskSeverity;

    fn bot_message() -> ConversationMessage {
        ConversationMessage {
            bot_id: "div#widget.chat-1700000000000".into(),
            sender: Sender::Bot,
            content: "Please confirm your card number".into(),
            timestamp: Utc::now(),
            url: "https://shop.example/checkout".into(),
            hostname: Some("shop.example".into()),
            risks: Vec::new(),
            risk_level: None,
        }
    }

    #[test]
    fn medium_and_high_verdicts_become_warnings() {
        let analysis: RiskAnalysis = serde_json::from_str(
            r#"{"risk_level":"high","risks":["credit_card"],"explanation":"asks for card","recommendation":"do not share"}"#,
        )
        .unwrap();

        let warning = synthesize_warning(&bot_message(), &analysis).unwrap();
        assert_eq!(warning.origin, WarningOrigin::AiAnalysis);
        assert_eq!(warning.severity, RiskSeverity::High);
        assert_eq!(warning.risks.len(), 1);
        assert_eq!(warning.risks[0].kind, "credit_card");
        assert_eq!(warning.risks[0].severity, RiskSeverity::VeryHigh);
        assert_eq!(warning.explanation.as_deref(), Some("asks for card"));
    }

    #[test]
    fn low_verdicts_are_discarded() {
        let analysis: RiskAnalysis =
            serde_json::from_str(r#"{"risk_level":"low","risks":[]}"#).unwrap();
        assert!(synthesize_warning(&bot_message(), &analysis).is_none());
    }
}
