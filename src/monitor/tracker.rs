use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use url::Url;

use crate::config::DetectionConfig;
use crate::delivery::DeliveryQueue;
use crate::detect::{self, ElementSnapshot};
use crate::domain::{
    ConversationMessage, DetectedBot, DetectionStats, MonitorEvent, PrivacyWarning, Sender,
};
use crate::infrastructure::shutdown::ShutdownListener;
use crate::ingest::{PageEvent, PageEventReceiver};
use crate::risk;

/// Session-scoped registries: bots by fingerprint, histories and warnings
/// by bot. Torn down when the owning page context ends.
#[derive(Default)]
struct TrackerState {
    bots: HashMap<String, DetectedBot>,
    conversations: HashMap<String, Vec<ConversationMessage>>,
    warnings: Vec<PrivacyWarning>,
    /// (fingerprint, sender, content) observations inside the dedup window.
    recent: HashMap<(String, Sender, String), DateTime<Utc>>,
    stats: DetectionStats,
}

/// Stitches raw page events into per-bot conversations, scores each
/// message, and hands messages/warnings to the delivery queue. The only
/// writer of bots, messages and warnings.
pub struct ConversationTracker {
    queue: Arc<DeliveryQueue>,
    events: broadcast::Sender<MonitorEvent>,
    config: DetectionConfig,
    state: Mutex<TrackerState>,
}

impl ConversationTracker {
    pub fn new(
        queue: Arc<DeliveryQueue>,
        events: broadcast::Sender<MonitorEvent>,
        config: DetectionConfig,
    ) -> Self {
        Self {
            queue,
            events,
            config,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn handle_event(&self, event: PageEvent) {
        match event {
            PageEvent::ElementAdded(element) => {
                let _ = self.resolve_bot(&element, Utc::now());
            }
            PageEvent::Text {
                element,
                sender,
                text,
            } => self.observe(&element, sender, &text),
            PageEvent::SessionEnded => self.end_session(),
        }
    }

    /// Turns one observed text event into a tracked message, and into a
    /// warning when the scan finds risks. The message is always queued for
    /// delivery; full conversation visibility does not depend on risk.
    pub fn observe(&self, element: &ElementSnapshot, sender: Sender, text: &str) {
        let content = text.trim();
        if content.chars().count() < self.config.min_message_chars {
            return;
        }

        let now = Utc::now();
        let Some(bot_id) = self.resolve_bot(element, now) else {
            return;
        };

        let fingerprint = element.fingerprint();
        if self.is_duplicate(&fingerprint, sender, content, now) {
            tracing::trace!(target: "monitor", %bot_id, "duplicate observation suppressed");
            return;
        }

        let risks = risk::scan(content);
        let risk_level = risk::overall_level(&risks);
        let message = ConversationMessage {
            bot_id: bot_id.clone(),
            sender,
            content: content.to_string(),
            timestamp: now,
            url: element.source_url.clone(),
            hostname: hostname_of(&element.source_url),
            risks,
            risk_level,
        };
        let warning = PrivacyWarning::from_message(&message);

        {
            let mut state = self.state.lock();
            state
                .conversations
                .entry(bot_id.clone())
                .or_default()
                .push(message.clone());
            if let Some(bot) = state.bots.get_mut(&fingerprint) {
                bot.conversation_count += 1;
                bot.last_seen = now;
                if warning.is_some() {
                    bot.warning_count += 1;
                }
            }
            if let Some(warning) = &warning {
                state.warnings.push(warning.clone());
            }
            state.stats.total_conversations += 1;
            state.stats.total_warnings = state.warnings.len();
            state.stats.last_updated = now;
        }

        self.publish(MonitorEvent::Message(message.clone()));
        self.queue.enqueue_message(message);

        if let Some(warning) = warning {
            self.publish(MonitorEvent::Warning(warning.clone()));
            self.queue.enqueue_warning(warning);
        }
    }

    /// Adds a warning synthesized by the supplementary analyzer. Augments
    /// the deterministic scan, never replaces it.
    pub fn record_analysis_warning(&self, warning: PrivacyWarning) {
        {
            let mut state = self.state.lock();
            if let Some(bot) = state
                .bots
                .values_mut()
                .find(|bot| bot.id == warning.bot_id)
            {
                bot.warning_count += 1;
            }
            state.warnings.push(warning.clone());
            state.stats.total_warnings = state.warnings.len();
            state.stats.last_updated = warning.timestamp;
        }
        self.publish(MonitorEvent::Warning(warning.clone()));
        self.queue.enqueue_warning(warning);
    }

    /// Resolves the owning bot for an element, registering it on a first
    /// threshold match. Idempotent on the structural fingerprint:
    /// re-observation refreshes `last_seen` instead of duplicating.
    fn resolve_bot(&self, element: &ElementSnapshot, now: DateTime<Utc>) -> Option<String> {
        let fingerprint = element.fingerprint();
        let mut state = self.state.lock();

        if let Some(bot) = state.bots.get_mut(&fingerprint) {
            bot.last_seen = now;
            bot.is_active = true;
            return Some(bot.id.clone());
        }

        let classification = detect::classify(element);
        if !classification.is_bot {
            return None;
        }

        let bot = DetectedBot {
            id: format!("{}-{}", fingerprint, now.timestamp_millis()),
            fingerprint: fingerprint.clone(),
            score: classification.score,
            category: classification.category,
            url: element.source_url.clone(),
            first_seen: now,
            last_seen: now,
            is_active: true,
            conversation_count: 0,
            warning_count: 0,
        };
        let id = bot.id.clone();
        state.bots.insert(fingerprint, bot.clone());
        state.stats.total_bots = state.bots.len();
        state.stats.last_updated = now;
        drop(state);

        tracing::info!(
            target: "monitor",
            bot_id = %id,
            score = bot.score,
            category = ?bot.category,
            "bot registered"
        );
        self.publish(MonitorEvent::BotDetected(bot));
        Some(id)
    }

    /// Rapid-fire mutation events repeat the same logical message; the
    /// (element, sender, content) triple within a short window is the key.
    fn is_duplicate(
        &self,
        fingerprint: &str,
        sender: Sender,
        content: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let window = ChronoDuration::from_std(self.config.dedup_window)
            .unwrap_or_else(|_| ChronoDuration::seconds(2));
        let key = (fingerprint.to_string(), sender, content.to_string());
        let mut state = self.state.lock();
        if let Some(seen) = state.recent.get(&key) {
            if now - *seen < window {
                return true;
            }
        }
        state.recent.insert(key, now);
        false
    }

    /// Hourly sweep: warnings past the retention horizon and stale dedup
    /// entries are purged.
    pub fn run_maintenance(&self, now: DateTime<Utc>) {
        let retention = ChronoDuration::from_std(self.config.warning_retention)
            .unwrap_or_else(|_| ChronoDuration::hours(24));
        let window = ChronoDuration::from_std(self.config.dedup_window)
            .unwrap_or_else(|_| ChronoDuration::seconds(2));

        let mut state = self.state.lock();
        let before = state.warnings.len();
        state.warnings.retain(|w| now - w.timestamp < retention);
        state.recent.retain(|_, seen| now - *seen < window);
        let purged = before - state.warnings.len();
        state.stats.total_warnings = state.warnings.len();
        state.stats.last_updated = now;
        if purged > 0 {
            tracing::debug!(target: "monitor", purged, "expired warnings purged");
        }
    }

    /// Page context ended: every bot it owned dies with it.
    pub fn end_session(&self) {
        let mut state = self.state.lock();
        let bots = state.bots.len();
        state.bots.clear();
        state.conversations.clear();
        state.warnings.clear();
        state.recent.clear();
        state.stats = DetectionStats::default();
        tracing::info!(target: "monitor", bots, "session ended; tracker state cleared");
    }

    pub fn stats(&self) -> DetectionStats {
        self.state.lock().stats.clone()
    }

    pub fn bots(&self) -> Vec<DetectedBot> {
        self.state.lock().bots.values().cloned().collect()
    }

    pub fn warnings(&self) -> Vec<PrivacyWarning> {
        self.state.lock().warnings.clone()
    }

    pub fn conversation(&self, bot_id: &str) -> Vec<ConversationMessage> {
        self.state
            .lock()
            .conversations
            .get(bot_id)
            .cloned()
            .unwrap_or_default()
    }

    fn publish(&self, event: MonitorEvent) {
        // No subscribers is fine; delivery goes through the queue.
        let _ = self.events.send(event);
    }

    /// Reacts to the inbound page-event stream until it closes or shutdown.
    pub fn spawn(
        self: Arc<Self>,
        mut receiver: PageEventReceiver,
        mut shutdown: ShutdownListener,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_event = receiver.recv() => match maybe_event {
                        Some(event) => self.handle_event(event),
                        None => {
                            tracing::info!(target: "monitor", "page event stream closed");
                            break;
                        }
                    },
                    _ = shutdown.notified() => break,
                }
            }
            tracing::info!(target: "monitor", "conversation tracker stopped");
        })
    }

    pub fn spawn_maintenance(self: Arc<Self>, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = interval(self.config.maintenance_interval);
            // The first tick fires immediately; skip it so startup stays quiet.
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => self.run_maintenance(Utc::now()),
                    _ = shutdown.notified() => break,
                }
            }
            tracing::info!(target: "monitor", "maintenance loop stopped");
        })
    }
}

fn hostname_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}
