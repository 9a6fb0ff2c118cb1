use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::domain::{ConversationMessage, PrivacyWarning, QueueSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Message,
    Warning,
}

/// An outgoing event. Serialized form is what the fallback store persists,
/// so a replayed record rebuilds the exact payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    Message(ConversationMessage),
    Warning(PrivacyWarning),
}

impl EventPayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            EventPayload::Message(_) => PayloadKind::Message,
            EventPayload::Warning(_) => PayloadKind::Warning,
        }
    }
}

/// Delivery bookkeeping around one payload. Only the dispatcher mutates the
/// retry fields; producers never see the item again after enqueueing.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub payload: EventPayload,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_retry_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
            last_retry_at: None,
        }
    }
}

/// In-memory pending lists, one per payload kind. Enqueue is an O(1)
/// append that never blocks a producer and never fails; retried items go
/// back to the front so they keep rough arrival ordering over newer items.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    messages: Mutex<VecDeque<QueueItem>>,
    warnings: Mutex<VecDeque<QueueItem>>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_message(&self, message: ConversationMessage) {
        self.messages
            .lock()
            .push_back(QueueItem::new(EventPayload::Message(message)));
    }

    pub fn enqueue_warning(&self, warning: PrivacyWarning) {
        self.warnings
            .lock()
            .push_back(QueueItem::new(EventPayload::Warning(warning)));
    }

    /// Removes and returns up to `limit` items from the front of one queue.
    pub fn drain_batch(&self, kind: PayloadKind, limit: usize) -> Vec<QueueItem> {
        let mut pending = self.lane(kind).lock();
        let take = limit.min(pending.len());
        pending.drain(..take).collect()
    }

    /// Reinserts items at the front, preserving their relative order, so a
    /// failed batch is retried before anything that arrived after it.
    pub fn requeue_front(&self, kind: PayloadKind, items: Vec<QueueItem>) {
        let mut pending = self.lane(kind).lock();
        for item in items.into_iter().rev() {
            pending.push_front(item);
        }
    }

    /// True once either queue holds a full batch, used by the eager tick.
    pub fn batch_ready(&self, batch_size: usize) -> bool {
        self.messages.lock().len() >= batch_size || self.warnings.lock().len() >= batch_size
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            messages: self.messages.lock().len(),
            warnings: self.warnings.lock().len(),
        }
    }

    fn lane(&self, kind: PayloadKind) -> &Mutex<VecDeque<QueueItem>> {
        match kind {
            PayloadKind::Message => &self.messages,
            PayloadKind::Warning => &self.warnings,
        }
    }
}
