use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::interval};

use crate::config::DeliveryConfig;
use crate::db::FallbackStore;
use crate::delivery::collector::{Collector, CollectorError};
use crate::delivery::queue::{DeliveryQueue, EventPayload, PayloadKind, QueueItem};
use crate::domain::{ConversationMessage, DeliveryStats, PrivacyWarning};
use crate::infrastructure::shutdown::ShutdownListener;

/// Moves queued events to the collector: periodic batch flushes with
/// bounded retries, plus reconciliation replay of fallback-persisted
/// records once the collector is reachable again.
pub struct Dispatcher {
    queue: Arc<DeliveryQueue>,
    collector: Arc<dyn Collector>,
    fallback: FallbackStore,
    config: DeliveryConfig,
    /// Single-flight guard: a flush requested while one is running is a
    /// no-op and the next tick picks up whatever is still pending.
    in_flight: AtomicBool,
    stats: Mutex<DeliveryStats>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<DeliveryQueue>,
        collector: Arc<dyn Collector>,
        fallback: FallbackStore,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            queue,
            collector,
            fallback,
            config,
            in_flight: AtomicBool::new(false),
            stats: Mutex::new(DeliveryStats::default()),
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        *self.stats.lock()
    }

    /// Runs one flush cycle over both lanes, skipping entirely if another
    /// cycle is still in flight.
    pub async fn flush(&self) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!(target: "delivery", "flush already in flight; skipping");
            return;
        }

        self.flush_lane(PayloadKind::Message).await;
        self.flush_lane(PayloadKind::Warning).await;

        self.in_flight.store(false, Ordering::Release);
    }

    /// Operator-triggered immediate drain; same logic as a scheduled flush.
    pub async fn force_flush(&self) {
        self.flush().await;
    }

    async fn flush_lane(&self, kind: PayloadKind) {
        let batch = self.queue.drain_batch(kind, self.config.batch_size);
        if batch.is_empty() {
            return;
        }

        match self.send_batch(kind, &batch).await {
            Ok(()) => {
                self.stats.lock().delivered += batch.len() as u64;
                tracing::debug!(target: "delivery", ?kind, sent = batch.len(), "batch delivered");
            }
            Err(err) => {
                tracing::warn!(
                    target: "delivery",
                    ?kind,
                    size = batch.len(),
                    error = %err,
                    "batch send failed"
                );
                self.handle_batch_failure(kind, batch, &err).await;
            }
        }
    }

    async fn send_batch(&self, kind: PayloadKind, batch: &[QueueItem]) -> Result<(), CollectorError> {
        match kind {
            PayloadKind::Message => {
                let messages: Vec<&ConversationMessage> = batch
                    .iter()
                    .filter_map(|item| match &item.payload {
                        EventPayload::Message(m) => Some(m),
                        _ => None,
                    })
                    .collect();
                self.collector.send_message_batch(&messages).await
            }
            PayloadKind::Warning => {
                let warnings: Vec<&PrivacyWarning> = batch
                    .iter()
                    .filter_map(|item| match &item.payload {
                        EventPayload::Warning(w) => Some(w),
                        _ => None,
                    })
                    .collect();
                self.collector.send_warning_batch(&warnings).await
            }
        }
    }

    /// Per-item disposition after a failed batch: retry while budget
    /// remains, then either persist (the collector was unreachable outright)
    /// or drop with a counter (it answered and kept rejecting).
    async fn handle_batch_failure(&self, kind: PayloadKind, batch: Vec<QueueItem>, err: &CollectorError) {
        let now = Utc::now();
        let mut retained = Vec::new();

        for mut item in batch {
            if item.retry_count < self.config.max_retries {
                item.retry_count += 1;
                item.last_retry_at = Some(now);
                self.stats.lock().retried += 1;
                retained.push(item);
            } else if err.is_unreachable() {
                match self.fallback.persist(&item.payload).await {
                    Ok(()) => {
                        self.stats.lock().persisted += 1;
                        tracing::info!(
                            target: "delivery",
                            ?kind,
                            retries = item.retry_count,
                            "collector unreachable; event persisted for reconciliation"
                        );
                    }
                    Err(persist_err) => {
                        // Holding it in memory beats losing it.
                        tracing::error!(
                            target: "delivery",
                            error = %persist_err,
                            "fallback persist failed; keeping item queued"
                        );
                        retained.push(item);
                    }
                }
            } else {
                self.stats.lock().dropped += 1;
                tracing::warn!(
                    target: "delivery",
                    ?kind,
                    retries = item.retry_count,
                    "event dropped after exhausting retries"
                );
            }
        }

        if !retained.is_empty() {
            self.queue.requeue_front(kind, retained);
        }
    }

    /// Replays fallback records once the collector reports healthy. Each
    /// record is removed only after its own replay is acknowledged; a
    /// failure leaves that record (and only that record) for the next cycle.
    pub async fn reconcile(&self) {
        let pending = match self.fallback.count().await {
            Ok(0) => return,
            Ok(n) => n,
            Err(err) => {
                tracing::error!(target: "delivery", error = %err, "fallback count failed");
                return;
            }
        };

        if !self.collector.health().await {
            tracing::debug!(
                target: "delivery",
                pending,
                "collector not reachable; reconciliation deferred"
            );
            return;
        }

        let records = match self.fallback.list().await {
            Ok(records) => records,
            Err(err) => {
                tracing::error!(target: "delivery", error = %err, "fallback list failed");
                return;
            }
        };

        for record in records {
            let sent = self.send_single(&record.payload).await;
            match sent {
                Ok(()) => match self.fallback.remove(record.id).await {
                    Ok(_) => {
                        let mut stats = self.stats.lock();
                        stats.replayed += 1;
                        stats.delivered += 1;
                    }
                    Err(err) => {
                        tracing::error!(
                            target: "delivery",
                            id = record.id,
                            error = %err,
                            "failed to remove replayed fallback record"
                        );
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        target: "delivery",
                        id = record.id,
                        error = %err,
                        "replay failed; record stays for next cycle"
                    );
                }
            }
        }
    }

    async fn send_single(&self, payload: &EventPayload) -> Result<(), CollectorError> {
        match payload {
            EventPayload::Message(m) => self.collector.send_message(m).await,
            EventPayload::Warning(w) => self.collector.send_warning(w).await,
        }
    }

    /// Shutdown path: attempt one direct send per remaining item and
    /// persist whatever the collector cannot take, so nothing in memory is
    /// lost when the process exits.
    pub async fn drain_on_shutdown(&self) {
        for kind in [PayloadKind::Message, PayloadKind::Warning] {
            let remaining = self.queue.drain_batch(kind, usize::MAX);
            for item in remaining {
                match self.send_single(&item.payload).await {
                    Ok(()) => self.stats.lock().delivered += 1,
                    Err(send_err) => {
                        tracing::info!(
                            target: "delivery",
                            ?kind,
                            error = %send_err,
                            "persisting undelivered event at shutdown"
                        );
                        if let Err(err) = self.fallback.persist(&item.payload).await {
                            tracing::error!(
                                target: "delivery",
                                error = %err,
                                "failed to persist event at shutdown; content lost"
                            );
                        } else {
                            self.stats.lock().persisted += 1;
                        }
                    }
                }
            }
        }
    }

    /// Periodic flush plus a shorter eager tick that fires once either lane
    /// holds a full batch.
    pub fn spawn_flush_loop(self: Arc<Self>, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut flush_tick = interval(self.config.flush_interval);
            let mut eager_tick = interval(self.config.eager_interval);
            loop {
                tokio::select! {
                    _ = flush_tick.tick() => self.flush().await,
                    _ = eager_tick.tick() => {
                        if self.queue.batch_ready(self.config.batch_size) {
                            self.flush().await;
                        }
                    }
                    _ = shutdown.notified() => break,
                }
            }
            tracing::info!(target: "delivery", "flush loop stopped");
        })
    }

    pub fn spawn_reconcile_loop(self: Arc<Self>, mut shutdown: ShutdownListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = interval(self.config.reconcile_interval);
            loop {
                tokio::select! {
                    _ = tick.tick() => self.reconcile().await,
                    _ = shutdown.notified() => break,
                }
            }
            tracing::info!(target: "delivery", "reconcile loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::Sender;

    #[derive(Default)]
    struct ScriptedCollector {
        batch_failures: Mutex<VecDeque<CollectorError>>,
        single_failures: Mutex<VecDeque<CollectorError>>,
        healthy: AtomicBool,
        batch_sizes: Mutex<Vec<usize>>,
        delivered: Mutex<Vec<String>>,
    }

    impl ScriptedCollector {
        fn healthy() -> Self {
            let collector = Self::default();
            collector.healthy.store(true, Ordering::SeqCst);
            collector
        }

        fn fail_batches(self, failures: Vec<CollectorError>) -> Self {
            *self.batch_failures.lock() = failures.into();
            self
        }

        fn fail_singles(self, failures: Vec<CollectorError>) -> Self {
            *self.single_failures.lock() = failures.into();
            self
        }

        fn record_single(&self, content: &str) -> Result<(), CollectorError> {
            if let Some(err) = self.single_failures.lock().pop_front() {
                return Err(err);
            }
            self.delivered.lock().push(content.to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl Collector for ScriptedCollector {
        async fn send_message(&self, message: &ConversationMessage) -> Result<(), CollectorError> {
            self.record_single(&message.content)
        }

        async fn send_warning(&self, warning: &PrivacyWarning) -> Result<(), CollectorError> {
            self.record_single(&warning.content)
        }

        async fn send_message_batch(
            &self,
            messages: &[&ConversationMessage],
        ) -> Result<(), CollectorError> {
            if let Some(err) = self.batch_failures.lock().pop_front() {
                return Err(err);
            }
            self.batch_sizes.lock().push(messages.len());
            let mut delivered = self.delivered.lock();
            delivered.extend(messages.iter().map(|m| m.content.clone()));
            Ok(())
        }

        async fn send_warning_batch(
            &self,
            warnings: &[&PrivacyWarning],
        ) -> Result<(), CollectorError> {
            if let Some(err) = self.batch_failures.lock().pop_front() {
                return Err(err);
            }
            self.batch_sizes.lock().push(warnings.len());
            let mut delivered = self.delivered.lock();
            delivered.extend(warnings.iter().map(|w| w.content.clone()));
            Ok(())
        }

        async fn health(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    fn message(content: &str) -> ConversationMessage {
        ConversationMessage {
            bot_id: "div#chat..-0".into(),
            sender: Sender::Bot,
            content: content.into(),
            timestamp: Utc::now(),
            url: "https://shop.example/".into(),
            hostname: Some("shop.example".into()),
            risks: Vec::new(),
            risk_level: None,
        }
    }

    async fn setup(
        collector: ScriptedCollector,
        config: DeliveryConfig,
    ) -> (tempfile::TempDir, Arc<ScriptedCollector>, Arc<DeliveryQueue>, Dispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::init_pool(&dir.path().join("fallback.db"))
            .await
            .unwrap();
        let collector = Arc::new(collector);
        let queue = Arc::new(DeliveryQueue::new());
        let dispatcher = Dispatcher::new(
            queue.clone(),
            collector.clone(),
            FallbackStore::new(pool),
            config,
        );
        (dir, collector, queue, dispatcher)
    }

    #[tokio::test]
    async fn one_flush_sends_one_full_batch_and_leaves_the_rest() {
        let (_dir, collector, queue, dispatcher) =
            setup(ScriptedCollector::healthy(), DeliveryConfig::default()).await;
        for i in 0..12 {
            queue.enqueue_message(message(&format!("m{i}")));
        }

        dispatcher.flush().await;

        assert_eq!(collector.batch_sizes.lock().as_slice(), &[10]);
        assert_eq!(queue.snapshot().messages, 2);
        assert_eq!(dispatcher.stats().delivered, 10);
    }

    #[tokio::test]
    async fn items_survive_two_failures_and_deliver_on_the_third_attempt() {
        let collector = ScriptedCollector::healthy().fail_batches(vec![
            CollectorError::Rejected(500),
            CollectorError::Rejected(502),
        ]);
        let (_dir, collector, queue, dispatcher) =
            setup(collector, DeliveryConfig::default()).await;
        for i in 0..3 {
            queue.enqueue_message(message(&format!("m{i}")));
        }

        dispatcher.flush().await;
        dispatcher.flush().await;

        // Both attempts failed; every item is back at the front with two
        // retries on the clock.
        let pending = queue.drain_batch(PayloadKind::Message, 10);
        assert_eq!(pending.len(), 3);
        for item in &pending {
            assert_eq!(item.retry_count, 2);
            assert!(item.last_retry_at.is_some());
        }
        queue.requeue_front(PayloadKind::Message, pending);

        dispatcher.flush().await;

        assert_eq!(dispatcher.stats().delivered, 3);
        assert_eq!(dispatcher.stats().dropped, 0);
        assert_eq!(queue.snapshot().messages, 0);
        assert_eq!(collector.delivered.lock().len(), 3);
    }

    #[tokio::test]
    async fn item_is_dropped_after_max_retries_and_never_reappears() {
        let collector = ScriptedCollector::healthy().fail_batches(vec![
            CollectorError::Rejected(500),
            CollectorError::Rejected(500),
            CollectorError::Rejected(500),
            CollectorError::Rejected(500),
            CollectorError::Rejected(500),
        ]);
        let (_dir, collector, queue, dispatcher) =
            setup(collector, DeliveryConfig::default()).await;
        queue.enqueue_message(message("doomed"));

        for _ in 0..4 {
            dispatcher.flush().await;
        }

        assert_eq!(dispatcher.stats().dropped, 1);
        assert_eq!(queue.snapshot().messages, 0);

        // Nothing left: a further flush never reaches the collector.
        dispatcher.flush().await;
        assert_eq!(collector.batch_sizes.lock().len(), 0);
        assert_eq!(dispatcher.stats().delivered, 0);
    }

    #[tokio::test]
    async fn unreachable_collector_persists_instead_of_dropping() {
        let collector = ScriptedCollector::healthy().fail_batches(vec![
            CollectorError::Unreachable("connect refused".into()),
        ]);
        let config = DeliveryConfig {
            max_retries: 0,
            ..DeliveryConfig::default()
        };
        let (_dir, _collector, queue, dispatcher) = setup(collector, config).await;
        queue.enqueue_warning(
            PrivacyWarning::from_message(&ConversationMessage {
                risks: crate::risk::scan("My SSN is 123-45-6789"),
                risk_level: Some(crate::domain::RiskSeverity::VeryHigh),
                ..message("My SSN is 123-45-6789")
            })
            .unwrap(),
        );

        dispatcher.flush().await;

        assert_eq!(queue.snapshot().warnings, 0);
        assert_eq!(dispatcher.stats().persisted, 1);
        assert_eq!(dispatcher.stats().dropped, 0);
        assert_eq!(dispatcher.fallback.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reconcile_removes_a_record_only_after_acknowledgment() {
        let (_dir, collector, _queue, dispatcher) =
            setup(ScriptedCollector::default(), DeliveryConfig::default()).await;
        dispatcher
            .fallback
            .persist(&EventPayload::Message(message("stored")))
            .await
            .unwrap();

        // Collector down: the record must stay.
        dispatcher.reconcile().await;
        assert_eq!(dispatcher.fallback.count().await.unwrap(), 1);

        // Collector up but every replay fails: the record still stays.
        collector.healthy.store(true, Ordering::SeqCst);
        *collector.single_failures.lock() = vec![
            CollectorError::Rejected(500),
            CollectorError::Rejected(500),
            CollectorError::Rejected(500),
        ]
        .into();
        dispatcher.reconcile().await;
        dispatcher.reconcile().await;
        dispatcher.reconcile().await;
        assert_eq!(dispatcher.fallback.count().await.unwrap(), 1);
        assert_eq!(dispatcher.stats().replayed, 0);

        // Replay acknowledged: now, and only now, it is removed.
        dispatcher.reconcile().await;
        assert_eq!(dispatcher.fallback.count().await.unwrap(), 0);
        assert_eq!(dispatcher.stats().replayed, 1);
        assert_eq!(collector.delivered.lock().as_slice(), &["stored"]);
    }

    #[tokio::test]
    async fn replay_failure_keeps_only_the_failed_record() {
        let collector = ScriptedCollector::healthy()
            .fail_singles(vec![CollectorError::Rejected(500)]);
        let (_dir, collector, _queue, dispatcher) =
            setup(collector, DeliveryConfig::default()).await;
        dispatcher
            .fallback
            .persist(&EventPayload::Message(message("first")))
            .await
            .unwrap();
        dispatcher
            .fallback
            .persist(&EventPayload::Message(message("second")))
            .await
            .unwrap();

        dispatcher.reconcile().await;

        // First replay failed and stayed; second went through.
        let left = dispatcher.fallback.list().await.unwrap();
        assert_eq!(left.len(), 1);
        match &left[0].payload {
            EventPayload::Message(m) => assert_eq!(m.content, "first"),
            _ => panic!("wrong payload kind"),
        }
        assert_eq!(collector.delivered.lock().as_slice(), &["second"]);
    }

    #[tokio::test]
    async fn flush_is_single_flight() {
        let (_dir, collector, queue, dispatcher) =
            setup(ScriptedCollector::healthy(), DeliveryConfig::default()).await;
        queue.enqueue_message(message("held"));

        dispatcher.in_flight.store(true, Ordering::SeqCst);
        dispatcher.flush().await;
        assert_eq!(collector.batch_sizes.lock().len(), 0);
        assert_eq!(queue.snapshot().messages, 1);

        dispatcher.in_flight.store(false, Ordering::SeqCst);
        dispatcher.flush().await;
        assert_eq!(collector.batch_sizes.lock().as_slice(), &[1]);
    }

    #[tokio::test]
    async fn shutdown_drain_persists_what_the_collector_rejects() {
        let collector = ScriptedCollector::healthy()
            .fail_singles(vec![CollectorError::Unreachable("down".into())]);
        let (_dir, collector, queue, dispatcher) =
            setup(collector, DeliveryConfig::default()).await;
        queue.enqueue_message(message("persisted"));
        queue.enqueue_message(message("sent"));

        dispatcher.drain_on_shutdown().await;

        assert_eq!(queue.snapshot().messages, 0);
        assert_eq!(dispatcher.fallback.count().await.unwrap(), 1);
        assert_eq!(collector.delivered.lock().as_slice(), &["sent"]);
    }
}
