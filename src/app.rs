use std::{sync::Arc, time::Duration};

use anyhow::Result;
use reqwest::Client;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::timeout,
};

use crate::{
    ai::{GeminiClient, MessageAnalyzer},
    config::AppConfig,
    db::{self, FallbackStore},
    delivery::{DeliveryQueue, Dispatcher, HttpCollector},
    domain::MonitorEvent,
    infrastructure::{directories::ResolvedPaths, notifier, shutdown::Shutdown},
    ingest::{self, stdin, PageEventSender},
    monitor::ConversationTracker,
};

const PAGE_EVENT_CAPACITY: usize = 256;
const EVENT_BUS_CAPACITY: usize = 128;

pub struct BotSentryApp {
    _paths: ResolvedPaths,
    tracker_handle: JoinHandle<()>,
    maintenance_handle: JoinHandle<()>,
    flush_handle: JoinHandle<()>,
    reconcile_handle: JoinHandle<()>,
    notifier_handle: JoinHandle<()>,
    ingest_handle: JoinHandle<()>,
    analyzer_handle: Option<JoinHandle<()>>,
    tracker: Arc<ConversationTracker>,
    queue: Arc<DeliveryQueue>,
    dispatcher: Arc<Dispatcher>,
    fallback: FallbackStore,
    events: PageEventSender,
    shutdown: Shutdown,
}

impl BotSentryApp {
    pub async fn initialize(
        config: AppConfig,
        paths: ResolvedPaths,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let pool = db::init_pool(&paths.db_path).await?;
        let fallback = FallbackStore::new(pool);
        tracing::info!(
            data_dir = %paths.data_dir.display(),
            db = %paths.db_path.display(),
            "fallback store ready"
        );

        let http_client = Client::builder()
            .user_agent(format!("botsentry/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        let collector = Arc::new(HttpCollector::new(http_client.clone(), &config.collector)?);
        let queue = Arc::new(DeliveryQueue::new());
        let (bus, _) = broadcast::channel::<MonitorEvent>(EVENT_BUS_CAPACITY);

        let tracker = Arc::new(ConversationTracker::new(
            queue.clone(),
            bus.clone(),
            config.detection.clone(),
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            queue.clone(),
            collector,
            fallback.clone(),
            config.delivery.clone(),
        ));

        let (events, receiver) = ingest::channel(PAGE_EVENT_CAPACITY);

        let tracker_handle = tracker.clone().spawn(receiver, shutdown.subscribe());
        let maintenance_handle = tracker.clone().spawn_maintenance(shutdown.subscribe());
        let flush_handle = dispatcher.clone().spawn_flush_loop(shutdown.subscribe());
        let reconcile_handle = dispatcher
            .clone()
            .spawn_reconcile_loop(shutdown.subscribe());
        let notifier_handle = notifier::spawn(bus.subscribe(), shutdown.subscribe());
        let ingest_handle = stdin::spawn(events.clone(), shutdown.subscribe());

        let gemini = GeminiClient::new(http_client, config.gemini.clone());
        let analyzer_handle = if gemini.is_configured() {
            let analyzer = Arc::new(MessageAnalyzer::new(gemini, tracker.clone()));
            Some(analyzer.spawn(bus.subscribe(), shutdown.subscribe()))
        } else {
            tracing::info!("GEMINI_API_KEY not set; supplementary analysis disabled");
            None
        };

        Ok(Self {
            _paths: paths,
            tracker_handle,
            maintenance_handle,
            flush_handle,
            reconcile_handle,
            notifier_handle,
            ingest_handle,
            analyzer_handle,
            tracker,
            queue,
            dispatcher,
            fallback,
            events,
            shutdown,
        })
    }

    pub async fn run(self) -> Result<()> {
        let BotSentryApp {
            _paths: _,
            mut tracker_handle,
            maintenance_handle,
            flush_handle,
            reconcile_handle,
            notifier_handle,
            ingest_handle,
            analyzer_handle,
            tracker,
            queue,
            dispatcher,
            fallback,
            events,
            shutdown,
        } = self;

        tracing::info!("botsentry monitor started");

        let mut shutdown_listener = shutdown.subscribe();
        let shutdown_timeout = Duration::from_secs(5);
        let mut tracker_completed = false;

        tokio::select! {
            _ = shutdown_listener.notified() => {
                tracing::info!("shutdown signal received (CTRL+C / SIGTERM)");
            }
            res = &mut tracker_handle => {
                tracker_completed = true;
                if let Err(err) = res {
                    if err.is_panic() {
                        tracing::error!("tracker ended in a panic");
                    }
                }
                tracing::info!("tracker finished; shutting down");
            }
        }

        shutdown.trigger();
        drop(events);

        let pending = queue.snapshot();
        tracing::info!(
            messages = pending.messages,
            warnings = pending.warnings,
            "draining delivery queues"
        );

        // Queued events first, then anything the flush could not place.
        if timeout(shutdown_timeout, dispatcher.force_flush())
            .await
            .is_err()
        {
            tracing::warn!(
                target: "delivery",
                "final flush did not complete within {:?}",
                shutdown_timeout
            );
        }
        if timeout(shutdown_timeout, dispatcher.drain_on_shutdown())
            .await
            .is_err()
        {
            tracing::warn!(
                target: "delivery",
                "shutdown drain did not complete within {:?}",
                shutdown_timeout
            );
        }

        let mut handles = Vec::new();
        if !tracker_completed {
            handles.push(("tracker", tracker_handle));
        }
        handles.extend([
            ("maintenance", maintenance_handle),
            ("flush", flush_handle),
            ("reconcile", reconcile_handle),
            ("notifier", notifier_handle),
            ("ingest", ingest_handle),
        ]);
        if let Some(handle) = analyzer_handle {
            handles.push(("analyzer", handle));
        }
        for (name, mut handle) in handles {
            let wait = tokio::time::sleep(shutdown_timeout);
            tokio::pin!(wait);
            tokio::select! {
                res = &mut handle => {
                    if let Err(err) = res {
                        if err.is_panic() {
                            tracing::error!(task = name, "task ended in a panic");
                        }
                    }
                }
                _ = &mut wait => {
                    tracing::warn!(task = name, "task did not stop within {:?}; aborting", shutdown_timeout);
                    handle.abort();
                }
            }
        }

        if timeout(shutdown_timeout, fallback.close()).await.is_err() {
            tracing::warn!(
                target: "db",
                "fallback store did not close within {:?}",
                shutdown_timeout
            );
        }

        let detection = tracker.stats();
        let delivery = dispatcher.stats();
        tracing::info!(
            bots = detection.total_bots,
            conversations = detection.total_conversations,
            warnings = detection.total_warnings,
            delivered = delivery.delivered,
            retried = delivery.retried,
            dropped = delivery.dropped,
            persisted = delivery.persisted,
            replayed = delivery.replayed,
            "botsentry monitor stopped"
        );
        Ok(())
    }
}
