use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::{MonitorEvent, RiskSeverity};
use crate::infrastructure::shutdown::ShutdownListener;

/// Local surfacing of monitor events, decoupled from delivery: a user sees
/// the warning the moment it is detected, whatever happens on the network.
///
/// This is the presentation boundary; a real host would hang a badge or a
/// desktop notification off the same subscription.
pub fn spawn(
    mut events: broadcast::Receiver<MonitorEvent>,
    mut shutdown: ShutdownListener,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => surface(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(target: "notify", skipped, "event surfacing lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.notified() => break,
            }
        }
        tracing::info!(target: "notify", "notifier stopped");
    })
}

fn surface(event: &MonitorEvent) {
    match event {
        MonitorEvent::BotDetected(bot) => {
            tracing::info!(
                target: "notify",
                bot_id = %bot.id,
                category = ?bot.category,
                score = bot.score,
                url = %bot.url,
                "AI bot detected"
            );
        }
        MonitorEvent::Warning(warning) => {
            let requested = warning.risk_kinds().join(", ");
            if warning.severity >= RiskSeverity::High {
                tracing::warn!(
                    target: "notify",
                    bot_id = %warning.bot_id,
                    severity = ?warning.severity,
                    requested = %requested,
                    "privacy risk: bot requesting sensitive data"
                );
            } else {
                tracing::info!(
                    target: "notify",
                    bot_id = %warning.bot_id,
                    severity = ?warning.severity,
                    requested = %requested,
                    "privacy notice"
                );
            }
        }
        MonitorEvent::Message(_) => {}
    }
}
