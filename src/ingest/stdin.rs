use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::infrastructure::shutdown::ShutdownListener;

use super::{PageEvent, PageEventSender};

/// Newline-delimited JSON bridge: each stdin line is one [`PageEvent`].
/// Lines that do not parse are logged and skipped; EOF ends the session.
pub fn spawn(sender: PageEventSender, mut shutdown: ShutdownListener) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<PageEvent>(line) {
                            Ok(event) => {
                                if sender.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                tracing::warn!(target: "ingest", error = %err, "unparseable page event line");
                            }
                        }
                    }
                    Ok(None) => {
                        let _ = sender.send(PageEvent::SessionEnded).await;
                        tracing::info!(target: "ingest", "page event input closed");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(target: "ingest", error = %err, "failed to read page event input");
                        break;
                    }
                },
                _ = shutdown.notified() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Sender;

    #[test]
    fn page_events_parse_from_tagged_json() {
        let added: PageEvent = serde_json::from_str(
            r#"{"event":"element_added","tag":"div","id":"chat","visible":true}"#,
        )
        .unwrap();
        assert!(matches!(added, PageEvent::ElementAdded(ref e) if e.id == "chat" && e.visible));

        let text: PageEvent = serde_json::from_str(
            r#"{"event":"text","element":{"tag":"div","id":"chat"},"sender":"bot","text":"hello"}"#,
        )
        .unwrap();
        assert!(matches!(
            text,
            PageEvent::Text { sender: Sender::Bot, ref text, .. } if text == "hello"
        ));

        let ended: PageEvent = serde_json::from_str(r#"{"event":"session_ended"}"#).unwrap();
        assert!(matches!(ended, PageEvent::SessionEnded));
    }
}
