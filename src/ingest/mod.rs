pub mod stdin;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::detect::ElementSnapshot;
use crate::domain::Sender;

/// Inbound events from the host-side capture layer. How the host observes
/// the page (mutation callbacks, polling, replay from a capture log) is its
/// business; the core only reacts to the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEvent {
    /// A node appeared; the tracker classifies it and registers a bot on a
    /// threshold match.
    ElementAdded(ElementSnapshot),
    /// Text was exchanged with (or typed into) the given element.
    Text {
        element: ElementSnapshot,
        sender: Sender,
        text: String,
    },
    /// The owning page/tab context ended; session state is torn down.
    SessionEnded,
}

pub type PageEventSender = mpsc::Sender<PageEvent>;
pub type PageEventReceiver = mpsc::Receiver<PageEvent>;

pub fn channel(capacity: usize) -> (PageEventSender, PageEventReceiver) {
    mpsc::channel(capacity)
}
