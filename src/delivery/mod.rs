pub mod collector;
pub mod dispatcher;
pub mod queue;

pub use collector::{Collector, CollectorError, HttpCollector};
pub use dispatcher::Dispatcher;
pub use queue::{DeliveryQueue, EventPayload, PayloadKind, QueueItem};
