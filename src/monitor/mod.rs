pub mod tracker;

pub use tracker::ConversationTracker;
