pub mod classifier;
pub mod element;

pub use classifier::{classify, Classification, BOT_SCORE_THRESHOLD};
pub use element::ElementSnapshot;
