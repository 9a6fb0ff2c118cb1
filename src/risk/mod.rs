pub mod engine;
pub mod patterns;

pub use engine::{overall_level, scan};
pub use patterns::severity_for;
