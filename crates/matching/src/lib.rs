pub mod config;
pub mod engine;
pub mod scoring;

pub use config::{MatchCriteria, MatchWeights, MatchingConfig};
pub use engine::MatchingEngine;
