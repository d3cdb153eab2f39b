//! Market data module - ticks, derived features and per-market history

pub mod features;
pub mod history;
pub mod types;

pub use features::FeatureEngine;
pub use history::History;
pub use types::{FeatureVector, Tick};
