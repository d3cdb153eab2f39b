//! Position management module
//!
//! Each worker owns one `PositionState`; it only changes when the exchange
//! confirms a fill.

pub mod state;
pub mod stats;

pub use state::PositionState;
pub use stats::SessionStats;
