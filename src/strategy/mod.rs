//! Trading strategy
//!
//! Pure per-tick decision components:
//! - `rug_pull` - liquidity / price-collapse heuristic over the last 10 points
//! - `risk` - stop-loss and take-profit against the average entry
//! - `policy` - priority-ordered combination into one `Action`

pub mod policy;
pub mod risk;
pub mod rug_pull;
pub mod types;

pub use policy::{Decision, DecisionPolicy, DecisionReason};
pub use risk::RiskManager;
pub use rug_pull::{RugPullDetector, RugSignal};
pub use types::{Action, OrderSide, RiskAction};
