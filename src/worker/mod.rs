//! Market workers
//!
//! - `WorkerLoop` - the per-market state machine (Running -> Stopping -> Stopped)
//! - `WorkerSupervisor` - starts and stops one worker per market

pub mod runner;
pub mod supervisor;

pub use runner::{StepOutcome, WorkerHandle, WorkerLoop, WorkerReport, WorkerState};
pub use supervisor::WorkerSupervisor;
