pub mod clock;
pub mod draft;
pub mod error;
pub mod orchestrator;
pub mod preview;

pub use clock::{Clock, ManualClock, TokioClock};
pub use draft::DraftReconciler;
pub use error::ApplyError;
pub use orchestrator::{ApplyFailure, ApplyOrchestrator, ApplyOutcome, ApplyReport, ApplyState, PollOptions};
pub use preview::StrategyPreviewer;

#[cfg(test)]
mod testing;
