//! Orchestrator - scan execution and lifecycle
//!
//! [`Orchestrator`] fans a scan out to its adapters and aggregates the
//! results; [`ScanRunner`] owns the background task, status transitions and
//! cancellation of each scan.

mod notifier;
mod orchestrator;
mod progress;
mod rate_limiter;
mod runner;

pub use notifier::Notifier;
pub use orchestrator::{OrchestrationReport, Orchestrator, OrchestratorConfig, UnknownToolPolicy};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use rate_limiter::RateLimiter;
pub use runner::{RunnerConfig, ScanRunner};
