//! PatchScout Common - shared types and traits
//!
//! Domain records (scans, vulnerabilities, tool results, CVE data), the
//! finding normalization tables, lifecycle events and the traits the
//! orchestrator is built against.

pub mod error;
pub mod events;
pub mod normalize;
pub mod traits;
pub mod types;

pub use error::{AdapterError, ScoutError, ScoutResult};
pub use events::ScanEvent;
pub use traits::{EventSink, ScanLauncher, ScannerAdapter, Storage};
pub use types::{
    Aggressiveness, CveRecord, ExploitStatus, Finding, NetworkSummary, NewScan, NewVulnerability,
    OutcomeMode, Page, PageRequest, Scan, ScanFilter, ScanOutcome, ScanParameters, ScanStatus,
    ScanStatusCounts, ScanType, Severity, SeverityCounts, ToolCompletion, ToolKind, ToolResult,
    ToolStatus, Vulnerability, VulnerabilityFilter,
};

pub use tokio_util::sync::CancellationToken;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
