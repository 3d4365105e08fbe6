//! Scan lifecycle events
//!
//! Published by the orchestrator and scan runner; consumed by notification
//! collaborators (WebSocket push, email) through [`crate::EventSink`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{OutcomeMode, ScanStatus, SeverityCounts, ToolStatus, Vulnerability};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    ScanStarted {
        scan_id: i64,
        target: String,
        tools: Vec<String>,
        at: DateTime<Utc>,
    },
    ToolStarted {
        scan_id: i64,
        tool: String,
    },
    ToolCompleted {
        scan_id: i64,
        tool: String,
        status: ToolStatus,
        mode: Option<OutcomeMode>,
        vulnerabilities_found: i64,
        duration_seconds: f64,
        error: Option<String>,
    },
    VulnerabilityFound {
        scan_id: i64,
        target: String,
        vulnerability: Box<Vulnerability>,
    },
    ScanCompleted {
        scan_id: i64,
        target: String,
        counts: SeverityCounts,
        duration_seconds: f64,
    },
    ScanFailed {
        scan_id: i64,
        target: String,
        error: String,
    },
    ScanCancelled {
        scan_id: i64,
        target: String,
    },
}

impl ScanEvent {
    #[must_use]
    pub const fn scan_id(&self) -> i64 {
        match self {
            ScanEvent::ScanStarted { scan_id, .. }
            | ScanEvent::ToolStarted { scan_id, .. }
            | ScanEvent::ToolCompleted { scan_id, .. }
            | ScanEvent::VulnerabilityFound { scan_id, .. }
            | ScanEvent::ScanCompleted { scan_id, .. }
            | ScanEvent::ScanFailed { scan_id, .. }
            | ScanEvent::ScanCancelled { scan_id, .. } => *scan_id,
        }
    }

    /// Terminal status implied by this event, if it ends a scan.
    #[must_use]
    pub const fn terminal_status(&self) -> Option<ScanStatus> {
        match self {
            ScanEvent::ScanCompleted { .. } => Some(ScanStatus::Completed),
            ScanEvent::ScanFailed { .. } => Some(ScanStatus::Failed),
            ScanEvent::ScanCancelled { .. } => Some(ScanStatus::Cancelled),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ScanEvent::ToolStarted {
            scan_id: 7,
            tool: "Nmap".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_started");
        assert_eq!(json["scan_id"], 7);
        assert_eq!(event.scan_id(), 7);
        assert!(event.terminal_status().is_none());
    }
}
