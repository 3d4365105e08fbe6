//! Error types for PatchScout
//!
//! `ScoutError` covers the platform as a whole, `AdapterError` is what a
//! single scanner adapter reports back to the orchestrator.

use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Scan {0} not found")]
    ScanNotFound(i64),

    #[error("Vulnerability {0} not found")]
    VulnerabilityNotFound(i64),

    #[error("{0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for PatchScout operations
pub type ScoutResult<T> = Result<T, ScoutError>;

/// Failure reported by a scanner adapter.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The external tool or service could not be reached or is not configured.
    #[error("{tool} unavailable: {reason}")]
    Unavailable { tool: String, reason: String },

    #[error("{tool} failed: {reason}")]
    Failed { tool: String, reason: String },

    #[error("Could not parse {tool} output: {reason}")]
    Parse { tool: String, reason: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AdapterError {
    pub fn unavailable(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn failed(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[inline]
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
