//! Real-with-mock-fallback strategy
//!
//! Wraps a live adapter and, when it fails for any reason other than
//! cancellation, answers with the tool's sample outcome instead.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use patchscout_common::{
    AdapterError, OutcomeMode, ScanOutcome, ScanParameters, ScannerAdapter, ToolKind,
};

pub struct FallbackAdapter {
    primary: Arc<dyn ScannerAdapter>,
    fallback: Arc<dyn ScannerAdapter>,
}

impl FallbackAdapter {
    #[must_use]
    pub fn new(primary: Arc<dyn ScannerAdapter>, fallback: Arc<dyn ScannerAdapter>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl ScannerAdapter for FallbackAdapter {
    async fn scan(
        &self,
        target: &str,
        params: &ScanParameters,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, AdapterError> {
        match self.primary.scan(target, params, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) => {
                warn!(
                    tool = %self.primary.tool(),
                    target,
                    error = %e,
                    "live scan failed, using sample results"
                );
                self.fallback.scan(target, params, cancel).await
            }
        }
    }

    fn tool(&self) -> ToolKind {
        self.primary.tool()
    }

    fn mode(&self) -> OutcomeMode {
        self.primary.mode()
    }
}
