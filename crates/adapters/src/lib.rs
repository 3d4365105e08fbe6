//! PatchScout Adapters - One scanner adapter per external tool
//!
//! Each adapter turns a target and scan parameters into a [`ScanOutcome`]:
//! - Nmap, Nikto and Nuclei run as local processes
//! - OpenVAS and Nessus are driven over their HTTP APIs
//! - every tool also has a deterministic sample adapter
//!
//! [`AdapterConfig::build`] picks the implementation per tool from its
//! [`AdapterMode`].
//!
//! [`ScanOutcome`]: patchscout_common::ScanOutcome

mod fallback;
mod http;
mod mock;
mod nessus;
mod nikto;
mod nmap;
mod nuclei;
mod openvas;
mod poll;
mod process;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use patchscout_common::{ScannerAdapter, ScoutError, ScoutResult, ToolKind};

pub use fallback::FallbackAdapter;
pub use mock::{default_delay, sample_outcome, MockAdapter};
pub use nessus::{NessusAdapter, NessusSettings, DEFAULT_TEMPLATE_UUID};
pub use nikto::NiktoAdapter;
pub use nmap::{parse_normal_output, NmapAdapter, NmapReport};
pub use nuclei::NucleiAdapter;
pub use openvas::{OpenVasAdapter, OpenVasSettings};
pub use poll::{poll_until, PollOutcome, PollSettings};
pub use process::{run_command, CommandOutput};

/// How a tool's adapter is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterMode {
    /// Sample results only.
    Mock,
    /// Live tool only; failures become failed tool results.
    Real,
    /// Live tool, falling back to sample results when it fails.
    Auto,
}

impl AdapterMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AdapterMode::Mock => "mock",
            AdapterMode::Real => "real",
            AdapterMode::Auto => "auto",
        }
    }
}

impl FromStr for AdapterMode {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(AdapterMode::Mock),
            "real" => Ok(AdapterMode::Real),
            "auto" => Ok(AdapterMode::Auto),
            other => Err(ScoutError::Config(format!(
                "invalid adapter mode '{}' (expected mock, real or auto)",
                other
            ))),
        }
    }
}

/// Everything needed to build the adapter registry.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    modes: HashMap<ToolKind, AdapterMode>,
    /// Overrides every sample adapter's simulated run time.
    pub mock_delay: Option<Duration>,
    pub nmap_binary: String,
    pub nikto_binary: String,
    pub nuclei_binary: String,
    pub openvas: OpenVasSettings,
    pub nessus: NessusSettings,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        let modes = ToolKind::ALL
            .iter()
            .map(|tool| {
                let mode = match tool {
                    ToolKind::Nmap => AdapterMode::Auto,
                    _ => AdapterMode::Mock,
                };
                (*tool, mode)
            })
            .collect();
        Self {
            modes,
            mock_delay: None,
            nmap_binary: "nmap".into(),
            nikto_binary: "nikto".into(),
            nuclei_binary: "nuclei".into(),
            openvas: OpenVasSettings::default(),
            nessus: NessusSettings::default(),
        }
    }
}

impl AdapterConfig {
    /// Every tool in sample mode, with no simulated delay.
    #[must_use]
    pub fn all_mock() -> Self {
        let mut config = Self::default().with_mock_delay(Duration::ZERO);
        for tool in ToolKind::ALL {
            config.modes.insert(tool, AdapterMode::Mock);
        }
        config
    }

    #[must_use]
    pub fn mode(&self, tool: ToolKind) -> AdapterMode {
        self.modes.get(&tool).copied().unwrap_or(AdapterMode::Mock)
    }

    #[inline]
    #[must_use]
    pub fn with_mode(mut self, tool: ToolKind, mode: AdapterMode) -> Self {
        self.modes.insert(tool, mode);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_mock_delay(mut self, delay: Duration) -> Self {
        self.mock_delay = Some(delay);
        self
    }

    fn mock(&self, tool: ToolKind) -> Arc<dyn ScannerAdapter> {
        let adapter = MockAdapter::new(tool);
        Arc::new(match self.mock_delay {
            Some(delay) => adapter.with_delay(delay),
            None => adapter,
        })
    }

    fn live(&self, tool: ToolKind) -> ScoutResult<Arc<dyn ScannerAdapter>> {
        Ok(match tool {
            ToolKind::Nmap => Arc::new(NmapAdapter::new(self.nmap_binary.clone())),
            ToolKind::Nikto => Arc::new(NiktoAdapter::new(self.nikto_binary.clone())),
            ToolKind::Nuclei => Arc::new(NucleiAdapter::new(self.nuclei_binary.clone())),
            ToolKind::OpenVas => Arc::new(OpenVasAdapter::new(self.openvas.clone())?),
            ToolKind::Nessus => Arc::new(NessusAdapter::new(self.nessus.clone())?),
        })
    }

    /// Build one adapter per tool, honoring each tool's mode.
    pub fn build(&self) -> ScoutResult<Vec<Arc<dyn ScannerAdapter>>> {
        ToolKind::ALL
            .iter()
            .map(|&tool| {
                Ok(match self.mode(tool) {
                    AdapterMode::Mock => self.mock(tool),
                    AdapterMode::Real => self.live(tool)?,
                    AdapterMode::Auto => {
                        Arc::new(FallbackAdapter::new(self.live(tool)?, self.mock(tool)))
                    }
                })
            })
            .collect()
    }
}
