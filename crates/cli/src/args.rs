use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use patchscout_adapters::{AdapterConfig, AdapterMode, PollSettings};
use patchscout_common::{Aggressiveness, ScanType, Severity, ToolKind};
use patchscout_notify::EmailConfig;
use patchscout_orchestrator::{OrchestratorConfig, RunnerConfig, UnknownToolPolicy};
use patchscout_scheduler::SchedulerConfig;
use patchscout_storage::DEFAULT_DATABASE_URL;
use patchscout_telemetry::LogFormat;

#[derive(Parser)]
#[command(name = "patchscout")]
#[command(version)]
#[command(about = "Centralized vulnerability scanning platform", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output: compact or json
    #[arg(long, global = true, env = "PATCHSCOUT_LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the REST and WebSocket API
    Serve(ServeArgs),

    /// Run one scan in the foreground and print its findings
    Scan(ScanArgs),

    /// Show which adapter each tool resolves to
    Tools(EngineArgs),

    /// Load CVE reference records from a JSON array file
    CveImport {
        /// File holding a JSON array of CVE records
        file: PathBuf,

        #[arg(long, env = "PATCHSCOUT_DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
        database_url: String,
    },
}

/// Adapter selection and scan execution settings shared by every command
/// that runs scans.
#[derive(Args, Clone)]
pub struct EngineArgs {
    #[arg(long, env = "PATCHSCOUT_NMAP_MODE", default_value = "auto")]
    pub nmap_mode: AdapterMode,

    #[arg(long, env = "PATCHSCOUT_OPENVAS_MODE", default_value = "mock")]
    pub openvas_mode: AdapterMode,

    #[arg(long, env = "PATCHSCOUT_NESSUS_MODE", default_value = "mock")]
    pub nessus_mode: AdapterMode,

    #[arg(long, env = "PATCHSCOUT_NIKTO_MODE", default_value = "mock")]
    pub nikto_mode: AdapterMode,

    #[arg(long, env = "PATCHSCOUT_NUCLEI_MODE", default_value = "mock")]
    pub nuclei_mode: AdapterMode,

    #[arg(long, env = "NMAP_PATH", default_value = "nmap")]
    pub nmap_path: String,

    #[arg(long, env = "NIKTO_PATH", default_value = "nikto")]
    pub nikto_path: String,

    #[arg(long, env = "NUCLEI_PATH", default_value = "nuclei")]
    pub nuclei_path: String,

    /// openvasd base URL, e.g. https://localhost:3000
    #[arg(long, env = "OPENVASD_URL")]
    pub openvas_url: Option<String>,

    #[arg(long, env = "OPENVASD_API_KEY", hide_env_values = true)]
    pub openvas_api_key: Option<String>,

    /// Nessus base URL, e.g. https://localhost:8834
    #[arg(long, env = "NESSUS_URL")]
    pub nessus_url: Option<String>,

    #[arg(long, env = "NESSUS_ACCESS_KEY", hide_env_values = true)]
    pub nessus_access_key: Option<String>,

    #[arg(long, env = "NESSUS_SECRET_KEY", hide_env_values = true)]
    pub nessus_secret_key: Option<String>,

    /// Reject certificates the HTTP scanners present unless they validate
    #[arg(long, env = "PATCHSCOUT_VERIFY_SCANNER_CERTS")]
    pub verify_scanner_certs: bool,

    /// Seconds between status polls of OpenVAS and Nessus
    #[arg(long, env = "PATCHSCOUT_POLL_INTERVAL", default_value = "5")]
    pub poll_interval: u64,

    /// Status polls before a remote scan is reported partial; each tool's
    /// own bound when unset
    #[arg(long, env = "PATCHSCOUT_POLL_ATTEMPTS")]
    pub poll_attempts: Option<u32>,

    /// Simulated run time of each sample adapter, in milliseconds
    #[arg(long, env = "PATCHSCOUT_MOCK_DELAY_MS")]
    pub mock_delay_ms: Option<u64>,

    /// Upper bound on a single tool run, in seconds
    #[arg(long, env = "PATCHSCOUT_TOOL_TIMEOUT", default_value = "3600")]
    pub tool_timeout: u64,

    /// What to do with unrecognized tool names: skip or reject
    #[arg(long, env = "PATCHSCOUT_UNKNOWN_TOOLS", default_value = "skip")]
    pub unknown_tools: UnknownToolPolicy,

    #[arg(long, env = "PATCHSCOUT_MAX_CONCURRENT_SCANS", default_value = "5")]
    pub max_concurrent_scans: usize,

    /// Seconds a cancelled scan gets to stop its tools
    #[arg(long, env = "PATCHSCOUT_CANCEL_GRACE", default_value = "30")]
    pub cancel_grace: u64,
}

impl EngineArgs {
    pub fn adapter_config(&self) -> AdapterConfig {
        let mut config = AdapterConfig::default()
            .with_mode(ToolKind::Nmap, self.nmap_mode)
            .with_mode(ToolKind::OpenVas, self.openvas_mode)
            .with_mode(ToolKind::Nessus, self.nessus_mode)
            .with_mode(ToolKind::Nikto, self.nikto_mode)
            .with_mode(ToolKind::Nuclei, self.nuclei_mode);
        if let Some(ms) = self.mock_delay_ms {
            config = config.with_mock_delay(Duration::from_millis(ms));
        }

        config.nmap_binary = self.nmap_path.clone();
        config.nikto_binary = self.nikto_path.clone();
        config.nuclei_binary = self.nuclei_path.clone();

        let interval = Duration::from_secs(self.poll_interval.max(1));
        config.openvas.url = self.openvas_url.clone();
        config.openvas.api_key = self.openvas_api_key.clone();
        config.openvas.accept_invalid_certs = !self.verify_scanner_certs;
        config.openvas.poll = PollSettings::new(
            interval,
            self.poll_attempts.unwrap_or(config.openvas.poll.max_attempts),
        );

        config.nessus.url = self.nessus_url.clone();
        config.nessus.access_key = self.nessus_access_key.clone();
        config.nessus.secret_key = self.nessus_secret_key.clone();
        config.nessus.accept_invalid_certs = !self.verify_scanner_certs;
        config.nessus.poll = PollSettings::new(
            interval,
            self.poll_attempts.unwrap_or(config.nessus.poll.max_attempts),
        );
        config
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            unknown_tools: self.unknown_tools,
            tool_timeout: Duration::from_secs(self.tool_timeout),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            max_concurrent_scans: self.max_concurrent_scans,
            cancel_grace: Duration::from_secs(self.cancel_grace),
        }
    }
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long, env = "PATCHSCOUT_LISTEN", default_value = patchscout_api::DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    #[arg(long, env = "PATCHSCOUT_DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// Return internal error details in 500 responses
    #[arg(long, env = "PATCHSCOUT_DEBUG")]
    pub debug: bool,

    /// Allowed CORS origins; any origin when empty
    #[arg(long, env = "PATCHSCOUT_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Scan creations allowed per minute
    #[arg(long, env = "PATCHSCOUT_SCAN_RATE", default_value = "60")]
    pub scan_rate: u32,

    #[arg(long, env = "PATCHSCOUT_SCAN_BURST", default_value = "10")]
    pub scan_burst: u32,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "PATCHSCOUT_METRICS_LISTEN")]
    pub metrics_listen: Option<SocketAddr>,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub email: EmailArgs,

    #[command(flatten)]
    pub schedule: ScheduleArgs,
}

#[derive(Args)]
pub struct EmailArgs {
    #[arg(long = "email-enabled", env = "EMAIL_ENABLED")]
    pub enabled: bool,

    #[arg(long, env = "SMTP_HOST", default_value = "smtp.gmail.com")]
    pub smtp_host: String,

    #[arg(long, env = "SMTP_PORT", default_value = "587")]
    pub smtp_port: u16,

    #[arg(long, env = "SMTP_USERNAME", default_value = "")]
    pub smtp_username: String,

    #[arg(long, env = "SMTP_PASSWORD", default_value = "", hide_env_values = true)]
    pub smtp_password: String,

    /// STARTTLS on the SMTP connection
    #[arg(long, env = "SMTP_USE_TLS", default_value_t = true, action = clap::ArgAction::Set)]
    pub smtp_use_tls: bool,

    #[arg(long, env = "FROM_EMAIL", default_value = "")]
    pub from_email: String,

    #[arg(long, env = "FROM_NAME", default_value = "PatchScout Security")]
    pub from_name: String,

    /// Comma separated alert recipients
    #[arg(long, env = "ALERT_EMAILS", default_value = "")]
    pub alert_emails: String,

    /// Lowest severity that triggers a per-finding alert
    #[arg(long, env = "EMAIL_MIN_SEVERITY", default_value = "high")]
    pub email_min_severity: Severity,
}

impl EmailArgs {
    pub fn config(&self) -> EmailConfig {
        EmailConfig {
            enabled: self.enabled,
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
            smtp_username: self.smtp_username.clone(),
            smtp_password: self.smtp_password.clone(),
            use_tls: self.smtp_use_tls,
            from_email: self.from_email.clone(),
            from_name: self.from_name.clone(),
            recipients: EmailConfig::parse_recipients(&self.alert_emails),
            min_severity: self.email_min_severity,
        }
    }
}

#[derive(Args)]
pub struct ScheduleArgs {
    /// Comma separated targets scanned daily at 02:00 UTC
    #[arg(long, env = "DAILY_SCAN_TARGETS", default_value = "")]
    pub daily_scan_targets: String,

    /// Comma separated targets scanned on Sundays at 01:00 UTC
    #[arg(long, env = "WEEKLY_SCAN_TARGETS", default_value = "")]
    pub weekly_scan_targets: String,

    /// Disable the scheduler and its API routes
    #[arg(long, env = "PATCHSCOUT_NO_SCHEDULER")]
    pub no_scheduler: bool,
}

impl ScheduleArgs {
    pub fn config(&self) -> SchedulerConfig {
        SchedulerConfig {
            daily_targets: SchedulerConfig::parse_targets(&self.daily_scan_targets),
            weekly_targets: SchedulerConfig::parse_targets(&self.weekly_scan_targets),
        }
    }
}

#[derive(Args)]
pub struct ScanArgs {
    /// IP address, CIDR range or hostname
    pub target: String,

    /// Tools to run. Example: nmap,nuclei
    #[arg(short = 't', long, value_delimiter = ',', default_values_t = ToolKind::default_selection())]
    pub tools: Vec<String>,

    /// quick, comprehensive, stealth or custom
    #[arg(long, default_value = "comprehensive")]
    pub scan_type: ScanType,

    /// low, medium or high
    #[arg(long, default_value = "medium")]
    pub aggressiveness: Aggressiveness,

    /// Ports to scan. Examples: 80,443 or 1-1024 or 22,80-90
    #[arg(short, long, default_value = "1-65535")]
    pub ports: String,

    /// Ports removed from --ports
    #[arg(long)]
    pub exclude_ports: Option<String>,

    /// Skip Nmap NSE scripts
    #[arg(long)]
    pub no_nse: bool,

    /// Compliance frameworks to tag the scan with
    #[arg(long, value_delimiter = ',')]
    pub compliance: Vec<String>,

    /// Output format: table, json, csv
    #[arg(short, long, default_value = "table")]
    pub output_format: String,

    /// Persist the scan here instead of an in-memory database
    #[arg(long, env = "PATCHSCOUT_DATABASE_URL")]
    pub database_url: Option<String>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn scan_defaults() {
        let cli = Cli::try_parse_from(["patchscout", "scan", "10.0.0.1"]).unwrap();
        let Commands::Scan(args) = cli.command else {
            panic!("expected scan command");
        };
        assert_eq!(args.tools.len(), 5);
        assert_eq!(args.scan_type, ScanType::Comprehensive);
        assert_eq!(args.ports, "1-65535");
        assert_eq!(args.engine.nmap_mode, AdapterMode::Auto);
        assert_eq!(args.engine.openvas_mode, AdapterMode::Mock);
    }

    #[test]
    fn scan_flags() {
        let cli = Cli::try_parse_from([
            "patchscout",
            "-vv",
            "scan",
            "example.com",
            "-t",
            "nmap,nuclei",
            "--scan-type",
            "quick",
            "--nmap-mode",
            "mock",
            "--tool-timeout",
            "60",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Scan(args) = cli.command else {
            panic!("expected scan command");
        };
        assert_eq!(args.tools, vec!["nmap", "nuclei"]);
        assert_eq!(args.scan_type, ScanType::Quick);
        let config = args.engine.adapter_config();
        assert_eq!(config.mode(ToolKind::Nmap), AdapterMode::Mock);
        assert_eq!(
            args.engine.orchestrator_config().tool_timeout,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn bad_adapter_mode_is_rejected() {
        assert!(Cli::try_parse_from(["patchscout", "tools", "--nmap-mode", "sometimes"]).is_err());
    }

    #[test]
    fn email_settings() {
        let cli = Cli::try_parse_from([
            "patchscout",
            "serve",
            "--email-enabled",
            "--smtp-username",
            "scanner@example.com",
            "--smtp-password",
            "secret",
            "--alert-emails",
            "a@example.com, b@example.com",
            "--email-min-severity",
            "critical",
        ])
        .unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve command");
        };
        let config = args.email.config();
        assert!(config.is_configured());
        assert!(config.use_tls);
        assert_eq!(config.recipients.len(), 2);
        assert_eq!(config.min_severity, Severity::Critical);
    }
}
