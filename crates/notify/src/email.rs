//! Email notifications
//!
//! Two messages are sent: an alert for every finding at or above the
//! configured severity, and a summary when a scan completes with at least
//! one finding. Delivery runs in the background so a slow SMTP relay never
//! holds up the scan that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;
use tracing::{debug, error, info};

use patchscout_common::{EventSink, ScanEvent, Severity, SeverityCounts, Vulnerability};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Could not build message: {0}")]
    Message(String),

    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}

/// SMTP and recipient settings.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    /// STARTTLS when true, plaintext otherwise.
    pub use_tls: bool,
    pub from_email: String,
    pub from_name: String,
    pub recipients: Vec<String>,
    pub min_severity: Severity,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            use_tls: true,
            from_email: String::new(),
            from_name: "PatchScout Security".to_string(),
            recipients: Vec::new(),
            min_severity: Severity::High,
        }
    }
}

impl EmailConfig {
    /// Split a comma separated recipient list, dropping blanks.
    pub fn parse_recipients(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn is_configured(&self) -> bool {
        self.enabled
            && !self.smtp_host.is_empty()
            && !self.smtp_username.is_empty()
            && !self.smtp_password.is_empty()
            && !self.recipients.is_empty()
    }

    fn sender(&self) -> &str {
        if self.from_email.is_empty() {
            &self.smtp_username
        } else {
            &self.from_email
        }
    }
}

/// A rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub html_body: String,
    pub recipients: Vec<String>,
}

/// Delivery transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), NotifyError>;
}

/// Blocking lettre SMTP transport, driven from the blocking thread pool.
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn mailbox(address: &str) -> Result<Mailbox, NotifyError> {
        address.parse().map_err(|e: lettre::address::AddressError| NotifyError::Address {
            address: address.to_string(),
            reason: e.to_string(),
        })
    }

    fn build_message(&self, email: &Email) -> Result<Message, NotifyError> {
        let from = format!("{} <{}>", self.config.from_name, self.config.sender());
        let mut builder = Message::builder()
            .from(Self::mailbox(&from)?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML);
        for recipient in &email.recipients {
            builder = builder.to(Self::mailbox(recipient)?);
        }
        builder
            .body(email.html_body.clone())
            .map_err(|e| NotifyError::Message(e.to_string()))
    }

    fn transport(&self) -> Result<SmtpTransport, NotifyError> {
        let creds = Credentials::new(
            self.config.smtp_username.clone(),
            self.config.smtp_password.clone(),
        );
        let builder = if self.config.use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| NotifyError::Transport(e.to_string()))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        };
        Ok(builder
            .port(self.config.smtp_port)
            .credentials(creds)
            .build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        let message = self.build_message(email)?;
        let transport = self.transport()?;

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
.container { max-width: 600px; margin: 0 auto; padding: 20px; }
.content { background: #f9fafb; padding: 20px; margin-top: 20px; }
.footer { margin-top: 20px; padding: 20px; text-align: center; font-size: 12px; color: #666; }
.critical { color: #dc2626; font-weight: bold; }
.high { color: #ea580c; font-weight: bold; }
.medium { color: #ca8a04; font-weight: bold; }
.low { color: #16a34a; font-weight: bold; }";

fn page(header_color: &str, title: &str, subtitle: &str, content: &str, footer: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><style>{STYLE}
.header {{ background: {header_color}; color: white; padding: 20px; text-align: center; }}</style></head>
<body>
<div class="container">
<div class="header"><h1>{title}</h1><p>{subtitle}</p></div>
<div class="content">
{content}
</div>
<div class="footer"><p>{footer}</p></div>
</div>
</body>
</html>"#
    )
}

/// Alert for a single finding.
pub fn render_vulnerability_alert(scan_id: i64, target: &str, vuln: &Vulnerability) -> (String, String) {
    let severity = vuln.severity.as_str();
    let subject = format!(
        "[PatchScout] {} Vulnerability Found - {}",
        severity.to_uppercase(),
        target
    );
    let na = |value: Option<&str>| escape_html(value.unwrap_or("N/A"));

    let content = format!(
        r#"<h2>Vulnerability Details</h2>
<p><strong>Target:</strong> {target}</p>
<p><strong>CVE ID:</strong> {cve}</p>
<p><strong>Title:</strong> {title}</p>
<p><strong>Severity:</strong> <span class="{severity}">{severity_upper}</span></p>
<p><strong>CVSS Score:</strong> {cvss}</p>
<p><strong>Description:</strong> {description}</p>
<p><strong>Affected Component:</strong> {component}</p>
<p><strong>Port/Service:</strong> {port}/{service}</p>
<h3>Recommended Actions</h3>
<p>{solution}</p>
<h3>Scan Information</h3>
<p><strong>Scan ID:</strong> {scan_id}</p>
<p><strong>Detected At:</strong> {detected}</p>"#,
        target = escape_html(target),
        cve = na(vuln.cve_id.as_deref()),
        title = escape_html(&vuln.title),
        severity_upper = severity.to_uppercase(),
        cvss = vuln.cvss_score.unwrap_or(0.0),
        description = escape_html(vuln.description.as_deref().unwrap_or("No description")),
        component = escape_html(vuln.affected_component.as_deref().unwrap_or("Unknown")),
        port = vuln.port.map_or_else(|| "N/A".to_string(), |p| p.to_string()),
        service = na(vuln.service.as_deref()),
        solution = escape_html(vuln.solution.as_deref().unwrap_or("Contact security team")),
        detected = Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
    );

    let body = page(
        "#dc2626",
        "PatchScout Security Alert",
        "Critical Vulnerability Detected",
        &content,
        "This is an automated alert from PatchScout Vulnerability Scanner",
    );
    (subject, body)
}

/// Summary sent when a scan completes.
pub fn render_completion_report(
    scan_id: i64,
    target: &str,
    counts: &SeverityCounts,
    duration_seconds: f64,
) -> (String, String) {
    let subject = format!(
        "[PatchScout] Scan Complete - {} Vulnerabilities Found on {}",
        counts.total, target
    );

    let mut actions = String::new();
    if counts.critical > 0 {
        actions.push_str(&format!(
            "<li><strong>Immediate:</strong> Address {} critical vulnerabilities</li>\n",
            counts.critical
        ));
    }
    if counts.high > 0 {
        actions.push_str(&format!(
            "<li><strong>Urgent:</strong> Remediate {} high-severity issues within 72 hours</li>\n",
            counts.high
        ));
    }
    actions.push_str("<li>Review detailed scan results in PatchScout dashboard</li>\n");
    actions.push_str("<li>Generate comprehensive report for stakeholders</li>");

    let content = format!(
        r#"<h2>Scan Summary</h2>
<p><strong>Target:</strong> {target}</p>
<p><strong>Scan ID:</strong> {scan_id}</p>
<p><strong>Duration:</strong> {duration:.1}s</p>
<p><strong>Total Vulnerabilities:</strong> {total}</p>
<p><span class="critical">{critical}</span> Critical | <span class="high">{high}</span> High | <span class="medium">{medium}</span> Medium | <span class="low">{low}</span> Low</p>
<h3>Recommended Actions</h3>
<ul>
{actions}
</ul>"#,
        target = escape_html(target),
        duration = duration_seconds,
        total = counts.total,
        critical = counts.critical,
        high = counts.high,
        medium = counts.medium,
        low = counts.low,
    );

    let body = page(
        "#2563eb",
        "PatchScout Scan Report",
        "Vulnerability Scan Completed",
        &content,
        "This is an automated report from PatchScout Vulnerability Scanner",
    );
    (subject, body)
}

/// Turns scan events into emails.
pub struct EmailNotifier {
    config: EmailConfig,
    mailer: Arc<dyn Mailer>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self { config, mailer }
    }

    /// Notifier delivering through SMTP with the same settings.
    pub fn smtp(config: EmailConfig) -> Self {
        let mailer = Arc::new(SmtpMailer::new(config.clone()));
        Self::new(config, mailer)
    }

    #[inline]
    #[must_use]
    pub fn should_alert(&self, severity: Severity) -> bool {
        severity >= self.config.min_severity
    }

    pub fn vulnerability_alert(&self, scan_id: i64, target: &str, vuln: &Vulnerability) -> Option<Email> {
        if !self.config.is_configured() || !self.should_alert(vuln.severity) {
            return None;
        }
        let (subject, html_body) = render_vulnerability_alert(scan_id, target, vuln);
        Some(Email {
            subject,
            html_body,
            recipients: self.config.recipients.clone(),
        })
    }

    pub fn completion_report(
        &self,
        scan_id: i64,
        target: &str,
        counts: &SeverityCounts,
        duration_seconds: f64,
    ) -> Option<Email> {
        if !self.config.is_configured() || counts.total == 0 {
            return None;
        }
        let (subject, html_body) = render_completion_report(scan_id, target, counts, duration_seconds);
        Some(Email {
            subject,
            html_body,
            recipients: self.config.recipients.clone(),
        })
    }

    fn dispatch(&self, email: Email) {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            match mailer.send(&email).await {
                Ok(()) => info!(subject = %email.subject, recipients = email.recipients.len(), "email sent"),
                Err(e) => error!(subject = %email.subject, "failed to send email: {}", e),
            }
        });
    }
}

#[async_trait]
impl EventSink for EmailNotifier {
    async fn publish(&self, event: &ScanEvent) {
        let email = match event {
            ScanEvent::VulnerabilityFound {
                scan_id,
                target,
                vulnerability,
            } => self.vulnerability_alert(*scan_id, target, vulnerability),
            ScanEvent::ScanCompleted {
                scan_id,
                target,
                counts,
                duration_seconds,
            } => self.completion_report(*scan_id, target, counts, *duration_seconds),
            _ => None,
        };

        match email {
            Some(email) => self.dispatch(email),
            None => debug!(scan_id = event.scan_id(), "no email for event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchscout_common::ExploitStatus;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct CapturingMailer(mpsc::UnboundedSender<Email>);

    #[async_trait]
    impl Mailer for CapturingMailer {
        async fn send(&self, email: &Email) -> Result<(), NotifyError> {
            let _ = self.0.send(email.clone());
            Ok(())
        }
    }

    fn configured() -> EmailConfig {
        EmailConfig {
            enabled: true,
            smtp_username: "scanner@example.com".into(),
            smtp_password: "secret".into(),
            recipients: EmailConfig::parse_recipients("sec@example.com, ,ops@example.com"),
            ..Default::default()
        }
    }

    fn notifier(config: EmailConfig) -> (EmailNotifier, mpsc::UnboundedReceiver<Email>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EmailNotifier::new(config, Arc::new(CapturingMailer(tx))), rx)
    }

    fn vuln(severity: Severity) -> Vulnerability {
        Vulnerability {
            id: 1,
            scan_id: 1,
            vulnerability_id: "CVE-2024-3456".into(),
            cve_id: Some("CVE-2024-3456".into()),
            title: "SQL <Injection>".into(),
            description: None,
            severity,
            cvss_score: Some(8.6),
            cvss_vector: None,
            affected_component: Some("Web Application".into()),
            affected_version: None,
            port: None,
            service: None,
            discovered_by: "OpenVAS".into(),
            exploit_status: ExploitStatus::PocAvailable,
            solution: None,
            references: Vec::new(),
            tags: Vec::new(),
            evidence: None,
            false_positive: false,
            verified: false,
            discovered_at: Utc::now(),
        }
    }

    #[test]
    fn recipients_are_trimmed() {
        assert_eq!(
            configured().recipients,
            vec!["sec@example.com".to_string(), "ops@example.com".to_string()]
        );
        assert!(configured().is_configured());
        assert!(!EmailConfig::default().is_configured());
    }

    #[test]
    fn alert_threshold() {
        let (n, _rx) = notifier(configured());
        assert!(n.should_alert(Severity::Critical));
        assert!(n.should_alert(Severity::High));
        assert!(!n.should_alert(Severity::Medium));
        assert!(n.vulnerability_alert(1, "example.com", &vuln(Severity::Low)).is_none());
    }

    #[test]
    fn alert_is_rendered_and_escaped() {
        let (n, _rx) = notifier(configured());
        let email = n
            .vulnerability_alert(7, "example.com", &vuln(Severity::High))
            .unwrap();
        assert_eq!(
            email.subject,
            "[PatchScout] HIGH Vulnerability Found - example.com"
        );
        assert!(email.html_body.contains("SQL &lt;Injection&gt;"));
        assert!(email.html_body.contains("Contact security team"));
        assert_eq!(email.recipients.len(), 2);
    }

    #[test]
    fn completion_report_needs_findings() {
        let (n, _rx) = notifier(configured());
        assert!(n
            .completion_report(1, "example.com", &SeverityCounts::default(), 3.0)
            .is_none());

        let counts = SeverityCounts::from_severities([Severity::Critical, Severity::Low]);
        let email = n.completion_report(1, "example.com", &counts, 3.0).unwrap();
        assert!(email.subject.contains("2 Vulnerabilities Found on example.com"));
        assert!(email.html_body.contains("Address 1 critical vulnerabilities"));
        assert!(!email.html_body.contains("Urgent"));
    }

    #[test]
    fn disabled_config_sends_nothing() {
        let (n, _rx) = notifier(EmailConfig::default());
        assert!(n
            .vulnerability_alert(1, "example.com", &vuln(Severity::Critical))
            .is_none());
    }

    #[tokio::test]
    async fn events_are_delivered_in_background() {
        let (n, mut rx) = notifier(configured());

        n.publish(&ScanEvent::VulnerabilityFound {
            scan_id: 2,
            target: "example.com".into(),
            vulnerability: Box::new(vuln(Severity::Critical)),
        })
        .await;
        n.publish(&ScanEvent::ToolStarted {
            scan_id: 2,
            tool: "Nmap".into(),
        })
        .await;

        let email = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(email.subject.starts_with("[PatchScout] CRITICAL"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn smtp_message_builds() {
        let mailer = SmtpMailer::new(configured());
        let email = Email {
            subject: "test".into(),
            html_body: "<p>hi</p>".into(),
            recipients: vec!["sec@example.com".into()],
        };
        assert!(mailer.build_message(&email).is_ok());

        let bad = Email {
            recipients: vec!["not an address".into()],
            ..email
        };
        assert!(matches!(
            mailer.build_message(&bad),
            Err(NotifyError::Address { .. })
        ));
    }
}
