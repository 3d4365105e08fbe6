//! Security assistant
//!
//! A keyword rule table, not a language model. [`classify`] picks the first
//! matching topic; [`respond`] pulls whatever records that topic needs from
//! storage and renders a canned answer with source citations.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use patchscout_common::{
    PageRequest, ScoutError, ScoutResult, Severity, Storage, Vulnerability, VulnerabilityFilter,
};

static CVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bCVE-\d{4}-\d{4,}\b").expect("valid regex"));

const VULNERABILITY_MATCHES: u32 = 5;
const RECENT_SCANS: i64 = 3;
const REMEDIATION_ITEMS: u32 = 3;
const DESCRIPTION_PREVIEW: usize = 100;

const SQLI_ANSWER: &str = r#"**SQL Injection** is one of the most critical web vulnerabilities (OWASP Top 10 #3).

**What it is:**
Attackers inject malicious SQL code into input fields to manipulate database queries.

**Risk:**
- Unauthorized data access
- Data modification/deletion
- Complete database compromise
- Authentication bypass

**Prevention:**
1. Use parameterized queries (prepared statements)
2. Input validation and sanitization
3. Least privilege database accounts
4. Web Application Firewall (WAF)
5. Regular security testing

**Example Attack:**
```sql
' OR '1'='1' --
```

Would you like me to scan your application for SQL injection vulnerabilities?"#;

const XSS_ANSWER: &str = "**Cross-Site Scripting (XSS)** allows attackers to inject malicious scripts into web pages.

**Types:**
1. **Reflected XSS**: Malicious script in URL/input
2. **Stored XSS**: Script stored in database
3. **DOM-based XSS**: Client-side code vulnerability

**Impact:**
- Session hijacking
- Credential theft
- Defacement
- Malware distribution

**Prevention:**
1. Output encoding/escaping
2. Content Security Policy (CSP)
3. HTTPOnly cookies
4. Input validation
5. Use modern frameworks with XSS protection";

const NMAP_ANSWER: &str = "**Nmap** (Network Mapper) is a powerful network scanning tool.

**Key Features:**
- Port scanning
- Service version detection
- OS fingerprinting
- NSE (Nmap Scripting Engine)
- Vulnerability detection

**Common Scan Types:**
- `-sV`: Service version detection
- `-sC`: Default scripts
- `-O`: OS detection
- `-p-`: All ports
- `--script vuln`: Vulnerability scanning

**Usage in PatchScout:**
Every scan can run the nmap binary to identify:
- Open ports and services
- Vulnerable service versions
- Misconfigurations
- Known CVEs

Would you like to run a scan?";

const HELP_ANSWER: &str = "I'm your security assistant. I can help you with:

• **Vulnerability Analysis** - Ask about CVEs, exploits, or specific vulnerabilities
• **Scan Management** - Check scan status, results, and history
• **Security Guidance** - Learn about SQL injection, XSS, and other attacks
• **Risk Assessment** - Get risk scores and remediation priorities
• **Tool Information** - Learn about Nmap, OpenVAS, and scanning techniques

Try asking:
- \"Show me critical vulnerabilities\"
- \"What is SQL injection?\"
- \"How do I fix CVE-2024-1234?\"
- \"What's my current risk score?\"
- \"Tell me about my recent scans\"

What would you like to know?";

fn default_rag_mode() -> bool {
    true
}

fn default_context_window() -> u8 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_rag_mode")]
    pub rag_mode: bool,
    #[serde(default)]
    pub scan_id: Option<i64>,
    #[serde(default = "default_context_window")]
    pub context_window: u8,
}

impl ChatRequest {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            rag_mode: default_rag_mode(),
            scan_id: None,
            context_window: default_context_window(),
        }
    }

    pub fn validate(&self) -> ScoutResult<()> {
        if self.message.trim().is_empty() {
            return Err(ScoutError::InvalidInput("message must not be empty".into()));
        }
        if !(1..=20).contains(&self.context_window) {
            return Err(ScoutError::InvalidInput(
                "context_window must be between 1 and 20".into(),
            ));
        }
        Ok(())
    }
}

/// Citation attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub url: String,
    pub relevance: f64,
}

impl ChatSource {
    fn new(kind: &str, title: impl Into<String>, url: impl Into<String>, relevance: f64) -> Self {
        Self {
            kind: kind.to_string(),
            title: title.into(),
            url: url.into(),
            relevance,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub sources: Vec<ChatSource>,
    pub rag_context_used: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Conversation log of a scan. Conversations are not persisted, so this is
/// always empty.
#[derive(Debug, Clone, Serialize)]
pub struct ChatHistory {
    pub messages: Vec<ChatMessage>,
    pub scan_id: Option<i64>,
}

impl ChatHistory {
    #[must_use]
    pub fn empty(scan_id: i64) -> Self {
        Self {
            messages: Vec::new(),
            scan_id: Some(scan_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Vulnerabilities,
    Scans,
    SqlInjection,
    CrossSiteScripting,
    Nmap,
    Remediation,
    Risk,
    Help,
}

/// First matching rule wins.
pub fn classify(message: &str) -> Topic {
    let text = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if has(&["cve", "vulnerability"]) {
        Topic::Vulnerabilities
    } else if has(&["scan", "target"]) {
        Topic::Scans
    } else if has(&["sql injection", "sqli"]) {
        Topic::SqlInjection
    } else if has(&["xss", "cross-site scripting"]) {
        Topic::CrossSiteScripting
    } else if has(&["nmap", "port scan"]) {
        Topic::Nmap
    } else if has(&["remediation", "fix", "patch"]) {
        Topic::Remediation
    } else if has(&["risk", "score"]) {
        Topic::Risk
    } else {
        Topic::Help
    }
}

/// Answer a chat message.
pub async fn respond(storage: &dyn Storage, request: &ChatRequest) -> ScoutResult<ChatResponse> {
    let topic = classify(&request.message);
    debug!(?topic, "chat message classified");

    let mut sources = Vec::new();
    let message = match topic {
        Topic::Vulnerabilities => vulnerability_answer(storage, &request.message, &mut sources).await?,
        Topic::Scans => scans_answer(storage, &mut sources).await?,
        Topic::SqlInjection => {
            sources.push(ChatSource::new(
                "OWASP",
                "SQL Injection Prevention Cheat Sheet",
                "https://cheatsheetseries.owasp.org/cheatsheets/SQL_Injection_Prevention_Cheat_Sheet.html",
                0.95,
            ));
            SQLI_ANSWER.to_string()
        }
        Topic::CrossSiteScripting => {
            sources.push(ChatSource::new(
                "OWASP",
                "XSS Prevention Cheat Sheet",
                "https://cheatsheetseries.owasp.org/cheatsheets/Cross_Site_Scripting_Prevention_Cheat_Sheet.html",
                0.95,
            ));
            XSS_ANSWER.to_string()
        }
        Topic::Nmap => {
            sources.push(ChatSource::new(
                "Documentation",
                "Nmap Reference Guide",
                "https://nmap.org/book/man.html",
                0.9,
            ));
            NMAP_ANSWER.to_string()
        }
        Topic::Remediation => remediation_answer(storage).await?,
        Topic::Risk => risk_answer(storage).await?,
        Topic::Help => HELP_ANSWER.to_string(),
    };

    Ok(ChatResponse {
        message,
        rag_context_used: request.rag_mode && !sources.is_empty(),
        sources,
        timestamp: Utc::now(),
    })
}

/// Narrow the vulnerability search: an explicit CVE id first, then a
/// severity word, else the message as a title fragment.
fn vulnerability_filter(message: &str) -> (VulnerabilityFilter, Option<String>) {
    let page = PageRequest::new(Some(1), Some(VULNERABILITY_MATCHES));
    if let Some(m) = CVE_RE.find(message) {
        let cve = m.as_str().to_ascii_uppercase();
        let filter = VulnerabilityFilter {
            cve_id: Some(cve.clone()),
            page,
            ..Default::default()
        };
        return (filter, Some(cve));
    }

    let lower = message.to_lowercase();
    let severity = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ]
    .into_iter()
    .find(|s| lower.split_whitespace().any(|w| w == s.as_str()));

    let filter = match severity {
        Some(severity) => VulnerabilityFilter {
            severity: Some(severity),
            page,
            ..Default::default()
        },
        None => VulnerabilityFilter {
            title: Some(lower.trim().to_string()),
            page,
            ..Default::default()
        },
    };
    (filter, None)
}

fn preview(text: Option<&str>) -> String {
    let text = text.unwrap_or("No description available");
    let head: String = text.chars().take(DESCRIPTION_PREVIEW).collect();
    format!("{head}...")
}

fn render_vulnerability(out: &mut String, v: &Vulnerability) {
    out.push_str(&format!(
        "• **{}** ({})\n",
        v.title,
        v.severity.as_str().to_uppercase()
    ));
    out.push_str(&format!(
        "  CVE: {} | CVSS: {}\n",
        v.cve_id.as_deref().unwrap_or("N/A"),
        v.cvss_score.map_or_else(|| "N/A".to_string(), |s| s.to_string())
    ));
    out.push_str(&format!("  {}\n\n", preview(v.description.as_deref())));
}

async fn vulnerability_answer(
    storage: &dyn Storage,
    message: &str,
    sources: &mut Vec<ChatSource>,
) -> ScoutResult<String> {
    let (filter, cve) = vulnerability_filter(message);
    let mut out = String::new();

    if let Some(cve) = cve.as_deref() {
        if let Some(record) = storage.get_cve(cve).await? {
            out.push_str(&format!("**{}**", record.cve_id));
            if let Some(score) = record.cvss_v3_score {
                out.push_str(&format!(" (CVSS {score})"));
            }
            out.push('\n');
            if let Some(description) = &record.description {
                out.push_str(description);
                out.push('\n');
            }
            if record.kev_listed || record.actively_exploited {
                out.push_str("Known to be exploited in the wild.\n");
            }
            out.push('\n');
            sources.push(ChatSource::new(
                "NVD",
                record.title.clone().unwrap_or_else(|| record.cve_id.clone()),
                format!("https://nvd.nist.gov/vuln/detail/{}", record.cve_id),
                0.95,
            ));
        }
    }

    let found = storage.list_vulnerabilities(&filter).await?.items;
    if found.is_empty() {
        if out.is_empty() {
            return Ok("I couldn't find specific vulnerabilities matching your query. Could you provide more details?".to_string());
        }
        return Ok(out);
    }

    out.push_str(&format!(
        "I found {} vulnerabilities related to your query:\n\n",
        found.len()
    ));
    for v in &found {
        render_vulnerability(&mut out, v);
        sources.push(ChatSource::new(
            if v.cve_id.is_some() { "CVE" } else { "Vulnerability" },
            v.title.clone(),
            format!("/api/vulnerabilities/{}", v.id),
            0.85,
        ));
    }
    Ok(out)
}

async fn scans_answer(storage: &dyn Storage, sources: &mut Vec<ChatSource>) -> ScoutResult<String> {
    let scans = storage.recent_scans(RECENT_SCANS).await?;
    if scans.is_empty() {
        return Ok("You don't have any scans yet. Would you like to start a new scan?".to_string());
    }

    let mut out = String::from("Here are your recent scans:\n\n");
    for s in &scans {
        out.push_str(&format!("• **{}** - {}\n", s.target, s.status));
        out.push_str(&format!("  Found {} vulnerabilities\n", s.total_vulnerabilities));
        out.push_str(&format!(
            "  Critical: {}, High: {}\n\n",
            s.critical_count, s.high_count
        ));
        sources.push(ChatSource::new(
            "Scan",
            format!("Scan: {}", s.target),
            format!("/api/scans/{}", s.id),
            0.9,
        ));
    }
    Ok(out)
}

async fn remediation_answer(storage: &dyn Storage) -> ScoutResult<String> {
    let filter = VulnerabilityFilter {
        severity: Some(Severity::Critical),
        page: PageRequest::new(Some(1), Some(REMEDIATION_ITEMS)),
        ..Default::default()
    };
    let critical = storage.list_vulnerabilities(&filter).await?.items;
    if critical.is_empty() {
        return Ok(
            "No critical vulnerabilities found. Great job! Keep monitoring for new threats."
                .to_string(),
        );
    }

    let mut out = String::from("**Priority Remediation Steps:**\n\n");
    for (i, v) in critical.iter().enumerate() {
        out.push_str(&format!("{}. **{}**\n", i + 1, v.title));
        out.push_str(&format!(
            "   Solution: {}\n",
            v.solution
                .as_deref()
                .unwrap_or("Apply vendor patches immediately")
        ));
        out.push_str(&format!(
            "   Component: {}\n\n",
            v.affected_component.as_deref().unwrap_or("Unknown")
        ));
    }
    Ok(out)
}

async fn risk_answer(storage: &dyn Storage) -> ScoutResult<String> {
    let counts = storage.severity_totals(None).await?;
    let score = (counts.critical * 10 + counts.high * 7) as f64 / counts.total.max(1) as f64;
    let level = if score > 7.0 {
        "CRITICAL"
    } else if score > 4.0 {
        "MEDIUM"
    } else {
        "LOW"
    };

    Ok(format!(
        "**Current Risk Assessment:**

Total Vulnerabilities: {}
Critical: {}
High: {}
Risk Score: {:.1}/10

**Risk Level:** {}

**Recommendations:**
1. Prioritize critical vulnerabilities
2. Apply security patches
3. Conduct regular scans
4. Implement security monitoring",
        counts.total, counts.critical, counts.high, score, level
    ))
}
