//! Output formatting for scan results

use anyhow::Result;
use std::time::Duration;

use patchscout_analysis::{csv_report, json_report};
use patchscout_common::{Scan, ToolResult, Vulnerability};

/// Print a finished scan in the requested format
pub fn print_results(
    scan: &Scan,
    vulnerabilities: &[Vulnerability],
    tool_results: &[ToolResult],
    format: &str,
    scan_duration: Duration,
) -> Result<()> {
    let format = format.trim().to_lowercase();
    match format.as_str() {
        "json" | "j" => print_json(scan, vulnerabilities, tool_results)?,
        "csv" | "c" => print!("{}", csv_report(vulnerabilities)),
        "table" | "text" | "t" | "" => print_table(scan, vulnerabilities, tool_results, scan_duration),
        _ => {
            eprintln!("Warning: Unknown format '{}', using default table format", format);
            print_table(scan, vulnerabilities, tool_results, scan_duration);
        }
    }
    Ok(())
}

/// Findings sorted most severe first, then by CVSS score
fn sorted(vulnerabilities: &[Vulnerability]) -> Vec<&Vulnerability> {
    let mut sorted: Vec<&Vulnerability> = vulnerabilities.iter().collect();
    sorted.sort_by(|a, b| {
        b.severity.cmp(&a.severity).then_with(|| {
            b.cvss_score
                .unwrap_or(0.0)
                .total_cmp(&a.cvss_score.unwrap_or(0.0))
        })
    });
    sorted
}

fn print_table(
    scan: &Scan,
    vulnerabilities: &[Vulnerability],
    tool_results: &[ToolResult],
    scan_duration: Duration,
) {
    println!("\n{:-<100}", "");
    println!(
        "{:<10} {:<18} {:<8} {:<10} {:<50}",
        "SEVERITY", "CVE", "PORT", "TOOL", "TITLE"
    );
    println!("{:-<100}", "");

    if vulnerabilities.is_empty() {
        println!("No vulnerabilities found.");
    }
    for vuln in sorted(vulnerabilities) {
        println!(
            "{:<10} {:<18} {:<8} {:<10} {:<50}",
            vuln.severity.as_str(),
            vuln.cve_id.as_deref().unwrap_or("-"),
            vuln.port.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            vuln.discovered_by,
            truncate(&vuln.title, 50)
        );
    }

    println!("{:-<100}", "");
    println!("\nSummary for scan {} ({}):", scan.id, scan.target);
    println!("  Status: {}", scan.status);
    println!(
        "  Vulnerabilities: {} (critical {}, high {}, medium {}, low {})",
        scan.total_vulnerabilities,
        scan.critical_count,
        scan.high_count,
        scan.medium_count,
        scan.low_count
    );
    println!(
        "  Open ports: {}  Services: {}",
        scan.open_ports_count, scan.services_detected
    );
    if let Some(os) = &scan.os_fingerprint {
        println!("  OS: {}", os);
    }
    for result in tool_results {
        let mode = result.mode.map(|m| m.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "  {:<8} {:<9} mode={:<5} findings={}",
            result.tool_name, result.status.as_str(), mode, result.vulnerabilities_found
        );
    }
    println!("  Scan duration: {}", format_duration(scan_duration));
    println!();
}

fn print_json(
    scan: &Scan,
    vulnerabilities: &[Vulnerability],
    tool_results: &[ToolResult],
) -> Result<()> {
    let report = json_report(scan, vulnerabilities, tool_results);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let head: String = text.chars().take(width - 3).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Format duration in a human-readable way
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs == 0 {
        format!("{}ms", millis)
    } else if total_secs < 60 {
        if millis > 0 {
            format!("{}.{:03}s", total_secs, millis)
        } else {
            format!("{}s", total_secs)
        }
    } else {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchscout_common::Severity;

    fn vuln(title: &str, severity: Severity, cvss: Option<f64>) -> Vulnerability {
        let mut v: Vulnerability = serde_json::from_value(serde_json::json!({
            "id": 1,
            "scan_id": 1,
            "vulnerability_id": "nmap-1",
            "cve_id": null,
            "title": title,
            "description": null,
            "severity": "low",
            "cvss_score": null,
            "cvss_vector": null,
            "affected_component": null,
            "affected_version": null,
            "port": 22,
            "service": "ssh",
            "discovered_by": "Nmap",
            "exploit_status": "not_available",
            "solution": null,
            "references": [],
            "tags": [],
            "evidence": null,
            "false_positive": false,
            "verified": false,
            "discovered_at": "2024-05-10T12:00:00Z"
        }))
        .unwrap();
        v.severity = severity;
        v.cvss_score = cvss;
        v
    }

    #[test]
    fn test_sorted_by_severity_then_cvss() {
        let vulns = vec![
            vuln("low", Severity::Low, Some(3.0)),
            vuln("high-7", Severity::High, Some(7.0)),
            vuln("critical", Severity::Critical, None),
            vuln("high-8", Severity::High, Some(8.1)),
        ];
        let titles: Vec<&str> = sorted(&vulns).iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, ["critical", "high-8", "high-7", "low"]);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer title", 10), "a much ...");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_millis(5500)), "5.500s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
    }
}
