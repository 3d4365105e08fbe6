use sqlx::SqlitePool;

use patchscout_common::{ScoutError, ScoutResult};

// List-valued columns (selected tools, references, tags, ...) hold JSON text.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS scans (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    target                TEXT NOT NULL,
    scan_type             TEXT NOT NULL,
    status                TEXT NOT NULL,
    selected_tools        TEXT NOT NULL DEFAULT '[]',
    aggressiveness        TEXT NOT NULL,
    port_range            TEXT NOT NULL,
    exclude_ports         TEXT,
    include_nse           INTEGER NOT NULL DEFAULT 1,
    compliance_frameworks TEXT NOT NULL DEFAULT '[]',
    total_vulnerabilities INTEGER NOT NULL DEFAULT 0,
    critical_count        INTEGER NOT NULL DEFAULT 0,
    high_count            INTEGER NOT NULL DEFAULT 0,
    medium_count          INTEGER NOT NULL DEFAULT 0,
    low_count             INTEGER NOT NULL DEFAULT 0,
    open_ports_count      INTEGER NOT NULL DEFAULT 0,
    services_detected     INTEGER NOT NULL DEFAULT 0,
    os_fingerprint        TEXT,
    started_at            TEXT,
    completed_at          TEXT,
    duration_seconds      REAL,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_scans_status ON scans(status);

CREATE TABLE IF NOT EXISTS vulnerabilities (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id            INTEGER NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
    vulnerability_id   TEXT NOT NULL,
    cve_id             TEXT,
    title              TEXT NOT NULL,
    description        TEXT,
    severity           TEXT NOT NULL,
    cvss_score         REAL,
    cvss_vector        TEXT,
    affected_component TEXT,
    affected_version   TEXT,
    port               INTEGER,
    service            TEXT,
    discovered_by      TEXT NOT NULL,
    exploit_status     TEXT NOT NULL,
    solution           TEXT,
    refs               TEXT NOT NULL DEFAULT '[]',
    tags               TEXT NOT NULL DEFAULT '[]',
    evidence           TEXT,
    false_positive     INTEGER NOT NULL DEFAULT 0,
    verified           INTEGER NOT NULL DEFAULT 0,
    discovered_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_vuln_scan ON vulnerabilities(scan_id);
CREATE INDEX IF NOT EXISTS idx_vuln_severity ON vulnerabilities(severity);
CREATE INDEX IF NOT EXISTS idx_vuln_cve ON vulnerabilities(cve_id);

CREATE TABLE IF NOT EXISTS scan_results (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_id               INTEGER NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
    tool_name             TEXT NOT NULL,
    tool_version          TEXT,
    status                TEXT NOT NULL,
    mode                  TEXT,
    partial               INTEGER NOT NULL DEFAULT 0,
    command               TEXT,
    started_at            TEXT,
    completed_at          TEXT,
    duration_seconds      REAL,
    raw_output            TEXT,
    parsed_output         TEXT,
    error_message         TEXT,
    exit_code             INTEGER,
    vulnerabilities_found INTEGER NOT NULL DEFAULT 0,
    ports_scanned         INTEGER NOT NULL DEFAULT 0,
    hosts_scanned         INTEGER NOT NULL DEFAULT 0,
    created_at            TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_results_scan ON scan_results(scan_id);

CREATE TABLE IF NOT EXISTS cve_data (
    cve_id             TEXT PRIMARY KEY,
    title              TEXT,
    description        TEXT,
    cvss_v3_score      REAL,
    cvss_v3_vector     TEXT,
    cvss_v2_score      REAL,
    cvss_v2_vector     TEXT,
    severity           TEXT,
    cwe_ids            TEXT NOT NULL DEFAULT '[]',
    published_date     TEXT,
    last_modified_date TEXT,
    affected_products  TEXT NOT NULL DEFAULT '[]',
    exploit_available  INTEGER NOT NULL DEFAULT 0,
    exploit_maturity   TEXT,
    refs               TEXT NOT NULL DEFAULT '[]',
    mitre_techniques   TEXT NOT NULL DEFAULT '[]',
    actively_exploited INTEGER NOT NULL DEFAULT 0,
    epss_score         REAL,
    kev_listed         INTEGER NOT NULL DEFAULT 0,
    data_source        TEXT,
    last_synced        TEXT
);
"#;

/// Create every table and index that does not exist yet.
pub async fn apply(pool: &SqlitePool) -> ScoutResult<()> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await
        .map_err(|e| ScoutError::Storage(format!("Failed to apply schema: {e}")))?;
    Ok(())
}
