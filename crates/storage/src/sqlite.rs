//! SQLite implementation of [`Storage`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Decode, Row, Sqlite, SqlitePool, Type};
use std::str::FromStr;
use tracing::{debug, info};

use patchscout_common::{
    CveRecord, NetworkSummary, NewScan, NewVulnerability, Page, Scan, ScanFilter, ScanParameters,
    ScanStatus, ScanStatusCounts, ScoutError, ScoutResult, Severity, SeverityCounts, Storage,
    ToolCompletion, ToolResult, ToolStatus, Vulnerability, VulnerabilityFilter,
};

use crate::schema;

const SCAN_COLUMNS: &str = r#"
    id, target, scan_type, status, selected_tools, aggressiveness, port_range,
    exclude_ports, include_nse, compliance_frameworks, total_vulnerabilities,
    critical_count, high_count, medium_count, low_count, open_ports_count,
    services_detected, os_fingerprint, started_at, completed_at, duration_seconds,
    created_at, updated_at
"#;

const VULN_COLUMNS: &str = r#"
    id, scan_id, vulnerability_id, cve_id, title, description, severity, cvss_score,
    cvss_vector, affected_component, affected_version, port, service, discovered_by,
    exploit_status, solution, refs, tags, evidence, false_positive, verified, discovered_at
"#;

const RESULT_COLUMNS: &str = r#"
    id, scan_id, tool_name, tool_version, status, mode, partial, command, started_at,
    completed_at, duration_seconds, raw_output, parsed_output, error_message, exit_code,
    vulnerabilities_found, ports_scanned, hosts_scanned, created_at
"#;

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> ScoutError {
    move |e| ScoutError::Storage(format!("{context}: {e}"))
}

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> ScoutResult<T>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| ScoutError::Storage(format!("Failed to read column {name}: {e}")))
}

fn enum_col<T>(row: &SqliteRow, name: &str) -> ScoutResult<T>
where
    T: FromStr<Err = ScoutError>,
{
    let raw: String = col(row, name)?;
    raw.parse()
        .map_err(|e| ScoutError::Storage(format!("Invalid value in column {name}: {e}")))
}

fn json_col<T: DeserializeOwned + Default>(row: &SqliteRow, name: &str) -> ScoutResult<T> {
    let raw: Option<String> = col(row, name)?;
    match raw.as_deref() {
        None | Some("") => Ok(T::default()),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| ScoutError::Storage(format!("Invalid JSON in column {name}: {e}"))),
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> ScoutResult<String> {
    serde_json::to_string(value)
        .map_err(|e| ScoutError::Storage(format!("Failed to encode JSON column: {e}")))
}

fn port_col(row: &SqliteRow) -> ScoutResult<Option<u16>> {
    let raw: Option<i64> = col(row, "port")?;
    Ok(raw.and_then(|p| u16::try_from(p).ok()))
}

fn map_scan(row: &SqliteRow) -> ScoutResult<Scan> {
    Ok(Scan {
        id: col(row, "id")?,
        target: col(row, "target")?,
        status: enum_col(row, "status")?,
        selected_tools: json_col(row, "selected_tools")?,
        parameters: ScanParameters {
            scan_type: enum_col(row, "scan_type")?,
            aggressiveness: enum_col(row, "aggressiveness")?,
            port_range: col(row, "port_range")?,
            exclude_ports: col(row, "exclude_ports")?,
            include_nse: col(row, "include_nse")?,
            compliance_frameworks: json_col(row, "compliance_frameworks")?,
        },
        total_vulnerabilities: col(row, "total_vulnerabilities")?,
        critical_count: col(row, "critical_count")?,
        high_count: col(row, "high_count")?,
        medium_count: col(row, "medium_count")?,
        low_count: col(row, "low_count")?,
        open_ports_count: col(row, "open_ports_count")?,
        services_detected: col(row, "services_detected")?,
        os_fingerprint: col(row, "os_fingerprint")?,
        started_at: col(row, "started_at")?,
        completed_at: col(row, "completed_at")?,
        duration_seconds: col(row, "duration_seconds")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn map_vulnerability(row: &SqliteRow) -> ScoutResult<Vulnerability> {
    Ok(Vulnerability {
        id: col(row, "id")?,
        scan_id: col(row, "scan_id")?,
        vulnerability_id: col(row, "vulnerability_id")?,
        cve_id: col(row, "cve_id")?,
        title: col(row, "title")?,
        description: col(row, "description")?,
        severity: enum_col(row, "severity")?,
        cvss_score: col(row, "cvss_score")?,
        cvss_vector: col(row, "cvss_vector")?,
        affected_component: col(row, "affected_component")?,
        affected_version: col(row, "affected_version")?,
        port: port_col(row)?,
        service: col(row, "service")?,
        discovered_by: col(row, "discovered_by")?,
        exploit_status: enum_col(row, "exploit_status")?,
        solution: col(row, "solution")?,
        references: json_col(row, "refs")?,
        tags: json_col(row, "tags")?,
        evidence: col(row, "evidence")?,
        false_positive: col(row, "false_positive")?,
        verified: col(row, "verified")?,
        discovered_at: col(row, "discovered_at")?,
    })
}

fn map_tool_result(row: &SqliteRow) -> ScoutResult<ToolResult> {
    let mode: Option<String> = col(row, "mode")?;
    let parsed_output: Option<serde_json::Value> = json_col(row, "parsed_output")?;
    Ok(ToolResult {
        id: col(row, "id")?,
        scan_id: col(row, "scan_id")?,
        tool_name: col(row, "tool_name")?,
        tool_version: col(row, "tool_version")?,
        status: enum_col(row, "status")?,
        mode: mode.as_deref().map(str::parse).transpose()?,
        partial: col(row, "partial")?,
        command: col(row, "command")?,
        started_at: col(row, "started_at")?,
        completed_at: col(row, "completed_at")?,
        duration_seconds: col(row, "duration_seconds")?,
        raw_output: col(row, "raw_output")?,
        parsed_output,
        error_message: col(row, "error_message")?,
        exit_code: col(row, "exit_code")?,
        vulnerabilities_found: col(row, "vulnerabilities_found")?,
        ports_scanned: col(row, "ports_scanned")?,
        hosts_scanned: col(row, "hosts_scanned")?,
        created_at: col(row, "created_at")?,
    })
}

fn map_cve(row: &SqliteRow) -> ScoutResult<CveRecord> {
    let severity: Option<String> = col(row, "severity")?;
    Ok(CveRecord {
        cve_id: col(row, "cve_id")?,
        title: col(row, "title")?,
        description: col(row, "description")?,
        cvss_v3_score: col(row, "cvss_v3_score")?,
        cvss_v3_vector: col(row, "cvss_v3_vector")?,
        cvss_v2_score: col(row, "cvss_v2_score")?,
        cvss_v2_vector: col(row, "cvss_v2_vector")?,
        severity: severity.as_deref().map(Severity::from_str).transpose()?,
        cwe_ids: json_col(row, "cwe_ids")?,
        published_date: col(row, "published_date")?,
        last_modified_date: col(row, "last_modified_date")?,
        affected_products: json_col(row, "affected_products")?,
        exploit_available: col(row, "exploit_available")?,
        exploit_maturity: col(row, "exploit_maturity")?,
        references: json_col(row, "refs")?,
        mitre_techniques: json_col(row, "mitre_techniques")?,
        actively_exploited: col(row, "actively_exploited")?,
        epss_score: col(row, "epss_score")?,
        kev_listed: col(row, "kev_listed")?,
        data_source: col(row, "data_source")?,
        last_synced: col(row, "last_synced")?,
    })
}

fn persisted(id: i64, scan_id: i64, v: &NewVulnerability) -> Vulnerability {
    Vulnerability {
        id,
        scan_id,
        vulnerability_id: v.vulnerability_id.clone(),
        cve_id: v.cve_id.clone(),
        title: v.title.clone(),
        description: v.description.clone(),
        severity: v.severity,
        cvss_score: v.cvss_score,
        cvss_vector: v.cvss_vector.clone(),
        affected_component: v.affected_component.clone(),
        affected_version: v.affected_version.clone(),
        port: v.port,
        service: v.service.clone(),
        discovered_by: v.discovered_by.clone(),
        exploit_status: v.exploit_status,
        solution: v.solution.clone(),
        references: v.references.clone(),
        tags: v.tags.clone(),
        evidence: v.evidence.clone(),
        false_positive: false,
        verified: false,
        discovered_at: v.discovered_at,
    }
}

/// Scans, vulnerabilities, tool results and CVE data in one SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> ScoutResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| ScoutError::Config(format!("Invalid database URL '{url}': {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err("Failed to open database"))?;
        info!(url, "database opened");
        Self::with_pool(pool).await
    }

    /// Private in-memory database, used by tests and one-shot CLI scans.
    pub async fn in_memory() -> ScoutResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(db_err("Invalid in-memory URL"))?
            .foreign_keys(true);
        // Each connection to :memory: is its own database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(db_err("Failed to open in-memory database"))?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> ScoutResult<Self> {
        schema::apply(&pool).await?;
        Ok(Self { pool })
    }

    #[inline]
    fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn set_flag(
        &self,
        id: i64,
        column: &'static str,
        value: bool,
    ) -> ScoutResult<Option<Vulnerability>> {
        let sql = format!("UPDATE vulnerabilities SET {column} = ? WHERE id = ?");
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(db_err("Failed to update vulnerability flag"))?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_vulnerability(id).await
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_scan(&self, scan: &NewScan) -> ScoutResult<Scan> {
        let now = Utc::now();
        let p = &scan.parameters;
        let result = sqlx::query(
            r#"
            INSERT INTO scans (
                target, scan_type, status, selected_tools, aggressiveness, port_range,
                exclude_ports, include_nse, compliance_frameworks, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&scan.target)
        .bind(p.scan_type.as_str())
        .bind(ScanStatus::Pending.as_str())
        .bind(to_json(&scan.selected_tools)?)
        .bind(p.aggressiveness.as_str())
        .bind(&p.port_range)
        .bind(&p.exclude_ports)
        .bind(p.include_nse)
        .bind(to_json(&p.compliance_frameworks)?)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(db_err("Failed to insert scan"))?;

        let id = result.last_insert_rowid();
        debug!(scan_id = id, target = %scan.target, "scan row created");
        self.get_scan(id)
            .await?
            .ok_or(ScoutError::ScanNotFound(id))
    }

    async fn get_scan(&self, id: i64) -> ScoutResult<Option<Scan>> {
        let sql = format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id = ?");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err("Failed to load scan"))?
            .map(|row| map_scan(&row))
            .transpose()
    }

    async fn list_scans(&self, filter: &ScanFilter) -> ScoutResult<Page<Scan>> {
        let status = filter.status.map(|s| s.as_str());
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM scans WHERE (? IS NULL OR status = ?)",
        )
        .bind(status)
        .bind(status)
        .fetch_one(self.pool())
        .await
        .map_err(db_err("Failed to count scans"))?;

        let sql = format!(
            "SELECT {SCAN_COLUMNS} FROM scans WHERE (? IS NULL OR status = ?) \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(status)
            .bind(status)
            .bind(filter.page.limit())
            .bind(filter.page.offset())
            .fetch_all(self.pool())
            .await
            .map_err(db_err("Failed to list scans"))?;

        Ok(Page {
            items: rows.iter().map(map_scan).collect::<ScoutResult<_>>()?,
            total,
        })
    }

    async fn recent_scans(&self, limit: i64) -> ScoutResult<Vec<Scan>> {
        let sql = format!("SELECT {SCAN_COLUMNS} FROM scans ORDER BY created_at DESC, id DESC LIMIT ?");
        sqlx::query(&sql)
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(db_err("Failed to load recent scans"))?
            .iter()
            .map(map_scan)
            .collect()
    }

    async fn delete_scan(&self, id: i64) -> ScoutResult<bool> {
        let result = sqlx::query("DELETE FROM scans WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(db_err("Failed to delete scan"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn transition_scan(
        &self,
        id: i64,
        from: ScanStatus,
        to: ScanStatus,
    ) -> ScoutResult<bool> {
        let result = sqlx::query("UPDATE scans SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(Utc::now())
            .bind(id)
            .bind(from.as_str())
            .execute(self.pool())
            .await
            .map_err(db_err("Failed to update scan status"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_scan_started(&self, id: i64, started_at: DateTime<Utc>) -> ScoutResult<()> {
        sqlx::query("UPDATE scans SET started_at = ?, updated_at = ? WHERE id = ?")
            .bind(started_at)
            .bind(started_at)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(db_err("Failed to record scan start"))?;
        Ok(())
    }

    async fn finish_scan(
        &self,
        id: i64,
        status: ScanStatus,
        completed_at: DateTime<Utc>,
    ) -> ScoutResult<()> {
        let scan = self.get_scan(id).await?.ok_or(ScoutError::ScanNotFound(id))?;
        let duration = scan
            .started_at
            .map(|start| (completed_at - start).num_milliseconds().max(0) as f64 / 1000.0);
        sqlx::query(
            r#"
            UPDATE scans
            SET status = ?, completed_at = ?, duration_seconds = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(completed_at)
        .bind(duration)
        .bind(completed_at)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(db_err("Failed to finish scan"))?;
        Ok(())
    }

    async fn update_network_summary(&self, id: i64, summary: &NetworkSummary) -> ScoutResult<()> {
        sqlx::query(
            r#"
            UPDATE scans
            SET open_ports_count = ?, services_detected = ?,
                os_fingerprint = COALESCE(?, os_fingerprint), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(summary.open_ports.len() as i64)
        .bind(summary.services.len() as i64)
        .bind(&summary.os_fingerprint)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(db_err("Failed to update network summary"))?;
        Ok(())
    }

    async fn recompute_counts(&self, id: i64) -> ScoutResult<SeverityCounts> {
        let counts = self.severity_totals(Some(id)).await?;
        sqlx::query(
            r#"
            UPDATE scans
            SET total_vulnerabilities = ?, critical_count = ?, high_count = ?,
                medium_count = ?, low_count = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(counts.total)
        .bind(counts.critical)
        .bind(counts.high)
        .bind(counts.medium)
        .bind(counts.low)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(db_err("Failed to store severity counts"))?;
        Ok(counts)
    }

    async fn create_tool_result(
        &self,
        scan_id: i64,
        tool: &str,
        started_at: DateTime<Utc>,
    ) -> ScoutResult<ToolResult> {
        let result = sqlx::query(
            "INSERT INTO scan_results (scan_id, tool_name, status, started_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(scan_id)
        .bind(tool)
        .bind(ToolStatus::Running.as_str())
        .bind(started_at)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(db_err("Failed to insert tool result"))?;

        let id = result.last_insert_rowid();
        let sql = format!("SELECT {RESULT_COLUMNS} FROM scan_results WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(db_err("Failed to load tool result"))?;
        map_tool_result(&row)
    }

    async fn finish_tool_result(&self, id: i64, c: &ToolCompletion) -> ScoutResult<()> {
        let parsed = c.parsed_output.as_ref().map(to_json).transpose()?;
        sqlx::query(
            r#"
            UPDATE scan_results
            SET status = ?, completed_at = ?, duration_seconds = ?, tool_version = ?, mode = ?,
                partial = ?, command = ?, raw_output = ?, parsed_output = ?, error_message = ?,
                exit_code = ?, vulnerabilities_found = ?, ports_scanned = ?, hosts_scanned = ?
            WHERE id = ?
            "#,
        )
        .bind(c.status.as_str())
        .bind(c.completed_at)
        .bind(c.duration_seconds)
        .bind(&c.tool_version)
        .bind(c.mode.map(|m| m.as_str()))
        .bind(c.partial)
        .bind(&c.command)
        .bind(&c.raw_output)
        .bind(parsed)
        .bind(&c.error_message)
        .bind(c.exit_code)
        .bind(c.vulnerabilities_found)
        .bind(c.ports_scanned)
        .bind(c.hosts_scanned)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(db_err("Failed to finish tool result"))?;
        Ok(())
    }

    async fn list_tool_results(&self, scan_id: i64) -> ScoutResult<Vec<ToolResult>> {
        let sql = format!("SELECT {RESULT_COLUMNS} FROM scan_results WHERE scan_id = ? ORDER BY id");
        sqlx::query(&sql)
            .bind(scan_id)
            .fetch_all(self.pool())
            .await
            .map_err(db_err("Failed to list tool results"))?
            .iter()
            .map(map_tool_result)
            .collect()
    }

    async fn insert_vulnerabilities(
        &self,
        scan_id: i64,
        vulnerabilities: &[NewVulnerability],
    ) -> ScoutResult<Vec<Vulnerability>> {
        if vulnerabilities.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        let mut stored = Vec::with_capacity(vulnerabilities.len());
        for v in vulnerabilities {
            let result = sqlx::query(
                r#"
                INSERT INTO vulnerabilities (
                    scan_id, vulnerability_id, cve_id, title, description, severity, cvss_score,
                    cvss_vector, affected_component, affected_version, port, service,
                    discovered_by, exploit_status, solution, refs, tags, evidence, discovered_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(scan_id)
            .bind(&v.vulnerability_id)
            .bind(&v.cve_id)
            .bind(&v.title)
            .bind(&v.description)
            .bind(v.severity.as_str())
            .bind(v.cvss_score)
            .bind(&v.cvss_vector)
            .bind(&v.affected_component)
            .bind(&v.affected_version)
            .bind(v.port.map(i64::from))
            .bind(&v.service)
            .bind(&v.discovered_by)
            .bind(v.exploit_status.as_str())
            .bind(&v.solution)
            .bind(to_json(&v.references)?)
            .bind(to_json(&v.tags)?)
            .bind(&v.evidence)
            .bind(v.discovered_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to insert vulnerability"))?;
            stored.push(persisted(result.last_insert_rowid(), scan_id, v));
        }

        tx.commit()
            .await
            .map_err(db_err("Failed to commit vulnerabilities"))?;
        Ok(stored)
    }

    async fn list_vulnerabilities(
        &self,
        filter: &VulnerabilityFilter,
    ) -> ScoutResult<Page<Vulnerability>> {
        const WHERE: &str = r#"
            WHERE (? IS NULL OR severity = ?)
              AND (? IS NULL OR scan_id = ?)
              AND (? IS NULL OR cve_id LIKE '%' || ? || '%')
              AND (? IS NULL OR title LIKE '%' || ? || '%')
        "#;
        let severity = filter.severity.map(|s| s.as_str());
        let cve = filter.cve_id.as_deref();
        let title = filter.title.as_deref();

        let count_sql = format!("SELECT COUNT(*) FROM vulnerabilities {WHERE}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(severity)
            .bind(severity)
            .bind(filter.scan_id)
            .bind(filter.scan_id)
            .bind(cve)
            .bind(cve)
            .bind(title)
            .bind(title)
            .fetch_one(self.pool())
            .await
            .map_err(db_err("Failed to count vulnerabilities"))?;

        let sql = format!(
            "SELECT {VULN_COLUMNS} FROM vulnerabilities {WHERE} \
             ORDER BY discovered_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(severity)
            .bind(severity)
            .bind(filter.scan_id)
            .bind(filter.scan_id)
            .bind(cve)
            .bind(cve)
            .bind(title)
            .bind(title)
            .bind(filter.page.limit())
            .bind(filter.page.offset())
            .fetch_all(self.pool())
            .await
            .map_err(db_err("Failed to list vulnerabilities"))?;

        Ok(Page {
            items: rows.iter().map(map_vulnerability).collect::<ScoutResult<_>>()?,
            total,
        })
    }

    async fn scan_vulnerabilities(&self, scan_id: i64) -> ScoutResult<Vec<Vulnerability>> {
        let sql = format!("SELECT {VULN_COLUMNS} FROM vulnerabilities WHERE scan_id = ? ORDER BY id");
        sqlx::query(&sql)
            .bind(scan_id)
            .fetch_all(self.pool())
            .await
            .map_err(db_err("Failed to load scan vulnerabilities"))?
            .iter()
            .map(map_vulnerability)
            .collect()
    }

    async fn get_vulnerability(&self, id: i64) -> ScoutResult<Option<Vulnerability>> {
        let sql = format!("SELECT {VULN_COLUMNS} FROM vulnerabilities WHERE id = ?");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err("Failed to load vulnerability"))?
            .map(|row| map_vulnerability(&row))
            .transpose()
    }

    async fn set_false_positive(
        &self,
        id: i64,
        value: bool,
    ) -> ScoutResult<Option<Vulnerability>> {
        self.set_flag(id, "false_positive", value).await
    }

    async fn set_verified(&self, id: i64, value: bool) -> ScoutResult<Option<Vulnerability>> {
        self.set_flag(id, "verified", value).await
    }

    async fn severity_totals(&self, scan_id: Option<i64>) -> ScoutResult<SeverityCounts> {
        let rows = sqlx::query(
            r#"
            SELECT severity, COUNT(*) AS n
            FROM vulnerabilities
            WHERE (? IS NULL OR scan_id = ?)
            GROUP BY severity
            "#,
        )
        .bind(scan_id)
        .bind(scan_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err("Failed to count severities"))?;

        let mut counts = SeverityCounts::default();
        for row in &rows {
            let severity: Severity = enum_col(row, "severity")?;
            counts.add(severity, col(row, "n")?);
        }
        Ok(counts)
    }

    async fn scan_status_totals(&self) -> ScoutResult<ScanStatusCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM scans GROUP BY status")
            .fetch_all(self.pool())
            .await
            .map_err(db_err("Failed to count scans by status"))?;

        let mut counts = ScanStatusCounts::default();
        for row in &rows {
            let status: ScanStatus = enum_col(row, "status")?;
            let n: i64 = col(row, "n")?;
            match status {
                ScanStatus::Pending => counts.pending += n,
                ScanStatus::Running => counts.running += n,
                ScanStatus::Completed => counts.completed += n,
                ScanStatus::Failed => counts.failed += n,
                ScanStatus::Cancelled => counts.cancelled += n,
            }
            counts.total += n;
        }
        Ok(counts)
    }

    async fn upsert_cve(&self, r: &CveRecord) -> ScoutResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cve_data (
                cve_id, title, description, cvss_v3_score, cvss_v3_vector, cvss_v2_score,
                cvss_v2_vector, severity, cwe_ids, published_date, last_modified_date,
                affected_products, exploit_available, exploit_maturity, refs, mitre_techniques,
                actively_exploited, epss_score, kev_listed, data_source, last_synced
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(cve_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                cvss_v3_score = excluded.cvss_v3_score,
                cvss_v3_vector = excluded.cvss_v3_vector,
                cvss_v2_score = excluded.cvss_v2_score,
                cvss_v2_vector = excluded.cvss_v2_vector,
                severity = excluded.severity,
                cwe_ids = excluded.cwe_ids,
                published_date = excluded.published_date,
                last_modified_date = excluded.last_modified_date,
                affected_products = excluded.affected_products,
                exploit_available = excluded.exploit_available,
                exploit_maturity = excluded.exploit_maturity,
                refs = excluded.refs,
                mitre_techniques = excluded.mitre_techniques,
                actively_exploited = excluded.actively_exploited,
                epss_score = excluded.epss_score,
                kev_listed = excluded.kev_listed,
                data_source = excluded.data_source,
                last_synced = excluded.last_synced
            "#,
        )
        .bind(&r.cve_id)
        .bind(&r.title)
        .bind(&r.description)
        .bind(r.cvss_v3_score)
        .bind(&r.cvss_v3_vector)
        .bind(r.cvss_v2_score)
        .bind(&r.cvss_v2_vector)
        .bind(r.severity.map(|s| s.as_str()))
        .bind(to_json(&r.cwe_ids)?)
        .bind(r.published_date)
        .bind(r.last_modified_date)
        .bind(to_json(&r.affected_products)?)
        .bind(r.exploit_available)
        .bind(&r.exploit_maturity)
        .bind(to_json(&r.references)?)
        .bind(to_json(&r.mitre_techniques)?)
        .bind(r.actively_exploited)
        .bind(r.epss_score)
        .bind(r.kev_listed)
        .bind(&r.data_source)
        .bind(r.last_synced.unwrap_or_else(Utc::now))
        .execute(self.pool())
        .await
        .map_err(db_err("Failed to upsert CVE"))?;
        Ok(())
    }

    async fn get_cve(&self, cve_id: &str) -> ScoutResult<Option<CveRecord>> {
        sqlx::query("SELECT * FROM cve_data WHERE cve_id = ? COLLATE NOCASE")
            .bind(cve_id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err("Failed to load CVE"))?
            .map(|row| map_cve(&row))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchscout_common::{ExploitStatus, OutcomeMode, PageRequest};

    fn vuln(title: &str, severity: Severity) -> NewVulnerability {
        NewVulnerability {
            vulnerability_id: format!("test-{title}"),
            cve_id: None,
            title: title.to_string(),
            description: None,
            severity,
            cvss_score: Some(5.0),
            cvss_vector: None,
            affected_component: None,
            affected_version: None,
            port: Some(443),
            service: Some("https".into()),
            discovered_by: "Nessus".into(),
            exploit_status: ExploitStatus::Manual,
            solution: None,
            references: vec!["https://example.com/advisory".into()],
            tags: vec!["tls".into()],
            evidence: None,
            discovered_at: Utc::now(),
        }
    }

    async fn store() -> SqliteStorage {
        SqliteStorage::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn create_and_get_scan() {
        let db = store().await;
        let scan = db
            .create_scan(&NewScan::new("example.com").with_tools(["OpenVAS"]))
            .await
            .unwrap();
        assert_eq!(scan.status, ScanStatus::Pending);
        assert_eq!(scan.selected_tools, vec!["OpenVAS".to_string()]);
        assert_eq!(scan.parameters.port_range, "1-65535");

        let loaded = db.get_scan(scan.id).await.unwrap().unwrap();
        assert_eq!(loaded.target, "example.com");
        assert!(db.get_scan(scan.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let db = store().await;
        let scan = db.create_scan(&NewScan::new("10.0.0.1")).await.unwrap();

        assert!(!db
            .transition_scan(scan.id, ScanStatus::Running, ScanStatus::Cancelled)
            .await
            .unwrap());
        assert!(db
            .transition_scan(scan.id, ScanStatus::Pending, ScanStatus::Running)
            .await
            .unwrap());
        let loaded = db.get_scan(scan.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ScanStatus::Running);
    }

    #[tokio::test]
    async fn recompute_counts_matches_rows() {
        let db = store().await;
        let scan = db.create_scan(&NewScan::new("10.0.0.1")).await.unwrap();
        db.insert_vulnerabilities(
            scan.id,
            &[
                vuln("a", Severity::High),
                vuln("b", Severity::High),
                vuln("c", Severity::Low),
                vuln("d", Severity::Info),
            ],
        )
        .await
        .unwrap();

        let counts = db.recompute_counts(scan.id).await.unwrap();
        assert_eq!(counts.high, 2);
        assert_eq!(counts.total, 4);

        let loaded = db.get_scan(scan.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_vulnerabilities, 4);
        assert_eq!(loaded.high_count, 2);
        assert_eq!(loaded.low_count, 1);
        assert_eq!(loaded.counts().info, 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_children() {
        let db = store().await;
        let scan = db.create_scan(&NewScan::new("10.0.0.1")).await.unwrap();
        db.insert_vulnerabilities(scan.id, &[vuln("a", Severity::Medium)])
            .await
            .unwrap();
        db.create_tool_result(scan.id, "Nmap", Utc::now()).await.unwrap();

        assert!(db.delete_scan(scan.id).await.unwrap());
        assert!(db.scan_vulnerabilities(scan.id).await.unwrap().is_empty());
        assert!(db.list_tool_results(scan.id).await.unwrap().is_empty());
        assert_eq!(db.severity_totals(None).await.unwrap().total, 0);
        assert!(!db.delete_scan(scan.id).await.unwrap());
    }

    #[tokio::test]
    async fn tool_result_lifecycle() {
        let db = store().await;
        let scan = db.create_scan(&NewScan::new("10.0.0.1")).await.unwrap();
        let started = Utc::now();
        let row = db.create_tool_result(scan.id, "OpenVAS", started).await.unwrap();
        assert_eq!(row.status, ToolStatus::Running);

        let outcome = patchscout_common::ScanOutcome::new(
            patchscout_common::ToolKind::OpenVas,
            OutcomeMode::Mock,
        );
        db.finish_tool_result(row.id, &ToolCompletion::from_outcome(&outcome, 0, started))
            .await
            .unwrap();
        let rows = db.list_tool_results(scan.id).await.unwrap();
        assert_eq!(rows[0].status, ToolStatus::Complete);
        assert_eq!(rows[0].mode, Some(OutcomeMode::Mock));
        assert!(rows[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn flags_and_filters() {
        let db = store().await;
        let scan = db.create_scan(&NewScan::new("10.0.0.1")).await.unwrap();
        let mut with_cve = vuln("SQL Injection", Severity::Critical);
        with_cve.cve_id = Some("CVE-2024-3456".into());
        let stored = db
            .insert_vulnerabilities(scan.id, &[with_cve, vuln("Banner", Severity::Info)])
            .await
            .unwrap();

        let flagged = db.set_false_positive(stored[0].id, true).await.unwrap().unwrap();
        assert!(flagged.false_positive);
        assert!(!flagged.verified);
        assert!(db.set_verified(9999, true).await.unwrap().is_none());

        let page = db
            .list_vulnerabilities(&VulnerabilityFilter {
                cve_id: Some("2024".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].references, vec!["https://example.com/advisory".to_string()]);

        let page = db
            .list_vulnerabilities(&VulnerabilityFilter {
                severity: Some(Severity::Info),
                page: PageRequest::new(Some(1), Some(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "Banner");
    }

    #[tokio::test]
    async fn scan_listing_filters_by_status() {
        let db = store().await;
        let a = db.create_scan(&NewScan::new("a.example")).await.unwrap();
        db.create_scan(&NewScan::new("b.example")).await.unwrap();
        db.transition_scan(a.id, ScanStatus::Pending, ScanStatus::Running)
            .await
            .unwrap();

        let running = db
            .list_scans(&ScanFilter {
                status: Some(ScanStatus::Running),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(running.total, 1);
        assert_eq!(running.items[0].id, a.id);

        let totals = db.scan_status_totals().await.unwrap();
        assert_eq!(totals.total, 2);
        assert_eq!(totals.pending, 1);
        assert_eq!(totals.running, 1);
    }

    #[tokio::test]
    async fn cve_upsert_replaces_existing() {
        let db = store().await;
        let mut record = CveRecord {
            cve_id: "CVE-2021-44228".into(),
            title: Some("Log4Shell".into()),
            cvss_v3_score: Some(10.0),
            severity: Some(Severity::Critical),
            kev_listed: true,
            ..Default::default()
        };
        db.upsert_cve(&record).await.unwrap();
        record.epss_score = Some(0.97);
        db.upsert_cve(&record).await.unwrap();

        let loaded = db.get_cve("cve-2021-44228").await.unwrap().unwrap();
        assert_eq!(loaded.epss_score, Some(0.97));
        assert!(loaded.kev_listed);
        assert_eq!(loaded.severity, Some(Severity::Critical));
        assert!(db.get_cve("CVE-1999-0001").await.unwrap().is_none());
    }
}
