//! Recurring scan jobs
//!
//! Each job owns a tokio task that sleeps until the next fire time and then
//! hands a copy of its scan request to the [`ScanLauncher`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc, Weekday};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use patchscout_common::{
    Aggressiveness, CancellationToken, NewScan, ScanLauncher, ScanParameters, ScanType,
    ScoutError, ScoutResult, ToolKind,
};

use crate::schedule::Schedule;

/// Listing entry for one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub target: String,
    pub next_run: Option<DateTime<Utc>>,
    pub trigger: String,
    pub paused: bool,
}

struct JobState {
    paused: AtomicBool,
    next_run: Mutex<Option<DateTime<Utc>>>,
}

struct Job {
    name: String,
    schedule: Schedule,
    request: NewScan,
    state: Arc<JobState>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Job {
    fn stop(&self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Environment-driven default jobs.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    pub daily_targets: Vec<String>,
    pub weekly_targets: Vec<String>,
}

impl SchedulerConfig {
    /// Splits a comma separated target list, dropping blanks.
    pub fn parse_targets(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Daily quick scan: Nmap only, top ports, no NSE scripts.
pub fn daily_request(target: &str) -> NewScan {
    let parameters = ScanParameters {
        include_nse: false,
        ..ScanParameters::default()
            .with_scan_type(ScanType::Quick)
            .with_aggressiveness(Aggressiveness::Low)
            .with_port_range("1-1000")
    };
    NewScan::new(target)
        .with_tools([ToolKind::Nmap.as_str()])
        .with_parameters(parameters)
}

/// Weekly comprehensive scan with compliance mapping.
pub fn weekly_request(target: &str) -> NewScan {
    let parameters = ScanParameters {
        include_nse: true,
        compliance_frameworks: vec!["PCI DSS".to_string(), "NIST".to_string()],
        ..ScanParameters::default()
            .with_scan_type(ScanType::Comprehensive)
            .with_aggressiveness(Aggressiveness::Medium)
            .with_port_range("1-65535")
    };
    NewScan::new(target)
        .with_tools([ToolKind::Nmap.as_str(), ToolKind::OpenVas.as_str()])
        .with_parameters(parameters)
}

pub struct Scheduler {
    launcher: Arc<dyn ScanLauncher>,
    jobs: Mutex<HashMap<String, Job>>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(launcher: Arc<dyn ScanLauncher>) -> Self {
        Self {
            launcher,
            jobs: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Registers `request` to run on `schedule` and returns the job id.
    ///
    /// The id is `<kind>_<name>`; an existing job with the same id is
    /// stopped and replaced.
    pub async fn add(
        &self,
        name: &str,
        request: NewScan,
        schedule: Schedule,
    ) -> ScoutResult<String> {
        schedule.validate()?;
        if name.trim().is_empty() {
            return Err(ScoutError::InvalidInput("job name is required".into()));
        }

        let id = format!("{}_{}", schedule.kind(), name);
        let state = Arc::new(JobState {
            paused: AtomicBool::new(false),
            next_run: Mutex::new(schedule.next_after(Utc::now())),
        });
        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(run_job(
            id.clone(),
            schedule,
            request.clone(),
            Arc::clone(&self.launcher),
            Arc::clone(&state),
            cancel.clone(),
        ));

        let job = Job {
            name: name.to_string(),
            schedule,
            request,
            state,
            cancel,
            handle,
        };

        let mut jobs = self.jobs.lock().await;
        if let Some(previous) = jobs.insert(id.clone(), job) {
            previous.stop();
            debug!(job = %id, "replaced scheduled scan");
        }
        info!(job = %id, trigger = %schedule, "scheduled scan added");
        Ok(id)
    }

    pub async fn add_daily(
        &self,
        name: &str,
        request: NewScan,
        hour: u32,
        minute: u32,
    ) -> ScoutResult<String> {
        self.add(name, request, Schedule::Daily { hour, minute }).await
    }

    pub async fn add_weekly(
        &self,
        name: &str,
        request: NewScan,
        weekday: Weekday,
        hour: u32,
        minute: u32,
    ) -> ScoutResult<String> {
        self.add(name, request, Schedule::Weekly { weekday, hour, minute })
            .await
    }

    pub async fn add_monthly(
        &self,
        name: &str,
        request: NewScan,
        day: u32,
        hour: u32,
        minute: u32,
    ) -> ScoutResult<String> {
        self.add(name, request, Schedule::Monthly { day, hour, minute })
            .await
    }

    pub async fn add_interval(
        &self,
        name: &str,
        request: NewScan,
        hours: u64,
        minutes: u64,
    ) -> ScoutResult<String> {
        self.add(name, request, Schedule::every(hours, minutes)).await
    }

    pub async fn remove(&self, id: &str) -> ScoutResult<()> {
        let job = self
            .jobs
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| job_not_found(id))?;
        job.stop();
        info!(job = %id, "scheduled scan removed");
        Ok(())
    }

    pub async fn pause(&self, id: &str) -> ScoutResult<()> {
        self.set_paused(id, true).await
    }

    pub async fn resume(&self, id: &str) -> ScoutResult<()> {
        self.set_paused(id, false).await
    }

    async fn set_paused(&self, id: &str, paused: bool) -> ScoutResult<()> {
        let jobs = self.jobs.lock().await;
        let job = jobs.get(id).ok_or_else(|| job_not_found(id))?;
        job.state.paused.store(paused, Ordering::SeqCst);
        info!(job = %id, paused, "scheduled scan updated");
        Ok(())
    }

    /// All jobs, ordered by id.
    pub async fn list(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.lock().await;
        let mut out = Vec::with_capacity(jobs.len());
        for (id, job) in jobs.iter() {
            let paused = job.state.paused.load(Ordering::SeqCst);
            out.push(JobInfo {
                id: id.clone(),
                name: format!("{} Scan: {}", title_case(job.schedule.kind()), job.name),
                target: job.request.target.clone(),
                next_run: if paused {
                    None
                } else {
                    *job.state.next_run.lock().await
                },
                trigger: job.schedule.to_string(),
                paused,
            });
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Installs the daily and weekly jobs named by `config`.
    pub async fn load(&self, config: &SchedulerConfig) -> ScoutResult<usize> {
        let mut added = 0;
        for target in &config.daily_targets {
            self.add_daily(target, daily_request(target), 2, 0).await?;
            added += 1;
        }
        for target in &config.weekly_targets {
            self.add_weekly(target, weekly_request(target), Weekday::Sun, 1, 0)
                .await?;
            added += 1;
        }
        if added > 0 {
            info!(jobs = added, "loaded scheduled scans from configuration");
        }
        Ok(added)
    }

    /// Stops every job. Scans already launched keep running.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut jobs = self.jobs.lock().await;
        for (_, job) in jobs.drain() {
            job.stop();
        }
    }
}

fn job_not_found(id: &str) -> ScoutError {
    ScoutError::InvalidInput(format!("Scheduled scan '{id}' not found"))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

async fn run_job(
    id: String,
    schedule: Schedule,
    request: NewScan,
    launcher: Arc<dyn ScanLauncher>,
    state: Arc<JobState>,
    cancel: CancellationToken,
) {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            warn!(job = %id, "schedule has no further fire times");
            break;
        };
        *state.next_run.lock().await = Some(next);
        let wait = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        if state.paused.load(Ordering::SeqCst) {
            debug!(job = %id, "scheduled scan paused, skipping");
            continue;
        }

        match launcher.launch(request.clone()).await {
            Ok(scan) => info!(job = %id, scan_id = scan.id, target = %scan.target, "scheduled scan launched"),
            Err(e) => error!(job = %id, error = %e, "scheduled scan failed to launch"),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use patchscout_common::{Scan, ScanStatus};

    #[derive(Default)]
    struct RecordingLauncher {
        launched: std::sync::Mutex<Vec<NewScan>>,
    }

    impl RecordingLauncher {
        fn count(&self) -> usize {
            self.launched.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ScanLauncher for RecordingLauncher {
        async fn launch(&self, request: NewScan) -> ScoutResult<Scan> {
            let mut launched = self.launched.lock().unwrap();
            launched.push(request.clone());
            let now = Utc::now();
            Ok(Scan {
                id: launched.len() as i64,
                target: request.target,
                status: ScanStatus::Pending,
                selected_tools: request.selected_tools,
                parameters: request.parameters,
                total_vulnerabilities: 0,
                critical_count: 0,
                high_count: 0,
                medium_count: 0,
                low_count: 0,
                open_ports_count: 0,
                services_detected: 0,
                os_fingerprint: None,
                started_at: None,
                completed_at: None,
                duration_seconds: None,
                created_at: now,
                updated_at: now,
            })
        }
    }

    fn scheduler() -> (Scheduler, Arc<RecordingLauncher>) {
        let launcher = Arc::new(RecordingLauncher::default());
        (Scheduler::new(launcher.clone()), launcher)
    }

    #[tokio::test]
    async fn job_ids_follow_kind() {
        let (scheduler, _) = scheduler();
        let daily = scheduler
            .add_daily("web", NewScan::new("example.com"), 2, 0)
            .await
            .unwrap();
        let monthly = scheduler
            .add_monthly("db", NewScan::new("10.0.0.5"), 1, 3, 30)
            .await
            .unwrap();
        assert_eq!(daily, "daily_web");
        assert_eq!(monthly, "monthly_db");

        let jobs = scheduler.list().await;
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, "daily_web");
        assert_eq!(jobs[0].name, "Daily Scan: web");
        assert_eq!(jobs[0].trigger, "daily at 02:00 UTC");
        assert!(jobs[0].next_run.is_some());
        assert_eq!(jobs[1].target, "10.0.0.5");
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn adding_same_id_replaces() {
        let (scheduler, _) = scheduler();
        scheduler
            .add_daily("web", NewScan::new("a.example.com"), 2, 0)
            .await
            .unwrap();
        scheduler
            .add_daily("web", NewScan::new("b.example.com"), 4, 0)
            .await
            .unwrap();
        let jobs = scheduler.list().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].target, "b.example.com");
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn rejects_invalid_schedules() {
        let (scheduler, _) = scheduler();
        assert!(scheduler
            .add_interval("x", NewScan::new("example.com"), 0, 0)
            .await
            .is_err());
        assert!(scheduler
            .add_daily("x", NewScan::new("example.com"), 25, 0)
            .await
            .is_err());
        assert!(scheduler.list().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_job_operations_fail() {
        let (scheduler, _) = scheduler();
        assert!(scheduler.remove("daily_missing").await.is_err());
        assert!(scheduler.pause("daily_missing").await.is_err());
        assert!(scheduler.resume("daily_missing").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_job_launches_scans() {
        let (scheduler, launcher) = scheduler();
        scheduler
            .add_interval("probe", NewScan::new("example.com"), 0, 1)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(launcher.count(), 2);
        assert_eq!(
            launcher.launched.lock().unwrap()[0].target,
            "example.com"
        );
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn paused_job_skips_fires() {
        let (scheduler, launcher) = scheduler();
        let id = scheduler
            .add_interval("probe", NewScan::new("example.com"), 0, 1)
            .await
            .unwrap();
        scheduler.pause(&id).await.unwrap();
        assert!(scheduler.list().await[0].paused);

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(launcher.count(), 0);

        scheduler.resume(&id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(launcher.count(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn removed_job_stops() {
        let (scheduler, launcher) = scheduler();
        let id = scheduler
            .add_interval("probe", NewScan::new("example.com"), 0, 1)
            .await
            .unwrap();
        scheduler.remove(&id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(launcher.count(), 0);
        assert!(scheduler.list().await.is_empty());
    }

    #[tokio::test]
    async fn loads_configured_targets() {
        let (scheduler, _) = scheduler();
        let config = SchedulerConfig {
            daily_targets: SchedulerConfig::parse_targets("a.example.com, ,b.example.com"),
            weekly_targets: vec!["10.0.0.0/24".into()],
        };
        assert_eq!(scheduler.load(&config).await.unwrap(), 3);

        let ids: Vec<_> = scheduler.list().await.into_iter().map(|j| j.id).collect();
        assert_eq!(
            ids,
            ["daily_a.example.com", "daily_b.example.com", "weekly_10.0.0.0/24"]
        );
        scheduler.shutdown().await;
    }

    #[test]
    fn default_requests() {
        let daily = daily_request("example.com");
        assert_eq!(daily.selected_tools, ["Nmap"]);
        assert_eq!(daily.parameters.scan_type, ScanType::Quick);
        assert_eq!(daily.parameters.port_range, "1-1000");
        assert!(!daily.parameters.include_nse);

        let weekly = weekly_request("example.com");
        assert_eq!(weekly.selected_tools, ["Nmap", "OpenVAS"]);
        assert_eq!(weekly.parameters.compliance_frameworks, ["PCI DSS", "NIST"]);
    }
}
