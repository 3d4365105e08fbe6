//! Recurring vulnerability scans
//!
//! [`Scheduler`] keeps named jobs (daily, weekly, monthly or fixed interval)
//! and launches a scan through a [`patchscout_common::ScanLauncher`] each
//! time one fires.

pub mod schedule;
pub mod service;

pub use schedule::Schedule;
pub use service::{daily_request, weekly_request, JobInfo, Scheduler, SchedulerConfig};
