//! PatchScout Analysis - reports, attack paths and the security assistant
//!
//! Everything here is derived from records already in storage:
//! - Scan reports (JSON, executive summary, CSV) and dashboard totals
//! - Attack-path heuristics and the attacker/target graph
//! - The keyword-driven chat assistant
//! - Port-based service identification

pub mod attack_paths;
pub mod chat;
pub mod reports;
pub mod services;

pub use attack_paths::{attack_graph, attack_paths, AttackGraph, AttackPathReport};
pub use chat::{classify, respond, ChatHistory, ChatRequest, ChatResponse, ChatSource, Topic};
pub use reports::{
    csv_filename, csv_report, dashboard_stats, json_report, summary_report,
    vulnerability_summary, DashboardStats, JsonReport, RiskLevel, SummaryReport,
    VulnerabilitySummary,
};
pub use services::{classify as classify_service, effective_service, service_for_port, ServiceClass};
