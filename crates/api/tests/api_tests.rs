// ---------------------------------------------------------------------------
// Integration tests for the REST API
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use patchscout_adapters::AdapterConfig;
use patchscout_api::state::AppState;
use patchscout_common::{EventSink, ScanStatus};
use patchscout_notify::EventHub;
use patchscout_orchestrator::{
    Notifier, Orchestrator, OrchestratorConfig, RateLimiter, RunnerConfig, ScanRunner,
};
use patchscout_scheduler::{daily_request, Scheduler};
use patchscout_storage::SqliteStorage;

async fn base_state(per_minute: u32, burst: u32) -> AppState {
    let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
    let hub = EventHub::default();
    let sink: Arc<dyn EventSink> = Arc::new(Notifier::new().with_sink(Arc::new(hub.clone())));
    let orchestrator = Orchestrator::new(storage.clone(), sink.clone(), OrchestratorConfig::default())
        .with_adapters(AdapterConfig::all_mock().build().unwrap());
    let runner = ScanRunner::new(
        storage.clone(),
        Arc::new(orchestrator),
        sink,
        RunnerConfig::default(),
    );
    AppState::new(
        storage,
        runner,
        hub,
        RateLimiter::new(per_minute, burst).unwrap(),
    )
}

async fn test_state_with_limit(per_minute: u32, burst: u32) -> Arc<AppState> {
    Arc::new(base_state(per_minute, burst).await)
}

async fn test_state() -> Arc<AppState> {
    test_state_with_limit(60, 10).await
}

async fn parse_json(body: Body) -> serde_json::Value {
    let bytes = axum::body::to_bytes(body, 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn app(state: &Arc<AppState>) -> Router {
    patchscout_api::build_router(state.clone())
}

/// Create a scan through the API and wait for it to finish.
async fn completed_scan(state: &Arc<AppState>, body: serde_json::Value) -> i64 {
    let resp = app(state)
        .oneshot(json_request("POST", "/api/scans", body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let id = parse_json(resp.into_body()).await["id"].as_i64().unwrap();
    let scan = state.runner.wait(id).await.unwrap();
    assert_eq!(scan.status, ScanStatus::Completed);
    id
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_check_returns_healthy() {
    let state = test_state().await;
    let resp = app(&state).oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["app_name"], "PatchScout");
    assert_eq!(json["active_scans"], 0);
}

#[tokio::test]
async fn test_root_lists_tools() {
    let state = test_state().await;
    let resp = app(&state).oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = parse_json(resp.into_body()).await;
    assert_eq!(
        json["scanning_tools"],
        serde_json::json!(["Nmap", "OpenVAS", "Nessus", "Nikto", "Nuclei"])
    );
}

// ---------------------------------------------------------------------------
// Scans
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_list_scans_empty() {
    let state = test_state().await;
    let resp = app(&state).oneshot(get("/api/scans")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["total"], 0);
    assert_eq!(json["page"], 1);
    assert_eq!(json["page_size"], 20);
    assert!(json["scans"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_scans_clamps_page_size() {
    let state = test_state().await;
    let resp = app(&state)
        .oneshot(get("/api/scans?page=0&page_size=500"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["page"], 1);
    assert_eq!(json["page_size"], 100);
}

#[tokio::test]
async fn test_list_scans_rejects_unknown_status() {
    let state = test_state().await;
    let resp = app(&state)
        .oneshot(get("/api/scans?status=exploded"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_scan_not_found_404() {
    let state = test_state().await;
    let resp = app(&state).oneshot(get("/api/scans/42")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["error"], "not_found");
    assert_eq!(json["message"], "Scan 42 not found");
}

#[tokio::test]
async fn test_create_scan_invalid_target_422() {
    let state = test_state().await;
    let resp = app(&state)
        .oneshot(json_request(
            "POST",
            "/api/scans",
            serde_json::json!({ "target": "not a target" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_create_scan_invalid_port_range_422() {
    let state = test_state().await;
    let resp = app(&state)
        .oneshot(json_request(
            "POST",
            "/api/scans",
            serde_json::json!({
                "target": "example.com",
                "scan_config": { "port_range": "100-10" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_scan_unknown_scan_type_422() {
    let state = test_state().await;
    let resp = app(&state)
        .oneshot(json_request(
            "POST",
            "/api/scans",
            serde_json::json!({
                "target": "example.com",
                "scan_config": { "scan_type": "thorough" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_create_scan_runs_to_completion() {
    let state = test_state().await;
    let resp = app(&state)
        .oneshot(json_request(
            "POST",
            "/api/scans",
            serde_json::json!({
                "target": "example.com",
                "scan_config": { "selected_tools": ["OpenVAS"], "scan_type": "quick" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = parse_json(resp.into_body()).await;
    assert_eq!(created["target"], "example.com");
    assert_eq!(created["scan_type"], "quick");
    let id = created["id"].as_i64().unwrap();

    state.runner.wait(id).await.unwrap();

    let resp = app(&state)
        .oneshot(get(&format!("/api/scans/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["progress"], 100);
    assert_eq!(json["summary"]["total_vulnerabilities"], 1);
    assert_eq!(json["summary"]["high"], 1);

    let resp = app(&state)
        .oneshot(get(&format!("/api/scans/{id}/results")))
        .await
        .unwrap();
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["results"][0]["tool_name"], "OpenVAS");
    assert_eq!(json["results"][0]["status"], "complete");
}

#[tokio::test]
async fn test_create_scan_rate_limited_429() {
    let state = test_state_with_limit(1, 1).await;
    let body = serde_json::json!({
        "target": "10.0.0.5",
        "scan_config": { "selected_tools": ["Nuclei"] }
    });

    let first = app(&state)
        .oneshot(json_request("POST", "/api/scans", body.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app(&state)
        .oneshot(json_request("POST", "/api/scans", body))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = parse_json(second.into_body()).await;
    assert_eq!(json["error"], "rate_limited");
}

#[tokio::test]
async fn test_cancel_finished_scan_400() {
    let state = test_state().await;
    let id = completed_scan(
        &state,
        serde_json::json!({ "target": "example.com", "scan_config": { "selected_tools": ["Nikto"] } }),
    )
    .await;

    let resp = app(&state)
        .oneshot(empty_request("POST", &format!("/api/scans/{id}/cancel")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["message"], "Scan is not running");
}

#[tokio::test]
async fn test_delete_scan() {
    let state = test_state().await;
    let id = completed_scan(&state, serde_json::json!({ "target": "example.com" })).await;

    let resp = app(&state)
        .oneshot(empty_request("DELETE", &format!("/api/scans/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app(&state)
        .oneshot(get(&format!("/api/scans/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app(&state)
        .oneshot(empty_request("DELETE", &format!("/api/scans/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Vulnerabilities
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_vulnerability_listing_and_triage() {
    let state = test_state().await;
    let id = completed_scan(&state, serde_json::json!({ "target": "example.com" })).await;

    let resp = app(&state)
        .oneshot(get(&format!("/api/scans/{id}/vulnerabilities")))
        .await
        .unwrap();
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["total"], 5);

    let resp = app(&state)
        .oneshot(get("/api/vulnerabilities?severity=high"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["total"], 2);

    let resp = app(&state)
        .oneshot(get("/api/vulnerabilities?cve_id=2018"))
        .await
        .unwrap();
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["total"], 1);
    let vuln_id = json["vulnerabilities"][0]["id"].as_i64().unwrap();
    assert_eq!(json["vulnerabilities"][0]["cve_id"], "CVE-2018-15473");

    let resp = app(&state)
        .oneshot(empty_request(
            "PATCH",
            &format!("/api/vulnerabilities/{vuln_id}/false-positive?is_false_positive=true"),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["message"], "Updated successfully");
    assert_eq!(json["vulnerability"]["false_positive"], true);

    let resp = app(&state)
        .oneshot(empty_request(
            "PATCH",
            &format!("/api/vulnerabilities/{vuln_id}/verify?verified=true"),
        ))
        .await
        .unwrap();
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["vulnerability"]["verified"], true);

    let resp = app(&state)
        .oneshot(get(&format!("/api/vulnerabilities/{vuln_id}")))
        .await
        .unwrap();
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["verified"], true);
    assert_eq!(json["false_positive"], true);
}

#[tokio::test]
async fn test_vulnerability_not_found_404() {
    let state = test_state().await;
    let resp = app(&state)
        .oneshot(get("/api/vulnerabilities/7"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app(&state)
        .oneshot(empty_request(
            "PATCH",
            "/api/vulnerabilities/7/verify?verified=true",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_vulnerability_summary() {
    let state = test_state().await;
    let resp = app(&state)
        .oneshot(get("/api/vulnerabilities/stats/summary"))
        .await
        .unwrap();
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["total"], 0);
    assert_eq!(json["risk_score"], 0.0);

    completed_scan(&state, serde_json::json!({ "target": "example.com" })).await;
    let resp = app(&state)
        .oneshot(get("/api/vulnerabilities/stats/summary"))
        .await
        .unwrap();
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["total"], 5);
    assert_eq!(json["by_severity"]["high"], 2);
    assert_eq!(json["by_severity"]["medium"], 2);
    assert_eq!(json["by_severity"]["low"], 1);
}

// ---------------------------------------------------------------------------
// Reports and analysis
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_csv_report_is_an_attachment() {
    let state = test_state().await;
    let id = completed_scan(&state, serde_json::json!({ "target": "example.com" })).await;

    let resp = app(&state)
        .oneshot(get(&format!("/api/reports/{id}/csv")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/csv");
    let disposition = resp.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with(&format!("attachment; filename=patchscout_scan_{id}_")));
    assert!(disposition.ends_with(".csv"));

    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("ID,CVE,Title,Severity,CVSS,Port,Service,Component,Exploit Status,Solution"));
    assert_eq!(text.lines().count(), 6);
}

#[tokio::test]
async fn test_json_and_summary_reports() {
    let state = test_state().await;
    let id = completed_scan(&state, serde_json::json!({ "target": "example.com" })).await;

    let resp = app(&state)
        .oneshot(get(&format!("/api/reports/{id}/json")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["vulnerabilities"].as_array().unwrap().len(), 5);
    assert_eq!(json["tool_results"].as_array().unwrap().len(), 5);

    let resp = app(&state)
        .oneshot(get(&format!("/api/reports/{id}/summary")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app(&state)
        .oneshot(get("/api/reports/999/summary"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dashboard_stats() {
    let state = test_state().await;
    completed_scan(&state, serde_json::json!({ "target": "example.com" })).await;

    let resp = app(&state)
        .oneshot(get("/api/reports/dashboard/stats"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["scans"]["total"], 1);
    assert_eq!(json["scans"]["completed"], 1);
    assert_eq!(json["vulnerabilities"]["total"], 5);
    assert_eq!(json["recent_scans"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_attack_paths_for_sample_scan() {
    let state = test_state().await;
    let id = completed_scan(&state, serde_json::json!({ "target": "example.com" })).await;

    let resp = app(&state)
        .oneshot(get(&format!("/api/attack-paths/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = parse_json(resp.into_body()).await;
    // No critical finding, so only the SSH path applies.
    assert_eq!(json["summary"]["total_paths"], 1);
    assert_eq!(json["attack_paths"][0]["id"], "path-2");

    let resp = app(&state)
        .oneshot(get(&format!("/api/attack-paths/{id}/graph")))
        .await
        .unwrap();
    let json = parse_json(resp.into_body()).await;
    // attacker + target + five findings
    assert_eq!(json["nodes"].as_array().unwrap().len(), 7);
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_chat_help_and_validation() {
    let state = test_state().await;
    let resp = app(&state)
        .oneshot(json_request(
            "POST",
            "/api/chat",
            serde_json::json!({ "message": "hello" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["rag_context_used"], false);
    assert!(json["sources"].as_array().unwrap().is_empty());

    let resp = app(&state)
        .oneshot(json_request(
            "POST",
            "/api/chat",
            serde_json::json!({ "message": "   " }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let resp = app(&state)
        .oneshot(json_request("POST", "/api/chat", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_chat_history() {
    let state = test_state().await;
    let resp = app(&state)
        .oneshot(get("/api/chat/history/3"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let id = completed_scan(
        &state,
        serde_json::json!({ "target": "example.com", "scan_config": { "selected_tools": ["Nuclei"] } }),
    )
    .await;
    let resp = app(&state)
        .oneshot(get(&format!("/api/chat/history/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json["scan_id"], id);
    assert!(json["messages"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_schedules_without_scheduler() {
    let state = test_state().await;
    let resp = app(&state).oneshot(get("/api/schedules")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(parse_json(resp.into_body()).await, serde_json::json!([]));

    let resp = app(&state)
        .oneshot(empty_request("POST", "/api/schedules/daily_x/pause"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_schedule_pause_and_remove() {
    let base = base_state(60, 10).await;
    let scheduler = Arc::new(Scheduler::new(Arc::new(base.runner.clone())));
    scheduler
        .add_daily("web", daily_request("10.0.0.5"), 2, 0)
        .await
        .unwrap();
    let state = Arc::new(base.with_scheduler(scheduler.clone()));

    let resp = app(&state).oneshot(get("/api/schedules")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json[0]["id"], "daily_web");
    assert_eq!(json[0]["target"], "10.0.0.5");
    assert_eq!(json[0]["paused"], false);
    assert!(json[0]["next_run"].is_string());

    let resp = app(&state)
        .oneshot(empty_request("POST", "/api/schedules/daily_web/pause"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = app(&state).oneshot(get("/api/schedules")).await.unwrap();
    let json = parse_json(resp.into_body()).await;
    assert_eq!(json[0]["paused"], true);
    assert!(json[0]["next_run"].is_null());

    let resp = app(&state)
        .oneshot(empty_request("DELETE", "/api/schedules/daily_web"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = app(&state)
        .oneshot(empty_request("DELETE", "/api/schedules/daily_web"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    scheduler.shutdown().await;
}
