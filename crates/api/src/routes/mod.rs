// ---------------------------------------------------------------------------
// Route registration
// ---------------------------------------------------------------------------

mod attack_paths;
mod chat;
mod reports;
mod scans;
mod schedules;
mod system;
mod vulnerabilities;
mod ws;

use std::sync::Arc;

use axum::http::{HeaderValue, StatusCode};
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::{ApiErrorBody, InternalDetail};
use crate::state::AppState;

/// Scan requests and chat messages are small.
const BODY_LIMIT: usize = 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    let system_routes = Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health));

    let api_routes = Router::new()
        .route("/api/scans", post(scans::create_scan).get(scans::list_scans))
        .route(
            "/api/scans/{id}",
            get(scans::get_scan).delete(scans::delete_scan),
        )
        .route("/api/scans/{id}/cancel", post(scans::cancel_scan))
        .route(
            "/api/scans/{id}/vulnerabilities",
            get(scans::scan_vulnerabilities),
        )
        .route("/api/scans/{id}/results", get(scans::scan_results))
        .route(
            "/api/vulnerabilities",
            get(vulnerabilities::list_vulnerabilities),
        )
        .route(
            "/api/vulnerabilities/stats/summary",
            get(vulnerabilities::summary),
        )
        .route(
            "/api/vulnerabilities/{id}",
            get(vulnerabilities::get_vulnerability),
        )
        .route(
            "/api/vulnerabilities/{id}/false-positive",
            patch(vulnerabilities::mark_false_positive),
        )
        .route(
            "/api/vulnerabilities/{id}/verify",
            patch(vulnerabilities::verify),
        )
        .route("/api/reports/dashboard/stats", get(reports::dashboard))
        .route("/api/reports/{id}/json", get(reports::json))
        .route("/api/reports/{id}/summary", get(reports::summary))
        .route("/api/reports/{id}/csv", get(reports::csv))
        .route("/api/attack-paths/{id}", get(attack_paths::paths))
        .route("/api/attack-paths/{id}/graph", get(attack_paths::graph))
        .route("/api/chat", post(chat::chat))
        .route("/api/chat/history/{scan_id}", get(chat::history))
        .route("/api/schedules", get(schedules::list))
        .route("/api/schedules/{id}", delete(schedules::remove))
        .route("/api/schedules/{id}/pause", post(schedules::pause))
        .route("/api/schedules/{id}/resume", post(schedules::resume))
        .route("/api/ws", get(ws::all_events))
        .route("/api/ws/scans/{id}", get(ws::scan_events));

    let mut router = system_routes.merge(api_routes);
    if state.debug {
        router = router.layer(map_response(expose_internal_errors));
    }

    router
        .layer(cors_layer(&state.cors_origins))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Debug mode: put the logged detail of a 500 back into the response body.
async fn expose_internal_errors(response: Response) -> Response {
    match response.extensions().get::<InternalDetail>().cloned() {
        Some(InternalDetail(message)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiErrorBody {
                error: "internal_error".into(),
                message,
            }),
        )
            .into_response(),
        None => response,
    }
}
