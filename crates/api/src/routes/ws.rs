// ---------------------------------------------------------------------------
// WebSocket event streaming
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::broadcast;
use tracing::debug;

use patchscout_common::ScanEvent;

use super::scans::require_scan;
use crate::error::ApiError;
use crate::state::AppState;

/// Every scan event published on the hub.
pub async fn all_events(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    let event_rx = state.hub.subscribe();
    ws.on_upgrade(move |socket| handle_ws(socket, event_rx, None))
}

/// Events of one scan; the stream ends after the scan's terminal event.
pub async fn scan_events(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<i64>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // Subscribe before checking the status so a terminal event can't slip
    // between the two.
    let event_rx = state.hub.subscribe();
    let scan = require_scan(&state, scan_id).await?;
    if scan.status.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "scan already {}; use GET /api/scans/{scan_id} for results",
            scan.status
        )));
    }

    Ok(ws.on_upgrade(move |socket| handle_ws(socket, event_rx, Some(scan_id))))
}

async fn handle_ws(
    mut socket: WebSocket,
    mut event_rx: broadcast::Receiver<Arc<ScanEvent>>,
    scan_id: Option<i64>,
) {
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                if client_left(incoming) {
                    debug!("websocket client disconnected");
                    return;
                }
            }
            received = event_rx.recv() => match received {
                Ok(event) => {
                    if scan_id.is_some_and(|id| id != event.scan_id()) {
                        continue;
                    }
                    let is_terminal = scan_id.is_some() && event.terminal_status().is_some();

                    let json = serde_json::to_string(event.as_ref()).unwrap_or_default();
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        debug!("websocket client disconnected");
                        break;
                    }

                    if is_terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    let warning = serde_json::json!({
                        "type": "warning",
                        "message": format!("missed {n} events due to slow consumption")
                    });
                    if socket
                        .send(Message::Text(warning.to_string().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}

/// Whether a frame read from the client ends the stream. Anything other
/// than a close or a broken connection is ignored.
fn client_left(incoming: Option<Result<Message, axum::Error>>) -> bool {
    match incoming {
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => true,
        Some(Ok(_)) => false,
    }
}
