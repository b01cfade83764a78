use crate::api::AppState;
use crate::api::schemas::gateway::WsParams;
use crate::error::AppError;
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::Extensions,
    response::{IntoResponse, Response},
};
use tower_http::request_id::RequestId;
use uuid::Uuid;

/// Upgrades to the event protocol. `user_id` is optional; without it the
/// connection is anonymous and cannot receive addressed events.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    extensions: Extensions,
    State(state): State<AppState>,
) -> Response {
    let request_id = extensions
        .get::<RequestId>()
        .map(|id| id.header_value().to_str().unwrap_or_default().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let user_id = match params.user_id.as_deref().filter(|raw| !raw.is_empty()).map(Uuid::parse_str).transpose() {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket handshake rejected: malformed user_id");
            return AppError::InvalidArgument("user_id must be a UUID".into()).into_response();
        }
    };

    let gateway = state.gateway_service.clone();
    let shutdown_rx = state.shutdown_rx.clone();
    ws.on_upgrade(move |socket| async move {
        gateway.handle_socket(socket, user_id, request_id, shutdown_rx).await;
    })
}
