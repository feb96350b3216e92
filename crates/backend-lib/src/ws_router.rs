// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! Router, handshake and per-connection socket loop.
use crate::auth::IdentityClaim;
use crate::error::AppError;
use crate::handlers::api;
use crate::metrics::{WS_ACTIVE, WS_CONNECTION, WS_DISCONNECTION, WS_REJECTED};
use crate::storage::Storage;
use crate::websocket::WebSocketHandler;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use parley_common::ServerEvent;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

/// Create the application router
pub fn create_router<S: Storage + Clone + 'static>(state: Arc<AppState<S>>) -> Router {
    let cors = cors_layer(&state.settings.allowed_origins);

    Router::new()
        .route("/ws", get(ws_handler::<S>))
        .route("/api/user", get(api::current_user::<S>))
        .route("/api/companyUsers", get(api::company_users::<S>))
        .route("/api/messages", get(api::room_history::<S>))
        .route("/health", get(api::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// An explicit origin list allows credentials; an empty one allows any origin
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unparsable CORS origin");
                None
            },
        })
        .collect();

    if origins.is_empty() {
        base.allow_origin(AllowOrigin::any())
    } else {
        base.allow_origin(AllowOrigin::list(origins))
            .allow_credentials(true)
    }
}

/// Handler for WebSocket connections.
///
/// The credential is verified before the upgrade; a rejected handshake
/// never reaches the socket stage.
pub async fn ws_handler<S: Storage + Clone + 'static>(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let ip = addr.ip();
    if !state.rate_limiter.check_rate_limit(ip) {
        counter!(WS_REJECTED).increment(1);
        tracing::warn!(%ip, "handshake refused, client locked out");
        return AppError::RateLimited.into_response();
    }

    let claim = match state.verifier.authorize_realtime(&headers) {
        Ok(claim) => claim,
        Err(e) => {
            // a valid credential with the wrong role is not a guessing attempt
            if e.status_code() == StatusCode::UNAUTHORIZED {
                state.rate_limiter.record_failed_attempt(ip);
            }
            counter!(WS_REJECTED).increment(1);
            tracing::warn!(%ip, error = %e, "handshake rejected");
            return e.into_response();
        },
    };
    state.rate_limiter.record_success(ip);

    ws.on_upgrade(move |socket| handle_connection(socket, state, claim))
}

async fn handle_connection<S: Storage + Clone + 'static>(
    socket: WebSocket,
    state: Arc<AppState<S>>,
    claim: IdentityClaim,
) {
    counter!(WS_CONNECTION).increment(1);
    gauge!(WS_ACTIVE).increment(1.0);

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(state.settings.outbound_buffer);
    let handler = WebSocketHandler::connect(state, claim, tx);
    let conn = handler.context().id;

    // Drain the outbound queue into the socket
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(%conn, event = event.kind(), error = %e, "failed to encode event");
                    continue;
                },
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    handler.on_open().await;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handler.handle_text(text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}, // binary and control frames carry no events
            Err(e) => {
                tracing::debug!(%conn, error = %e, "socket read failed");
                break;
            },
        }
    }

    handler.close();

    counter!(WS_DISCONNECTION).increment(1);
    gauge!(WS_ACTIVE).decrement(1.0);

    send_task.abort();
}
