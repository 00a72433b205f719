use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use backend_application::AppState;

use crate::error::HttpError;
use crate::middleware::authorize_with_query;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub user_id: String,
    pub access_token: Option<String>,
}

/// Upgrades to a WebSocket that receives every visit notification for one
/// user as a JSON text frame.
pub async fn visit_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if !authorize_with_query(&state.config, &headers, query.access_token.as_deref()) {
        return HttpError::Unauthorized.into_response();
    }
    let user_id = query.user_id.trim().to_string();
    if user_id.is_empty() {
        return HttpError::BadRequest("user_id is required".to_string()).into_response();
    }
    ws.on_upgrade(move |socket| forward_visits(socket, state, user_id))
}

async fn forward_visits(socket: WebSocket, state: AppState, user_id: String) {
    let mut rx = state.stream_hub.subscribe(&user_id).await;
    let (mut sink, mut stream) = socket.split();
    info!("visit stream opened for {}", user_id);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(message) => {
                    let text = match serde_json::to_string(&message) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!("failed to encode stream message: {}", err);
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("visit stream for {} lagged, skipped {} messages", user_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!("visit stream receive error for {}: {}", user_id, err);
                    break;
                }
            },
        }
    }
    info!("visit stream closed for {}", user_id);
}
