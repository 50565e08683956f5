//! WebSocket watcher endpoint
//!
//! A watcher connects to `/ws/{id}` and receives one JSON text frame per
//! notification. After a terminal event (`delivered`, `expired`, `gone`) the
//! server closes the socket. If the client leaves first, its subscription is
//! dropped.

use super::AppState;
use crate::error::ApiError;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::header::{HOST, ORIGIN};
use axum::response::Response;
use std::sync::Arc;
use wisp_core::{ChannelSink, Subscription, TransferId, TransferStore};

/// `GET /ws/{id}` (upgrade)
pub async fn watch(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    if !origin_allowed(&headers) {
        tracing::warn!("Rejected WebSocket from foreign origin");
        return Err(ApiError::Forbidden);
    }

    Ok(ws.on_upgrade(move |socket| async move {
        match raw_id.parse::<TransferId>() {
            Ok(id) => run_watcher(socket, state.store, id).await,
            Err(_) => send_malformed_gone(socket, &raw_id).await,
        }
    }))
}

/// Allow clients that send no `Origin` (curl, scripts) or the same host
fn origin_allowed(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get(ORIGIN).and_then(|v| v.to_str().ok()) else {
        return true;
    };
    let Some(host) = headers.get(HOST).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    origin == format!("http://{host}") || origin == format!("https://{host}")
}

async fn run_watcher(mut socket: WebSocket, store: TransferStore, id: TransferId) {
    let (sink, mut events) = ChannelSink::channel();
    let subscription = store.subscribe(&id, Arc::new(sink));
    if let Subscription::Active(key) = subscription {
        tracing::debug!("WebSocket watcher {:?} connected for {}", key, id);
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(notification) = event else { break };
                let text = match serde_json::to_string(&notification) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Cannot encode notification for {}: {}", id, e);
                        break;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
                if notification.event.is_terminal() {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }

    if let Subscription::Active(key) = subscription
        && store.unsubscribe(&id, key)
    {
        tracing::debug!("WebSocket watcher {:?} for {} disconnected", key, id);
    }
}

/// Identifiers that can't be parsed were never live
async fn send_malformed_gone(mut socket: WebSocket, raw_id: &str) {
    let text = serde_json::json!({ "event": "gone", "identifier": raw_id }).to_string();
    let _ = socket.send(Message::Text(text.into())).await;
    let _ = socket.send(Message::Close(None)).await;
}
