//! WebSocket endpoints.
//!
//! Two kinds of socket connect here: the device gateway (default `/esp32`)
//! and dashboard observers (`/api/ws`). Both pair a writer task draining a
//! bounded channel with a reader task, and tear the connection down when
//! either side finishes.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bus::ChannelObserver;
use crate::state::AppState;

/// Create the WebSocket router with the device gateway at `gateway_path`.
pub fn router(gateway_path: &str) -> Router<Arc<AppState>> {
    Router::new()
        .route(gateway_path, get(gateway_handler))
        .route("/api/ws", get(observer_handler))
}

async fn gateway_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_gateway(socket, state))
}

async fn observer_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_observer(socket, state))
}

/// Forward queued frames to the socket until the queue closes or a send fails.
async fn forward_frames(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<String>,
) {
    while let Some(frame) = frames.recv().await {
        if sender.send(Message::Text(frame.into())).await.is_err() {
            break;
        }
    }
    // Queue closed: the session was superseded or the observer detached
    let _ = sender.send(Message::Close(None)).await;
}

/// Handle the device gateway connection.
async fn handle_gateway(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let session = state.gateway.attach();
    let session_id = session.id;

    let mut send_task = tokio::spawn(forward_frames(sender, session.outbound));

    let reader_state = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    if reader_state.gateway.is_current(session_id) {
                        debug!("Device session {} sent: {}", session_id, text.as_str());
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Device session {} receive error: {}", session_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }

    state.gateway.detach(session_id);
}

/// Handle an observer connection.
async fn handle_observer(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();

    let buffer = state.config.read().await.broadcast.observer_buffer;
    let (observer, frames) = ChannelObserver::channel(buffer);
    let observer_id = state.bus.attach(Arc::new(observer));
    info!("Observer {:?} connected", observer_id);

    let mut send_task = tokio::spawn(forward_frames(sender, frames));

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                // Pongs are handled by axum; observers have nothing to say
                Ok(_) => {}
                Err(e) => {
                    warn!("Observer receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }

    state.bus.detach(observer_id);
    info!("Observer {:?} disconnected", observer_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn create_test_state() -> Arc<AppState> {
        AppState::new(
            airguard_store::Store::open_in_memory().unwrap(),
            Config::default(),
        )
    }

    #[tokio::test]
    async fn test_plain_get_is_not_upgraded() {
        for path in ["/esp32", "/api/ws"] {
            let state = create_test_state();
            let response = router("/esp32")
                .with_state(Arc::clone(&state))
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert!(response.status().is_client_error(), "{}", path);
            assert!(!state.gateway.is_attached());
            assert_eq!(state.bus.observer_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_custom_gateway_path() {
        let state = create_test_state();
        let app = router("/device").with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/esp32").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
