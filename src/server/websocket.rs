/// WebSocket handlers for real-time updates

use axum::{
    extract::ws::{Message, WebSocket},
    extract::{State, WebSocketUpgrade},
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::time::{interval, Duration};
use tracing::debug;

use super::handlers::AppState;
use crate::telemetry::EnvironmentEvent;

const PUSH_INTERVAL: Duration = Duration::from_secs(1);

/// WebSocket handler streaming the telemetry store
pub async fn ws_telemetry_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_telemetry_websocket(socket, state))
}

async fn handle_telemetry_websocket(socket: WebSocket, state: AppState) {
    // A consumer is looking again; bring back a collector someone stopped
    if state.slot.handle(EnvironmentEvent::VisibilityRestored) {
        debug!("telemetry collector restarted by websocket client");
    }

    let (mut sender, mut receiver) = socket.split();
    let mut interval = interval(PUSH_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Ok(json) = serde_json::to_string(&state.store.state()) {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    // Collection continues without viewers
    state.slot.handle(EnvironmentEvent::Hidden);
}
