//! WebSocket push channel — one connection per bill, forwarding every
//! [`PushEvent`] published to that bill's hub as a JSON text frame.
//!
//! Grounded on the teacher's `websocket/handler.rs` connection lifecycle
//! (split socket, forwarding task + receive task, `tokio::select!` to tear
//! both down together), but topic selection comes from the path rather
//! than a client `Subscribe` command — a watcher only ever cares about one
//! bill, so there is nothing to subscribe to after the upgrade.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{sink::SinkExt, stream::StreamExt};

use crate::domain::BillId;
use crate::gateway::state::AppState;
use crate::notify::PushEvent;

/// GET /bills/{id}/ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(bill_id): Path<BillId>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, bill_id, state))
}

async fn handle_socket(socket: WebSocket, bill_id: BillId, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.push_hub.subscribe(bill_id);

    let mut send_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event)
                        && sender.send(Message::Text(json.into())).await.is_err()
                    {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.push_hub.reap_if_idle(bill_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_event_round_trips_through_serde() {
        let event = PushEvent::BillUpdated {
            bill_id: BillId::new(),
            new_version: 3,
            updated_by: crate::notify::ActorLabel::Anonymous,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"billUpdated\""));
    }
}
