use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    /// Only forward reminders for this medication.
    medication_id: Option<String>,
}

/// Streams fired reminders as `{"type":"reminder","reminder":{...}}` frames.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.medication_id))
}

fn wanted(msg: &str, medication_id: Option<&str>) -> bool {
    let Some(wanted_id) = medication_id else {
        return true;
    };
    serde_json::from_str::<serde_json::Value>(msg)
        .ok()
        .and_then(|parsed| {
            parsed
                .pointer("/reminder/medicationId")
                .and_then(|v| v.as_str())
                .map(|id| id == wanted_id)
        })
        .unwrap_or(false)
}

async fn handle_socket(socket: WebSocket, state: AppState, medication_id: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    tracing::debug!(medication_id = ?medication_id, "WebSocket connection established");

    let mut rx = state.ws_tx.subscribe();

    let filter = medication_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Ok(msg) = rx.recv().await {
            if !wanted(&msg, filter.as_deref()) {
                continue;
            }
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!(medication_id = ?medication_id, "WebSocket connection closed");
}
