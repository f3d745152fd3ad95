use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vigil_core::Alert;

use crate::state::AppState;

/// Which of the four push streams a client is asking for (spec 6). Alerts
/// and system notices both ride `AlertDispatcher`'s subscription queue,
/// distinguished only by `AlertKind` once a message arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    LiveFeed,
    Alerts,
    Analysis,
    System,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub channel: Channel,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.channel))
}

async fn handle_socket(socket: WebSocket, state: AppState, channel: Channel) {
    debug!(?channel, "websocket connection established");
    let (mut sender, mut receiver) = socket.split();

    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "websocket receive error");
                    break;
                }
            }
        }
    });

    let send_task = tokio::spawn(async move {
        match channel {
            Channel::LiveFeed => forward_broadcast(&mut sender, state.live_feed_tx.subscribe()).await,
            Channel::Analysis => forward_broadcast(&mut sender, state.analysis_tx.subscribe()).await,
            Channel::Alerts => forward_alerts(&mut sender, &state, false).await,
            Channel::System => forward_alerts(&mut sender, &state, true).await,
        }
    });

    tokio::select! {
        _ = recv_task => {}
        _ = send_task => {}
    }
    debug!(?channel, "websocket connection closed");
}

async fn forward_broadcast<T: Serialize>(
    sender: &mut (impl futures_util::Sink<Message> + Unpin),
    mut rx: tokio::sync::broadcast::Receiver<T>,
) {
    loop {
        match rx.recv().await {
            Ok(item) => {
                let Ok(json) = serde_json::to_string(&item) else {
                    continue;
                };
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// `system` only wants `AlertKind::System`; `alerts` wants everything else.
/// Both share `AlertDispatcher`'s single subscription queue rather than a
/// second broadcast channel, so the backlog-replay and drop-oldest policy
/// already proven for alerts (spec 4.9) applies uniformly here too.
async fn forward_alerts(
    sender: &mut (impl futures_util::Sink<Message> + Unpin),
    state: &AppState,
    system_only: bool,
) {
    let subscription = state.dispatcher.subscribe();
    loop {
        let alert: Alert = subscription.recv().await;
        if (alert.kind == vigil_core::AlertKind::System) != system_only {
            continue;
        }
        let Ok(json) = serde_json::to_string(&alert) else {
            continue;
        };
        if sender.send(Message::Text(json)).await.is_err() {
            break;
        }
    }
}
