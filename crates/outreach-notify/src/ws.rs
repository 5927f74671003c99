//! The axum WebSocket endpoint clients connect to for live notifications.
//! Authentication and authorization (does this user own this campaign) are
//! out of scope here and assumed handled by whatever sits in front of this
//! route; this handler trusts the `user_id`/`campaign_id` it's given.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::registry::ConnectionRegistry;

#[derive(Debug, Deserialize)]
pub struct Subscription {
    pub user_id: Uuid,
    pub campaign_id: Uuid,
}

pub async fn notifications_ws(
    ws: WebSocketUpgrade,
    Query(sub): Query<Subscription>,
    State(registry): State<ConnectionRegistry>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, registry, sub))
}

async fn handle_socket(mut socket: WebSocket, registry: ConnectionRegistry, sub: Subscription) {
    let Subscription { user_id, campaign_id } = sub;
    let mut rx = registry.register(user_id, campaign_id).await;
    info!(%user_id, %campaign_id, "client subscribed to notifications");

    loop {
        tokio::select! {
            notification = rx.recv() => {
                let Some(notification) = notification else { break };
                let payload = match serde_json::to_string(&notification) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize notification");
                        continue;
                    }
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }

    registry.unregister(user_id, campaign_id).await;
    info!(%user_id, %campaign_id, "client disconnected from notifications");
}
