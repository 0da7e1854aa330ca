//! Live order updates over WebSocket.
//!
//! `GET /ws/orders` with the token in `Authorization: Bearer` or `?token=`
//! (browsers cannot set headers on a WebSocket handshake). The connection is
//! registered with the Notification Hub before the upgrade completes, and the
//! per-connection task deregisters it on every exit path.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::extract::{Extension, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use orderflow_auth::Actor;
use orderflow_events::Connection;
use orderflow_orders::OrderEvent;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::middleware::bearer_token;

#[derive(Debug, Deserialize)]
pub struct StreamAuthQuery {
    token: Option<String>,
}

pub async fn order_updates(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<StreamAuthQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let identity = bearer_token(&headers)
        .or(query.token.as_deref())
        .and_then(|token| match services.jwt.validate(token, Utc::now()) {
            Ok(claims) => Some(Actor::from(&claims).user_id),
            Err(e) => {
                tracing::debug!(error = %e, "stream token rejected");
                None
            }
        });

    // Rejected before upgrading: no frame is ever sent and nothing is registered.
    let connection = match services.orders.hub().connect(identity) {
        Ok(connection) => connection,
        Err(e) => return errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", e.to_string()),
    };

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| run_connection(socket, connection)),
        // `connection` is dropped here, which deregisters it.
        Err(rejection) => rejection.into_response(),
    }
}

async fn run_connection(socket: WebSocket, mut connection: Connection<OrderEvent>) {
    let (mut sink, mut stream) = socket.split();

    tracing::info!(user_id = %connection.identity(), connection = %connection.id(), "stream connected");

    loop {
        tokio::select! {
            event = connection.recv() => {
                let Some(event) = event else { break };
                let frame = match serde_json::to_string(&event.frame()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode order update");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    tracing::debug!(error = %e, "stream write failed");
                    break;
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "stream read failed");
                        break;
                    }
                    // No client-to-server payload is defined on this channel.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::info!(user_id = %connection.identity(), connection = %connection.id(), "stream disconnected");
}
