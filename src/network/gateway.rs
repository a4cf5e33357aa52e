//! Connection Gateway: the network-boundary layer.
//!
//! Maps bidirectional client connections to players, forwards inbound
//! messages to the right Match Room or the Matchmaking Queue, and delivers
//! outbound broadcasts. Each accepted connection gets its own spawned task;
//! the Gateway itself holds no per-connection state beyond what each of
//! those tasks tracks locally plus the shared [`Registry`].

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use crate::command::SubmittedCommand;
use crate::config::ServerConfig;
use crate::matchmaker::{Matchmaker, MatchmakerError, MatchmakerHandle};
use crate::network::auth::{validate_token, AuthConfig};
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::player::PlayerId;
use crate::registry::Registry;

/// Gateway-level errors (startup/bind only; per-connection issues never
/// escalate here).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Per-connection state the Gateway tracks between messages.
struct ConnectionState {
    player_id: Option<PlayerId>,
    /// Populated once an auth token was presented and validated at upgrade
    /// time; takes precedence over any client-claimed `playerId`.
    authenticated_player_id: Option<PlayerId>,
}

impl ConnectionState {
    fn resolve_player_id(&self, claimed: PlayerId) -> PlayerId {
        self.authenticated_player_id.clone().unwrap_or(claimed)
    }
}

/// The Connection Gateway.
pub struct Gateway {
    config: ServerConfig,
    auth_config: AuthConfig,
    registry: Arc<Registry>,
    matchmaker: MatchmakerHandle,
}

impl Gateway {
    pub fn new(config: ServerConfig, auth_config: AuthConfig) -> Arc<Self> {
        let registry = Registry::new();
        let matchmaker = Matchmaker::spawn(config.matchmaker.clone(), config.room, registry.clone());
        Arc::new(Self {
            config,
            auth_config,
            registry,
            matchmaker,
        })
    }

    #[instrument(skip(self))]
    pub async fn run(self: Arc<Self>) -> Result<(), GatewayError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.config.port).into();
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "gateway listening");

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                    continue;
                }
            };
            let gateway = self.clone();
            tokio::spawn(async move {
                gateway.handle_connection(stream, peer_addr).await;
            });
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let mut token: Option<String> = None;
        let callback = |request: &Request, response: Response| {
            token = request
                .uri()
                .query()
                .and_then(|q| url_query_param(q, "token"));
            Ok(response)
        };

        let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(err) => {
                debug!(%peer_addr, error = %err, "websocket handshake failed");
                return;
            }
        };

        let authenticated_player_id = match (&token, self.auth_config.is_configured()) {
            (Some(token), true) => match validate_token(token, &self.auth_config) {
                Ok(claims) => Some(claims.player_id()),
                Err(err) => {
                    debug!(%peer_addr, error = %err, "rejecting connection with invalid token");
                    return;
                }
            },
            _ => None,
        };

        let mut conn = ConnectionState {
            player_id: authenticated_player_id.clone(),
            authenticated_player_id,
        };

        let (mut write, mut read) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(128);
        let writer_task = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "failed to serialize outbound message");
                        continue;
                    }
                };
                if write.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    self.handle_inbound(&mut conn, &text, &outbound_tx).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    debug!(%peer_addr, error = %err, "connection read error");
                    break;
                }
            }
        }

        self.handle_disconnect(&conn).await;
        writer_task.abort();
    }

    async fn handle_inbound(
        &self,
        conn: &mut ConnectionState,
        text: &str,
        outbound: &mpsc::Sender<ServerMessage>,
    ) {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(err) => {
                let _ = outbound
                    .send(ServerMessage::Error {
                        message: format!("malformed message: {err}"),
                    })
                    .await;
                return;
            }
        };

        if let Some(player_id) = &conn.player_id {
            if let Some(room) = self.registry.room_for_player(player_id).await {
                room.update_activity(player_id.clone()).await;
            }
        }

        match message {
            ClientMessage::QueueJoin { player_id, username } => {
                let player_id = conn.resolve_player_id(player_id);
                conn.player_id = Some(player_id.clone());
                let username = username.unwrap_or_else(|| player_id.as_str().to_string());
                match self
                    .matchmaker
                    .join_queue(player_id, username, outbound.clone())
                    .await
                {
                    Ok(()) | Err(MatchmakerError::AlreadyInQueue) => {}
                    Err(err) => {
                        let _ = outbound
                            .send(ServerMessage::Error { message: err.to_string() })
                            .await;
                    }
                }
            }
            ClientMessage::QueueLeave { player_id } => {
                let player_id = conn.resolve_player_id(player_id);
                self.matchmaker.leave_queue(player_id).await;
                let _ = outbound.send(ServerMessage::QueueLeft {}).await;
            }
            ClientMessage::SubmitCommands { tick, commands } => {
                self.dispatch_submit_commands(conn, tick, commands, outbound).await;
            }
            ClientMessage::StateHash { tick, hash } => {
                if let Some(player_id) = conn.player_id.clone() {
                    if let Some(room) = self.registry.room_for_player(&player_id).await {
                        room.submit_state_hash(player_id, tick, hash).await;
                    }
                }
            }
            ClientMessage::ReconnectMatch { player_id, match_id } => {
                self.dispatch_reconnect(conn, player_id, match_id, outbound).await;
            }
        }
    }

    async fn dispatch_submit_commands(
        &self,
        conn: &ConnectionState,
        tick: u64,
        commands: Vec<SubmittedCommand>,
        outbound: &mpsc::Sender<ServerMessage>,
    ) {
        let Some(player_id) = conn.player_id.clone() else {
            let _ = outbound
                .send(ServerMessage::SubmitCommandsAck {
                    tick,
                    accepted: false,
                    reason: Some("not bound to a player".to_string()),
                    rejected_count: None,
                })
                .await;
            return;
        };
        let Some(room) = self.registry.room_for_player(&player_id).await else {
            let _ = outbound
                .send(ServerMessage::SubmitCommandsAck {
                    tick,
                    accepted: false,
                    reason: Some("not in an active match".to_string()),
                    rejected_count: None,
                })
                .await;
            return;
        };
        let result = room.submit_commands(player_id, tick, commands).await;
        let _ = outbound
            .send(ServerMessage::SubmitCommandsAck {
                tick,
                accepted: result.accepted,
                reason: result.reason,
                rejected_count: result.rejected_count,
            })
            .await;
    }

    async fn dispatch_reconnect(
        &self,
        conn: &mut ConnectionState,
        player_id: PlayerId,
        match_id: String,
        outbound: &mpsc::Sender<ServerMessage>,
    ) {
        let player_id = conn.resolve_player_id(player_id);
        let Some(room) = self.registry.room_by_match_id(&match_id).await else {
            let _ = outbound
                .send(ServerMessage::ReconnectStatus {
                    success: false,
                    reason: Some("unknown match".to_string()),
                })
                .await;
            return;
        };
        let result = room.handle_reconnect(player_id.clone(), outbound.clone()).await;
        conn.player_id = Some(player_id);
        let _ = outbound
            .send(ServerMessage::ReconnectStatus {
                success: result.success,
                reason: result.reason,
            })
            .await;
        if let Some(state) = result.state {
            let _ = outbound.send(state).await;
        }
    }

    async fn handle_disconnect(&self, conn: &ConnectionState) {
        let Some(player_id) = &conn.player_id else {
            return;
        };
        self.matchmaker.leave_queue(player_id.clone()).await;
        if let Some(room) = self.registry.room_for_player(player_id).await {
            room.handle_disconnect(player_id.clone()).await;
        }
    }
}

fn url_query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        if k == key {
            Some(v.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_from_query_string() {
        assert_eq!(
            url_query_param("token=abc123&other=x", "token"),
            Some("abc123".to_string())
        );
        assert_eq!(url_query_param("other=x", "token"), None);
    }
}
