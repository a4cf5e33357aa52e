//! Wire protocol: named JSON events over the bidirectional client connection.
//!
//! Every message is tagged by its event `type` field so the Gateway can
//! dispatch on name without a second parse pass.

use serde::{Deserialize, Serialize};

use crate::command::{Command, SubmittedCommand};
use crate::player::PlayerId;

/// Inbound: client -> server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join the matchmaking queue.
    QueueJoin {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        #[serde(default)]
        username: Option<String>,
    },
    /// Leave the matchmaking queue.
    QueueLeave {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },
    /// Submit a player's command batch for one tick.
    SubmitCommands {
        tick: u64,
        commands: Vec<SubmittedCommand>,
    },
    /// Report a client-computed state hash for desync detection.
    StateHash { tick: u64, hash: String },
    /// Re-bind an existing player/match pair to this connection.
    ReconnectMatch {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        #[serde(rename = "matchId")]
        match_id: String,
    },
}

/// Outbound: server -> client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    QueueStatus { position: usize, #[serde(rename = "waitTime")] wait_time_ms: u64 },
    QueueLeft {},
    Error { message: String },
    MatchFound {
        #[serde(rename = "matchId")]
        match_id: String,
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        #[serde(rename = "teamId")]
        team_id: u32,
        teammates: Vec<PlayerId>,
        opponents: Vec<PlayerId>,
    },
    Countdown { seconds: u32 },
    GameStart {
        #[serde(rename = "matchId")]
        match_id: String,
        #[serde(rename = "randomSeed")]
        random_seed: u32,
    },
    TickSync { tick: u64, timestamp: u64 },
    CommandsBatch { tick: u64, commands: Vec<Command> },
    SubmitCommandsAck {
        tick: u64,
        accepted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(rename = "rejectedCount", skip_serializing_if = "Option::is_none")]
        rejected_count: Option<usize>,
    },
    CommandRejected {
        reason: String,
        tick: u64,
        #[serde(rename = "type")]
        kind: String,
    },
    PlayerLagging {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        #[serde(rename = "currentTick")]
        current_tick: u64,
        #[serde(rename = "msSinceLastMessage")]
        ms_since_last_message: u64,
    },
    PlayerTimeout {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        #[serde(rename = "lastMessageTime")]
        last_message_time: u64,
        #[serde(rename = "currentTick")]
        current_tick: u64,
        #[serde(rename = "msSinceLastMessage")]
        ms_since_last_message: u64,
    },
    PlayerDisconnected {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        #[serde(rename = "matchId")]
        match_id: String,
        #[serde(rename = "gracePeriodMs")]
        grace_period_ms: u64,
    },
    PlayerReconnected {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },
    ReconnectStatus {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ReconnectState {
        #[serde(rename = "matchId")]
        match_id: String,
        #[serde(rename = "currentTick")]
        current_tick: u64,
        phase: String,
        players: Vec<ReconnectPlayerInfo>,
        #[serde(rename = "recentCommands")]
        recent_commands: Vec<RecentCommandBatch>,
    },
    DesyncDetected {
        tick: u64,
        hashes: std::collections::BTreeMap<PlayerId, String>,
    },
    MatchEnd {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner: Option<u32>,
    },
}

/// One player's summary inside `reconnect-state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPlayerInfo {
    #[serde(rename = "playerId")]
    pub player_id: PlayerId,
    pub username: String,
    pub team: u32,
    pub connected: bool,
}

/// One finalized tick's batch, as replayed to a reconnecting player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentCommandBatch {
    pub tick: u64,
    pub commands: Vec<Command>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_tags_are_kebab_case() {
        let json = serde_json::json!({
            "type": "queue-join",
            "playerId": "a",
            "username": "Alice",
        });
        let msg: ClientMessage = serde_json::from_value(json).unwrap();
        matches!(msg, ClientMessage::QueueJoin { .. });
    }

    #[test]
    fn server_message_round_trips_through_json() {
        let msg = ServerMessage::Countdown { seconds: 5 };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "countdown");
        assert_eq!(json["seconds"], 5);
    }
}
