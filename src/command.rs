//! Command and tick-batch types.
//!
//! The core never decodes `data`, it is opaque JSON relayed as-is. `playerId`
//! and `tick` are always server-assigned once a command is buffered; only
//! `type`, `data` and the optional `sequence` are trusted from the wire.

use serde::{Deserialize, Serialize};

use crate::player::PlayerId;

/// A single player's intent for a single tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
    #[serde(rename = "playerId")]
    pub player_id: PlayerId,
    pub tick: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

/// The wire shape of one submitted command, before `playerId`/`tick` are
/// stamped on by the Room. Clients never get to set these themselves.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmittedCommand {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl Command {
    /// Total order key used by tick finalization: `(playerId asc, type asc)`.
    pub fn order_key(&self) -> (&str, &str) {
        (self.player_id.as_str(), self.kind.as_str())
    }
}

/// Sort a tick's commands into the deterministic broadcast order.
///
/// Primary key `playerId` ascending, secondary key `type` ascending. The sort
/// is stable, so within a tie on both keys (a single player never produces
/// one, since one player submits one ordered list) submission order survives.
pub fn order_commands(mut commands: Vec<Command>) -> Vec<Command> {
    commands.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(player: &str, kind: &str, tick: u64) -> Command {
        Command {
            kind: kind.to_string(),
            data: serde_json::json!({}),
            player_id: PlayerId::new(player),
            tick,
            sequence: None,
        }
    }

    #[test]
    fn orders_by_player_then_type() {
        let batch = vec![
            cmd("b", "move", 10),
            cmd("a", "move", 10),
            cmd("a", "attack", 10),
        ];
        let ordered = order_commands(batch);
        let keys: Vec<(String, String)> = ordered
            .iter()
            .map(|c| (c.player_id.as_str().to_string(), c.kind.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("a".to_string(), "attack".to_string()),
                ("a".to_string(), "move".to_string()),
                ("b".to_string(), "move".to_string()),
            ]
        );
    }
}
