//! Player identity and roster entries shared by the Matchmaker and Match Room.

use serde::{Deserialize, Serialize};

/// Stable per-player identifier, supplied by the authentication hook and
/// carried verbatim across queue, room and reconnection.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PlayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A player's roster entry inside a Match Room.
///
/// Created when the Matchmaker places the player into a Room; `connected`
/// flips on disconnect/reconnect; dropped only when the Room terminates.
#[derive(Clone, Debug)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub team: u32,
    pub connected: bool,
    pub last_acked_tick: u64,
    pub last_sequence: Option<u64>,
}

impl Player {
    pub fn new(id: PlayerId, username: String, team: u32) -> Self {
        Self {
            id,
            username,
            team,
            connected: true,
            last_acked_tick: 0,
            last_sequence: None,
        }
    }
}
