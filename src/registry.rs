//! Process-wide registries shared between the Matchmaker and the Gateway.
//!
//! Each Match Room owns its own player sub-state exclusively; the only
//! cross-cutting state is "which room is a given player currently bound
//! to", needed so a reconnecting or mid-match connection can be routed
//! without the Gateway reaching into Room internals.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::player::PlayerId;
use crate::room::{MatchId, RoomHandle};

/// `Map<playerId -> Room>` and `Map<matchId -> Room>`, kept in sync.
#[derive(Default)]
pub struct Registry {
    rooms_by_match: RwLock<BTreeMap<MatchId, RoomHandle>>,
    player_to_match: RwLock<BTreeMap<PlayerId, MatchId>>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register_room(&self, handle: RoomHandle, player_ids: &[PlayerId]) {
        let match_id = handle.match_id.clone();
        self.rooms_by_match
            .write()
            .await
            .insert(match_id.clone(), handle);
        let mut player_to_match = self.player_to_match.write().await;
        for player_id in player_ids {
            player_to_match.insert(player_id.clone(), match_id.clone());
        }
    }

    pub async fn room_for_player(&self, player_id: &PlayerId) -> Option<RoomHandle> {
        let match_id = self.player_to_match.read().await.get(player_id)?.clone();
        self.rooms_by_match.read().await.get(&match_id).cloned()
    }

    pub async fn room_by_match_id(&self, match_id: &str) -> Option<RoomHandle> {
        self.rooms_by_match.read().await.get(match_id).cloned()
    }

    /// Drop a finished room's entries. Called from the task draining
    /// `RoomFinished` notifications, never from the Room itself.
    pub async fn remove_room(&self, match_id: &str, player_ids: &[PlayerId]) {
        self.rooms_by_match.write().await.remove(match_id);
        let mut player_to_match = self.player_to_match.write().await;
        for player_id in player_ids {
            player_to_match.remove(player_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomConfig;
    use crate::room::Room;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn register_and_lookup_round_trips() {
        let registry = Registry::new();
        let (finished_tx, _finished_rx) = mpsc::unbounded_channel();
        let (_sender, _receiver) = mpsc::channel(8);
        let seats = vec![crate::room::PlayerSeat {
            player_id: PlayerId::new("a"),
            username: "Alice".to_string(),
            team: 0,
            sender: _sender,
        }];
        let (_room, handle) = Room::new(
            "match-1".to_string(),
            RoomConfig::default(),
            seats,
            1234,
            finished_tx,
        );
        registry
            .register_room(handle.clone(), &[PlayerId::new("a")])
            .await;

        assert!(registry.room_for_player(&PlayerId::new("a")).await.is_some());
        assert!(registry.room_by_match_id("match-1").await.is_some());

        registry.remove_room("match-1", &[PlayerId::new("a")]).await;
        assert!(registry.room_for_player(&PlayerId::new("a")).await.is_none());
    }
}
