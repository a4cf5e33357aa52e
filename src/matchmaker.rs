//! Matchmaker: assembles Match Rooms from the queue.
//!
//! Runs as its own spawned task, mirroring the Room: a mailbox for
//! `queue-join`/`queue-leave`, plus a periodic drain timer selected against
//! that same mailbox. No `Mutex` needed internally; the queue is owned
//! exclusively by this task.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, instrument, warn};

use crate::config::{MatchmakerConfig, RoomConfig};
use crate::network::protocol::ServerMessage;
use crate::player::PlayerId;
use crate::registry::Registry;
use crate::room::{PlayerSeat, Room, RoomFinished};

/// A mode preset: `(playersPerMatch, teamsCount)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModePreset {
    pub players_per_match: usize,
    pub teams_count: usize,
}

/// Errors surfaced by the Matchmaker's public contract.
#[derive(Debug, Error)]
pub enum MatchmakerError {
    #[error("Already in queue")]
    AlreadyInQueue,
    #[error("unknown game mode: {0}")]
    UnknownGameMode(String),
    #[error("invalid custom mode: playersPerMatch={players_per_match}, teamsCount={teams_count}")]
    InvalidCustomMode {
        players_per_match: usize,
        teams_count: usize,
    },
    #[error("matchmaker shut down")]
    Closed,
}

/// Look up a named preset, or parse a `"NvM"`-shaped custom mode string.
pub fn resolve_mode(mode: &str) -> Result<ModePreset, MatchmakerError> {
    match mode {
        "1v1" => Ok(ModePreset { players_per_match: 2, teams_count: 2 }),
        "2v2" => Ok(ModePreset { players_per_match: 4, teams_count: 2 }),
        "3v3" => Ok(ModePreset { players_per_match: 6, teams_count: 2 }),
        "4v4" => Ok(ModePreset { players_per_match: 8, teams_count: 2 }),
        "FFA4" => Ok(ModePreset { players_per_match: 4, teams_count: 4 }),
        other => parse_custom_mode(other).ok_or_else(|| MatchmakerError::UnknownGameMode(other.to_string())),
    }
}

fn parse_custom_mode(mode: &str) -> Option<ModePreset> {
    let (players, teams) = mode.split_once(':')?;
    let players_per_match: usize = players.parse().ok()?;
    let teams_count: usize = teams.parse().ok()?;
    validate_custom_mode(players_per_match, teams_count).ok()?;
    Some(ModePreset { players_per_match, teams_count })
}

fn validate_custom_mode(players_per_match: usize, teams_count: usize) -> Result<(), MatchmakerError> {
    let ok = players_per_match >= 2
        && teams_count >= 1
        && teams_count <= players_per_match
        && players_per_match % teams_count == 0;
    if ok {
        Ok(())
    } else {
        Err(MatchmakerError::InvalidCustomMode { players_per_match, teams_count })
    }
}

struct QueueEntry {
    player_id: PlayerId,
    username: String,
    sender: mpsc::Sender<ServerMessage>,
    joined_at: Instant,
}

enum MatchmakerEvent {
    JoinQueue {
        player_id: PlayerId,
        username: String,
        sender: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<Result<(), MatchmakerError>>,
    },
    LeaveQueue {
        player_id: PlayerId,
    },
}

/// Handle the Gateway holds to talk to the running Matchmaker.
#[derive(Clone)]
pub struct MatchmakerHandle {
    tx: mpsc::Sender<MatchmakerEvent>,
}

impl MatchmakerHandle {
    /// Join the queue. On success, a `queue-status` has already been sent
    /// to `sender` by the time this resolves.
    pub async fn join_queue(
        &self,
        player_id: PlayerId,
        username: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), MatchmakerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MatchmakerEvent::JoinQueue {
                player_id,
                username,
                sender,
                reply,
            })
            .await
            .map_err(|_| MatchmakerError::Closed)?;
        rx.await.map_err(|_| MatchmakerError::Closed)?
    }

    pub async fn leave_queue(&self, player_id: PlayerId) {
        let _ = self.tx.send(MatchmakerEvent::LeaveQueue { player_id }).await;
    }
}

/// The Matchmaker itself.
pub struct Matchmaker {
    queue: VecDeque<QueueEntry>,
    queued_ids: BTreeSet<PlayerId>,
    config: MatchmakerConfig,
    room_config: RoomConfig,
    registry: Arc<Registry>,
    finished_tx: mpsc::UnboundedSender<RoomFinished>,
    rx: mpsc::Receiver<MatchmakerEvent>,
}

impl Matchmaker {
    /// Construct the Matchmaker and spawn both its own mailbox-driving task
    /// and a companion task that drains `room-finished` notifications back
    /// into the shared registry. Rooms never call back into the Matchmaker
    /// directly.
    pub fn spawn(
        config: MatchmakerConfig,
        room_config: RoomConfig,
        registry: Arc<Registry>,
    ) -> MatchmakerHandle {
        let (tx, rx) = mpsc::channel(256);
        let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();

        let cleanup_registry = registry.clone();
        tokio::spawn(async move {
            while let Some(RoomFinished { match_id, player_ids }) = finished_rx.recv().await {
                info!(%match_id, "dropping finished room from registry");
                cleanup_registry.remove_room(&match_id, &player_ids).await;
            }
        });

        let matchmaker = Matchmaker {
            queue: VecDeque::new(),
            queued_ids: BTreeSet::new(),
            config,
            room_config,
            registry,
            finished_tx,
            rx,
        };
        tokio::spawn(matchmaker.run());
        MatchmakerHandle { tx }
    }

    fn estimate_wait_time_ms(&self, preset: ModePreset) -> u64 {
        let batches_ahead = (self.queue.len() as f64 / preset.players_per_match as f64).ceil() as u64;
        (batches_ahead * self.config.matchmaking_interval_ms).max(1000)
    }

    #[instrument(skip(self))]
    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.matchmaking_interval());
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.drain_queue().await;
                }
                maybe_event = self.rx.recv() => {
                    match maybe_event {
                        Some(MatchmakerEvent::JoinQueue { player_id, username, sender, reply }) => {
                            let result = self.join_queue(player_id, username, sender).await;
                            let _ = reply.send(result);
                        }
                        Some(MatchmakerEvent::LeaveQueue { player_id }) => {
                            self.leave_queue(&player_id).await;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    async fn join_queue(
        &mut self,
        player_id: PlayerId,
        username: String,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), MatchmakerError> {
        if self.queued_ids.contains(&player_id) {
            let _ = sender
                .send(ServerMessage::Error {
                    message: "Already in queue".to_string(),
                })
                .await;
            return Err(MatchmakerError::AlreadyInQueue);
        }

        let preset = resolve_mode(&self.config.game_mode)?;
        self.queued_ids.insert(player_id.clone());
        self.queue.push_back(QueueEntry {
            player_id,
            username,
            sender: sender.clone(),
            joined_at: Instant::now(),
        });

        let position = self.queue.len();
        let wait_time_ms = self.estimate_wait_time_ms(preset);
        let _ = sender
            .send(ServerMessage::QueueStatus { position, wait_time_ms })
            .await;
        Ok(())
    }

    async fn leave_queue(&mut self, player_id: &PlayerId) {
        if !self.queued_ids.remove(player_id) {
            return;
        }
        self.queue.retain(|entry| &entry.player_id != player_id);
    }

    /// Periodic drain: while the queue has at least `playersPerMatch`
    /// entries, pop that many head-most entries and construct a Room.
    async fn drain_queue(&mut self) {
        let preset = match resolve_mode(&self.config.game_mode) {
            Ok(preset) => preset,
            Err(err) => {
                warn!(error = %err, mode = %self.config.game_mode, "cannot drain queue, invalid game mode");
                return;
            }
        };

        while self.queue.len() >= preset.players_per_match {
            let mut batch = Vec::with_capacity(preset.players_per_match);
            let mut seen = BTreeSet::new();
            let mut duplicate = false;
            for _ in 0..preset.players_per_match {
                if let Some(entry) = self.queue.pop_front() {
                    if !seen.insert(entry.player_id.clone()) {
                        warn!(player_id = %entry.player_id, "duplicate playerId in queue batch, skipping match construction");
                        duplicate = true;
                    }
                    self.queued_ids.remove(&entry.player_id);
                    batch.push(entry);
                }
            }
            if duplicate {
                continue;
            }
            self.construct_room(batch, preset).await;
        }
    }

    async fn construct_room(&mut self, batch: Vec<QueueEntry>, preset: ModePreset) {
        let match_id = uuid::Uuid::new_v4().to_string();
        let random_seed: u32 = rand::random();
        let players_per_team = preset.players_per_match / preset.teams_count;

        let player_ids: Vec<PlayerId> = batch.iter().map(|e| e.player_id.clone()).collect();
        let seats: Vec<PlayerSeat> = batch
            .into_iter()
            .enumerate()
            .map(|(i, entry)| PlayerSeat {
                player_id: entry.player_id,
                username: entry.username,
                team: (i / players_per_team) as u32,
                sender: entry.sender,
            })
            .collect();

        info!(%match_id, mode = %self.config.game_mode, players = preset.players_per_match, "constructing match room");

        let (room, handle) = Room::new(
            match_id,
            self.room_config,
            seats,
            random_seed,
            self.finished_tx.clone(),
        );
        self.registry.register_room(handle, &player_ids).await;
        room.start();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_named_presets() {
        assert_eq!(resolve_mode("1v1").unwrap(), ModePreset { players_per_match: 2, teams_count: 2 });
        assert_eq!(resolve_mode("2v2").unwrap(), ModePreset { players_per_match: 4, teams_count: 2 });
        assert_eq!(resolve_mode("FFA4").unwrap(), ModePreset { players_per_match: 4, teams_count: 4 });
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(matches!(resolve_mode("5v5"), Err(MatchmakerError::UnknownGameMode(_))));
    }

    #[test]
    fn custom_mode_must_divide_evenly() {
        assert!(validate_custom_mode(6, 4).is_err());
        assert!(validate_custom_mode(6, 3).is_ok());
        assert!(validate_custom_mode(1, 1).is_err());
    }

    #[tokio::test]
    async fn join_then_leave_restores_empty_queue() {
        let registry = Registry::new();
        let handle = Matchmaker::spawn(
            MatchmakerConfig { game_mode: "1v1".to_string(), matchmaking_interval_ms: 50_000 },
            RoomConfig::default(),
            registry,
        );
        let (tx, mut rx) = mpsc::channel(8);
        handle
            .join_queue(PlayerId::new("a"), "Alice".to_string(), tx)
            .await
            .unwrap();
        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::QueueStatus { position: 1, .. }));

        handle.leave_queue(PlayerId::new("a")).await;

        let (tx2, mut rx2) = mpsc::channel(8);
        handle
            .join_queue(PlayerId::new("a"), "Alice".to_string(), tx2)
            .await
            .unwrap();
        let msg2 = rx2.recv().await.unwrap();
        assert!(matches!(msg2, ServerMessage::QueueStatus { position: 1, .. }));
    }

    #[tokio::test]
    async fn duplicate_join_is_rejected() {
        let registry = Registry::new();
        let handle = Matchmaker::spawn(
            MatchmakerConfig { game_mode: "1v1".to_string(), matchmaking_interval_ms: 50_000 },
            RoomConfig::default(),
            registry,
        );
        let (tx, _rx) = mpsc::channel(8);
        handle
            .join_queue(PlayerId::new("a"), "Alice".to_string(), tx.clone())
            .await
            .unwrap();
        let result = handle.join_queue(PlayerId::new("a"), "Alice".to_string(), tx).await;
        assert!(matches!(result, Err(MatchmakerError::AlreadyInQueue)));
    }
}
