//! Match Room: deterministic coordination of a single match.
//!
//! A Room runs as its own spawned task, owning all of its state by value.
//! Inbound work arrives over an `mpsc` mailbox fed by the Gateway; the tick
//! loop and countdown are `tokio::time` timers selected against that same
//! mailbox. No lock guards Room-internal state. Only the registries shared
//! with the Matchmaker/Gateway are `Arc<RwLock<..>>`.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

use crate::command::{order_commands, Command, SubmittedCommand};
use crate::config::RoomConfig;
use crate::network::protocol::{
    RecentCommandBatch, ReconnectPlayerInfo, ServerMessage,
};
use crate::player::{Player, PlayerId};
use crate::room::activity::{ActivityEvent, ActivityTracker};
use crate::room::command_buffer::CommandBuffer;
use crate::room::desync::{DesyncDetector, DesyncOutcome};
use crate::room::history::CommandHistory;

/// A match identifier, minted once by the Matchmaker and fixed for the
/// Room's lifetime.
pub type MatchId = String;

/// `countdown -> playing -> finished`. `paused` is reserved and has no
/// transitions in this core (see DESIGN.md).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomPhase {
    Countdown,
    Playing,
    Paused,
    Finished,
}

impl RoomPhase {
    fn as_wire_str(self) -> &'static str {
        match self {
            RoomPhase::Countdown => "countdown",
            RoomPhase::Playing => "playing",
            RoomPhase::Paused => "paused",
            RoomPhase::Finished => "finished",
        }
    }
}

/// A seat the Matchmaker hands to a freshly constructed Room: the player's
/// identity plus its outbound delivery channel.
pub struct PlayerSeat {
    pub player_id: PlayerId,
    pub username: String,
    pub team: u32,
    pub sender: mpsc::Sender<ServerMessage>,
}

/// Outcome of `submit-commands`, mirrored to `submit-commands-ack`.
#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub accepted: bool,
    pub reason: Option<String>,
    pub rejected_count: Option<usize>,
}

/// Outcome of `reconnect-match`. The Gateway, not the Room, decides wire
/// ordering: it sends `reconnect-status` first and `state` (the
/// `reconnect-state` payload) second, so both land on the same outbound
/// channel in that order.
#[derive(Debug, Clone)]
pub struct ReconnectResult {
    pub success: bool,
    pub reason: Option<String>,
    pub state: Option<ServerMessage>,
}

struct RoomPlayer {
    player: Player,
    sender: Option<mpsc::Sender<ServerMessage>>,
}

/// Mailbox item: every way the Gateway (or a timer inside the Room itself)
/// can drive a state transition.
pub enum RoomEvent {
    SubmitCommands {
        player_id: PlayerId,
        tick: u64,
        commands: Vec<SubmittedCommand>,
        reply: oneshot::Sender<SubmitResult>,
    },
    SubmitStateHash {
        player_id: PlayerId,
        tick: u64,
        hash: String,
    },
    UpdateActivity {
        player_id: PlayerId,
    },
    Disconnect {
        player_id: PlayerId,
    },
    Reconnect {
        player_id: PlayerId,
        sender: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<ReconnectResult>,
    },
    Stop {
        reason: String,
    },
}

/// Handle the Gateway/Matchmaker hold onto a live Room; the only way to
/// reach it is through its mailbox.
#[derive(Clone)]
pub struct RoomHandle {
    pub match_id: MatchId,
    tx: mpsc::Sender<RoomEvent>,
}

impl RoomHandle {
    pub async fn submit_commands(
        &self,
        player_id: PlayerId,
        tick: u64,
        commands: Vec<SubmittedCommand>,
    ) -> SubmitResult {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(RoomEvent::SubmitCommands {
                player_id,
                tick,
                commands,
                reply,
            })
            .await
            .is_err()
        {
            return SubmitResult {
                accepted: false,
                reason: Some("room closed".to_string()),
                rejected_count: None,
            };
        }
        rx.await.unwrap_or(SubmitResult {
            accepted: false,
            reason: Some("room closed".to_string()),
            rejected_count: None,
        })
    }

    pub async fn submit_state_hash(&self, player_id: PlayerId, tick: u64, hash: String) {
        let _ = self
            .tx
            .send(RoomEvent::SubmitStateHash {
                player_id,
                tick,
                hash,
            })
            .await;
    }

    pub async fn update_activity(&self, player_id: PlayerId) {
        let _ = self.tx.send(RoomEvent::UpdateActivity { player_id }).await;
    }

    pub async fn handle_disconnect(&self, player_id: PlayerId) {
        let _ = self.tx.send(RoomEvent::Disconnect { player_id }).await;
    }

    pub async fn handle_reconnect(
        &self,
        player_id: PlayerId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> ReconnectResult {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(RoomEvent::Reconnect {
                player_id,
                sender,
                reply,
            })
            .await
            .is_err()
        {
            return ReconnectResult {
                success: false,
                reason: Some("room closed".to_string()),
                state: None,
            };
        }
        rx.await.unwrap_or(ReconnectResult {
            success: false,
            reason: Some("room closed".to_string()),
            state: None,
        })
    }

    pub async fn stop(&self, reason: impl Into<String>) {
        let _ = self
            .tx
            .send(RoomEvent::Stop {
                reason: reason.into(),
            })
            .await;
    }
}

/// Notification the Matchmaker/Gateway subscribe to, raised once when a
/// Room finishes, so its registry entries can be dropped. One-way: the Room
/// never calls back into the Matchmaker directly.
pub struct RoomFinished {
    pub match_id: MatchId,
    pub player_ids: Vec<PlayerId>,
}

/// The Match Room itself. Constructed by the Matchmaker, then handed to
/// `tokio::spawn` via [`Room::start`], which consumes it.
pub struct Room {
    match_id: MatchId,
    config: RoomConfig,
    players: Vec<RoomPlayer>,
    current_tick: u64,
    phase: RoomPhase,
    random_seed: u32,
    command_buffer: CommandBuffer,
    history: CommandHistory,
    desync: DesyncDetector,
    activity: ActivityTracker,
    finished_tx: mpsc::UnboundedSender<RoomFinished>,
    rx: mpsc::Receiver<RoomEvent>,
}

impl Room {
    pub fn new(
        match_id: MatchId,
        config: RoomConfig,
        seats: Vec<PlayerSeat>,
        random_seed: u32,
        finished_tx: mpsc::UnboundedSender<RoomFinished>,
    ) -> (Self, RoomHandle) {
        let players = seats
            .into_iter()
            .map(|seat| RoomPlayer {
                player: Player::new(seat.player_id, seat.username, seat.team),
                sender: Some(seat.sender),
            })
            .collect();
        let (tx, rx) = mpsc::channel(256);
        let history = CommandHistory::new(config.command_history_ticks);
        let room = Room {
            match_id: match_id.clone(),
            config,
            players,
            current_tick: 0,
            phase: RoomPhase::Countdown,
            random_seed,
            command_buffer: CommandBuffer::new(),
            history,
            desync: DesyncDetector::new(),
            activity: ActivityTracker::new(),
            finished_tx,
            rx,
        };
        let handle = RoomHandle { match_id, tx };
        (room, handle)
    }

    fn teammates_and_opponents(&self, player_id: &PlayerId) -> (u32, Vec<PlayerId>, Vec<PlayerId>) {
        let team = self
            .players
            .iter()
            .find(|p| &p.player.id == player_id)
            .map(|p| p.player.team)
            .unwrap_or(0);
        let mut teammates = Vec::new();
        let mut opponents = Vec::new();
        for p in &self.players {
            if &p.player.id == player_id {
                continue;
            }
            if p.player.team == team {
                teammates.push(p.player.id.clone());
            } else {
                opponents.push(p.player.id.clone());
            }
        }
        (team, teammates, opponents)
    }

    async fn send_to(&self, player_id: &PlayerId, msg: ServerMessage) {
        if let Some(seat) = self.players.iter().find(|p| &p.player.id == player_id) {
            if let Some(sender) = &seat.sender {
                if sender.send(msg).await.is_err() {
                    warn!(match_id = %self.match_id, %player_id, "failed to deliver message, recipient gone");
                }
            }
        }
    }

    async fn broadcast(&self, msg: ServerMessage) {
        for seat in &self.players {
            if let Some(sender) = &seat.sender {
                if sender.send(msg.clone()).await.is_err() {
                    warn!(match_id = %self.match_id, player_id = %seat.player.id, "broadcast delivery failed");
                }
            }
        }
    }

    fn connected_player_ids(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| p.player.connected)
            .map(|p| p.player.id.clone())
            .collect()
    }

    fn is_member(&self, player_id: &PlayerId) -> bool {
        self.players.iter().any(|p| &p.player.id == player_id)
    }

    fn player_mut(&mut self, player_id: &PlayerId) -> Option<&mut RoomPlayer> {
        self.players.iter_mut().find(|p| &p.player.id == player_id)
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Consume the Room, spawning its task. Returns immediately; the
    /// returned `JoinHandle` is mostly useful for tests.
    pub fn start(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_start_sequence().await;
            if self.phase == RoomPhase::Playing {
                self.run_tick_loop().await;
            }
            self.drain_remaining().await;
        })
    }

    #[instrument(skip(self), fields(match_id = %self.match_id))]
    async fn run_start_sequence(&mut self) {
        let match_id = self.match_id.clone();
        let player_ids: Vec<PlayerId> = self.players.iter().map(|p| p.player.id.clone()).collect();
        for player_id in &player_ids {
            let (team_id, teammates, opponents) = self.teammates_and_opponents(player_id);
            self.send_to(
                player_id,
                ServerMessage::MatchFound {
                    match_id: match_id.clone(),
                    player_id: player_id.clone(),
                    team_id,
                    teammates,
                    opponents,
                },
            )
            .await;
        }

        let mut seconds = self.config.countdown_seconds;
        loop {
            self.broadcast(ServerMessage::Countdown { seconds }).await;
            if seconds == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            seconds -= 1;
        }

        self.broadcast(ServerMessage::GameStart {
            match_id: match_id.clone(),
            random_seed: self.random_seed,
        })
        .await;
        self.phase = RoomPhase::Playing;
        let now = Instant::now();
        let player_ids: Vec<PlayerId> = self.players.iter().map(|p| p.player.id.clone()).collect();
        for player_id in &player_ids {
            self.activity.register(player_id, now);
        }
        info!(match_id = %match_id, random_seed = self.random_seed, "match entered playing phase");
    }

    async fn run_tick_loop(&mut self) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !self.finalize_tick().await {
                        break;
                    }
                }
                maybe_event = self.rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            if self.handle_event(event).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
            if self.phase == RoomPhase::Finished {
                break;
            }
        }
    }

    /// Drain any remaining mailbox traffic after the Room has finished, so
    /// senders get a clean "room closed" rather than hanging. After stop(),
    /// further inbound events for this Room are dropped.
    async fn drain_remaining(&mut self) {
        self.rx.close();
        while let Some(event) = self.rx.recv().await {
            self.reject_after_finish(event).await;
        }
        let player_ids = self.players.iter().map(|p| p.player.id.clone()).collect();
        let _ = self.finished_tx.send(RoomFinished {
            match_id: self.match_id.clone(),
            player_ids,
        });
    }

    async fn reject_after_finish(&self, event: RoomEvent) {
        match event {
            RoomEvent::SubmitCommands { tick, reply, .. } => {
                let _ = reply.send(SubmitResult {
                    accepted: false,
                    reason: Some("match finished".to_string()),
                    rejected_count: None,
                });
                let _ = tick;
            }
            RoomEvent::Reconnect { reply, .. } => {
                let _ = reply.send(ReconnectResult {
                    success: false,
                    reason: Some("match finished".to_string()),
                    state: None,
                });
            }
            _ => {}
        }
    }

    /// Returns `false` when the Room should stop its loop (reached
    /// `finished`).
    async fn handle_event(&mut self, event: RoomEvent) -> bool {
        match event {
            RoomEvent::SubmitCommands {
                player_id,
                tick,
                commands,
                reply,
            } => {
                let result = self.submit_commands(player_id, tick, commands).await;
                let _ = reply.send(result);
                false
            }
            RoomEvent::SubmitStateHash {
                player_id,
                tick,
                hash,
            } => {
                self.submit_state_hash(player_id, tick, hash).await;
                self.phase == RoomPhase::Finished
            }
            RoomEvent::UpdateActivity { player_id } => {
                self.activity.record_activity(&player_id, Instant::now());
                false
            }
            RoomEvent::Disconnect { player_id } => {
                self.handle_disconnect(player_id).await;
                false
            }
            RoomEvent::Reconnect {
                player_id,
                sender,
                reply,
            } => {
                let result = self.handle_reconnect(player_id, sender).await;
                let _ = reply.send(result);
                false
            }
            RoomEvent::Stop { reason } => {
                self.stop(reason).await;
                true
            }
        }
    }

    async fn submit_commands(
        &mut self,
        player_id: PlayerId,
        tick: u64,
        commands: Vec<SubmittedCommand>,
    ) -> SubmitResult {
        if self.phase != RoomPhase::Playing {
            return SubmitResult {
                accepted: false,
                reason: Some("match not in progress".to_string()),
                rejected_count: None,
            };
        }
        if !self.is_member(&player_id) {
            return SubmitResult {
                accepted: false,
                reason: Some("not a member of this match".to_string()),
                rejected_count: None,
            };
        }
        let floor = self.current_tick.saturating_sub(self.config.max_tick_behind);
        let ceiling = self.current_tick + self.config.max_tick_ahead;
        if tick < floor || tick > ceiling {
            return SubmitResult {
                accepted: false,
                reason: Some("tick out of range".to_string()),
                rejected_count: None,
            };
        }

        let mut valid = Vec::with_capacity(commands.len());
        let mut rejected = 0usize;
        for sc in commands {
            if sc.kind.trim().is_empty() {
                self.send_to(
                    &player_id,
                    ServerMessage::CommandRejected {
                        reason: "empty command type".to_string(),
                        tick,
                        kind: sc.kind.clone(),
                    },
                )
                .await;
                rejected += 1;
                continue;
            }
            valid.push(sc);
        }

        if self.config.validate_input_sequence {
            let expected_start = self
                .players
                .iter()
                .find(|p| p.player.id == player_id)
                .and_then(|p| p.player.last_sequence)
                .map(|s| s + 1)
                .unwrap_or(0);
            let mut expected = expected_start;
            for sc in &valid {
                if sc.sequence != Some(expected) {
                    return SubmitResult {
                        accepted: false,
                        reason: Some("invalid sequence".to_string()),
                        rejected_count: if rejected > 0 { Some(rejected) } else { None },
                    };
                }
                expected += 1;
            }
        }

        let max_sequence = valid.iter().filter_map(|c| c.sequence).max();
        let stamped: Vec<Command> = valid
            .into_iter()
            .map(|sc| Command {
                kind: sc.kind,
                data: sc.data,
                player_id: player_id.clone(),
                tick,
                sequence: sc.sequence,
            })
            .collect();

        self.command_buffer.submit(tick, player_id.clone(), stamped);
        if let Some(seat) = self.player_mut(&player_id) {
            seat.player.last_acked_tick = tick;
            if let Some(seq) = max_sequence {
                seat.player.last_sequence = Some(seq);
            }
        }

        SubmitResult {
            accepted: true,
            reason: None,
            rejected_count: if rejected > 0 { Some(rejected) } else { None },
        }
    }

    async fn submit_state_hash(&mut self, player_id: PlayerId, tick: u64, hash: String) {
        if !self.config.enable_state_hashing {
            return;
        }
        if !self.is_member(&player_id) {
            return;
        }
        let connected = self.connected_player_ids();
        let outcome = self
            .desync
            .record_hash(tick, player_id, hash, &connected, &self.config.desync);
        match outcome {
            DesyncOutcome::Pending => {}
            DesyncOutcome::Agreement => {
                debug!(match_id = %self.match_id, tick, "state hashes agree");
            }
            DesyncOutcome::Disagreement { hashes } => {
                warn!(match_id = %self.match_id, tick, "state hash disagreement");
                self.broadcast(ServerMessage::DesyncDetected { tick, hashes }).await;
            }
            DesyncOutcome::GraceExceeded { hashes, action } => {
                warn!(match_id = %self.match_id, tick, "desync grace period exceeded");
                self.broadcast(ServerMessage::DesyncDetected {
                    tick,
                    hashes: hashes.clone(),
                })
                .await;
                match action {
                    crate::config::DesyncAction::EndMatch => {
                        let details = json!({ "tick": tick, "hashes": hashes });
                        self.finish("desync", Some(details), None).await;
                    }
                    crate::config::DesyncAction::LogOnly => {
                        warn!(match_id = %self.match_id, tick, "desync action is log-only, match continues");
                    }
                }
            }
        }
    }

    async fn handle_disconnect(&mut self, player_id: PlayerId) {
        let Some(seat) = self.player_mut(&player_id) else {
            return;
        };
        seat.player.connected = false;
        seat.sender = None;
        self.activity.forget(&player_id);
        let match_id = self.match_id.clone();
        let grace_period_ms = self.config.reconnect_grace_period_ms;
        info!(match_id = %match_id, %player_id, "player disconnected");
        self.broadcast(ServerMessage::PlayerDisconnected {
            player_id,
            match_id,
            grace_period_ms,
        })
        .await;
    }

    async fn handle_reconnect(
        &mut self,
        player_id: PlayerId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> ReconnectResult {
        if !self.is_member(&player_id) {
            return ReconnectResult {
                success: false,
                reason: Some("unknown match or player".to_string()),
                state: None,
            };
        }

        if let Some(seat) = self.player_mut(&player_id) {
            seat.player.connected = true;
            seat.sender = Some(sender);
        }
        self.activity.record_activity(&player_id, Instant::now());

        self.broadcast(ServerMessage::PlayerReconnected {
            player_id: player_id.clone(),
        })
        .await;

        let from_tick = self
            .current_tick
            .saturating_sub(self.config.command_history_ticks);
        let recent_commands: Vec<RecentCommandBatch> = self
            .history
            .recent_from(from_tick, self.current_tick)
            .into_iter()
            .map(|(tick, commands)| RecentCommandBatch { tick, commands })
            .collect();
        let players: Vec<ReconnectPlayerInfo> = self
            .players
            .iter()
            .map(|p| ReconnectPlayerInfo {
                player_id: p.player.id.clone(),
                username: p.player.username.clone(),
                team: p.player.team,
                connected: p.player.connected,
            })
            .collect();

        let state = ServerMessage::ReconnectState {
            match_id: self.match_id.clone(),
            current_tick: self.current_tick,
            phase: self.phase.as_wire_str().to_string(),
            players,
            recent_commands,
        };

        ReconnectResult {
            success: true,
            reason: None,
            state: Some(state),
        }
    }

    /// Tick finalization. Returns `false` once the Room has finished so the
    /// caller can stop looping.
    async fn finalize_tick(&mut self) -> bool {
        let tick = self.current_tick;
        self.broadcast(ServerMessage::TickSync {
            tick,
            timestamp: Self::now_ms(),
        })
        .await;

        self.run_activity_check().await;
        if self.phase == RoomPhase::Finished {
            return false;
        }

        let pending = self.command_buffer.take_tick(tick);
        let ordered = order_commands(pending);

        self.history.record(tick, ordered.clone());

        self.broadcast(ServerMessage::CommandsBatch {
            tick,
            commands: ordered,
        })
        .await;

        self.command_buffer.prune_before(tick);
        self.current_tick = tick + 1;
        true
    }

    async fn run_activity_check(&mut self) {
        let lag = self.config.lag_threshold();
        let disconnect = self.config.disconnect_threshold();
        let now = Instant::now();
        let events = self.activity.check(now, lag, disconnect);
        for (player_id, event) in events {
            let ms_since = self
                .activity
                .ms_since_last_activity(&player_id, now)
                .unwrap_or_default()
                .as_millis() as u64;
            match event {
                ActivityEvent::TimedOut => {
                    if let Some(seat) = self.player_mut(&player_id) {
                        seat.player.connected = false;
                        seat.sender = None;
                    }
                    self.activity.forget(&player_id);
                    warn!(match_id = %self.match_id, %player_id, "player timed out");
                    self.broadcast(ServerMessage::PlayerTimeout {
                        player_id,
                        last_message_time: Self::now_ms().saturating_sub(ms_since),
                        current_tick: self.current_tick,
                        ms_since_last_message: ms_since,
                    })
                    .await;
                }
                ActivityEvent::StartedLagging => {
                    debug!(match_id = %self.match_id, %player_id, "player lagging");
                    self.broadcast(ServerMessage::PlayerLagging {
                        player_id,
                        current_tick: self.current_tick,
                        ms_since_last_message: ms_since,
                    })
                    .await;
                }
            }
        }
    }

    async fn stop(&mut self, reason: String) {
        self.finish(&reason, None, None).await;
    }

    async fn finish(&mut self, reason: &str, details: Option<serde_json::Value>, winner: Option<u32>) {
        if self.phase == RoomPhase::Finished {
            return;
        }
        self.phase = RoomPhase::Finished;
        info!(match_id = %self.match_id, reason, "match finished");
        self.broadcast(ServerMessage::MatchEnd {
            reason: reason.to_string(),
            details,
            winner,
        })
        .await;
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }
}
