//! Configuration surface for the matchmaker, match room and gateway.
//!
//! Mirrors the external configuration table: every field here has the same
//! default as the wire-level configuration surface, and can be overridden
//! from the environment the same way `network::auth::AuthConfig::from_env`
//! reads JWT settings.

use std::time::Duration;

/// What the Desync Detector does once `consecutiveDesyncs` crosses the grace
/// period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DesyncAction {
    EndMatch,
    LogOnly,
}

impl Default for DesyncAction {
    fn default() -> Self {
        DesyncAction::EndMatch
    }
}

impl DesyncAction {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "end-match" => Some(DesyncAction::EndMatch),
            "log-only" => Some(DesyncAction::LogOnly),
            _ => None,
        }
    }
}

/// Desync detector configuration.
#[derive(Clone, Copy, Debug)]
pub struct DesyncConfig {
    pub action: DesyncAction,
    pub grace_period_ticks: u32,
}

impl Default for DesyncConfig {
    fn default() -> Self {
        Self {
            action: DesyncAction::EndMatch,
            grace_period_ticks: 1,
        }
    }
}

/// Per-room configuration: everything a Match Room needs once it has a
/// roster, independent of networking or matchmaking.
#[derive(Clone, Copy, Debug)]
pub struct RoomConfig {
    pub tick_rate: u32,
    pub countdown_seconds: u32,
    pub timeout_ticks: u32,
    pub disconnect_ticks: u32,
    pub reconnect_grace_period_ms: u64,
    pub max_tick_behind: u64,
    pub max_tick_ahead: u64,
    pub command_history_ticks: u64,
    pub validate_input_sequence: bool,
    pub enable_state_hashing: bool,
    pub desync: DesyncConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            countdown_seconds: 5,
            timeout_ticks: 40,
            disconnect_ticks: 100,
            reconnect_grace_period_ms: 30_000,
            max_tick_behind: 10,
            max_tick_ahead: 5,
            command_history_ticks: 200,
            validate_input_sequence: false,
            enable_state_hashing: false,
            desync: DesyncConfig::default(),
        }
    }
}

impl RoomConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate as f64)
    }

    /// `lagThreshold`/`disconnectThreshold`, converted from tick counts to
    /// real milliseconds using `tickRate`, per the Activity Tracker's rules.
    pub fn lag_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_ticks as f64 / self.tick_rate as f64)
    }

    pub fn disconnect_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.disconnect_ticks as f64 / self.tick_rate as f64)
    }

    pub fn reconnect_grace_period(&self) -> Duration {
        Duration::from_millis(self.reconnect_grace_period_ms)
    }

    fn from_env(mut self) -> Self {
        if let Ok(v) = std::env::var("ROOM_TICK_RATE") {
            if let Ok(v) = v.parse() {
                self.tick_rate = v;
            }
        }
        if let Ok(v) = std::env::var("ROOM_COUNTDOWN_SECONDS") {
            if let Ok(v) = v.parse() {
                self.countdown_seconds = v;
            }
        }
        if let Ok(v) = std::env::var("ROOM_TIMEOUT_TICKS") {
            if let Ok(v) = v.parse() {
                self.timeout_ticks = v;
            }
        }
        if let Ok(v) = std::env::var("ROOM_DISCONNECT_TICKS") {
            if let Ok(v) = v.parse() {
                self.disconnect_ticks = v;
            }
        }
        if let Ok(v) = std::env::var("ROOM_RECONNECT_GRACE_PERIOD_MS") {
            if let Ok(v) = v.parse() {
                self.reconnect_grace_period_ms = v;
            }
        }
        if let Ok(v) = std::env::var("ROOM_MAX_TICK_BEHIND") {
            if let Ok(v) = v.parse() {
                self.max_tick_behind = v;
            }
        }
        if let Ok(v) = std::env::var("ROOM_MAX_TICK_AHEAD") {
            if let Ok(v) = v.parse() {
                self.max_tick_ahead = v;
            }
        }
        if let Ok(v) = std::env::var("ROOM_COMMAND_HISTORY_TICKS") {
            if let Ok(v) = v.parse() {
                self.command_history_ticks = v;
            }
        }
        if let Ok(v) = std::env::var("ROOM_VALIDATE_INPUT_SEQUENCE") {
            self.validate_input_sequence = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("ROOM_ENABLE_STATE_HASHING") {
            self.enable_state_hashing = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("ROOM_DESYNC_ACTION") {
            if let Some(action) = DesyncAction::from_str(&v) {
                self.desync.action = action;
            }
        }
        if let Ok(v) = std::env::var("ROOM_DESYNC_GRACE_PERIOD_TICKS") {
            if let Ok(v) = v.parse() {
                self.desync.grace_period_ticks = v;
            }
        }
        self
    }
}

/// Matchmaker-level configuration: the game mode and the draining interval.
#[derive(Clone, Debug)]
pub struct MatchmakerConfig {
    pub game_mode: String,
    pub matchmaking_interval_ms: u64,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            game_mode: "1v1".to_string(),
            matchmaking_interval_ms: 1000,
        }
    }
}

impl MatchmakerConfig {
    pub fn matchmaking_interval(&self) -> Duration {
        Duration::from_millis(self.matchmaking_interval_ms)
    }

    fn from_env(mut self) -> Self {
        if let Ok(v) = std::env::var("MATCHMAKER_GAME_MODE") {
            self.game_mode = v;
        }
        if let Ok(v) = std::env::var("MATCHMAKER_INTERVAL_MS") {
            if let Ok(v) = v.parse() {
                self.matchmaking_interval_ms = v;
            }
        }
        self
    }
}

/// Top-level server configuration: networking plus the nested room and
/// matchmaker configuration it hands down to those subsystems.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub room: RoomConfig,
    pub matchmaker: MatchmakerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cors_allowed_origins: Vec::new(),
            room: RoomConfig::default(),
            matchmaker: MatchmakerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Build configuration from environment variables, falling back to the
    /// documented defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("PORT") {
            if let Ok(v) = v.parse() {
                config.port = v;
            }
        }
        if let Ok(v) = std::env::var("CORS_ALLOWED_ORIGINS") {
            config.cors_allowed_origins =
                v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        config.room = config.room.from_env();
        config.matchmaker = config.matchmaker.from_env();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_configuration_surface() {
        let room = RoomConfig::default();
        assert_eq!(room.tick_rate, 20);
        assert_eq!(room.countdown_seconds, 5);
        assert_eq!(room.timeout_ticks, 40);
        assert_eq!(room.disconnect_ticks, 100);
        assert_eq!(room.reconnect_grace_period_ms, 30_000);
        assert_eq!(room.max_tick_behind, 10);
        assert_eq!(room.max_tick_ahead, 5);
        assert_eq!(room.command_history_ticks, 200);
        assert!(!room.validate_input_sequence);
        assert!(!room.enable_state_hashing);
        assert_eq!(room.desync.action, DesyncAction::EndMatch);
        assert_eq!(room.desync.grace_period_ticks, 1);

        let matchmaker = MatchmakerConfig::default();
        assert_eq!(matchmaker.game_mode, "1v1");
        assert_eq!(matchmaker.matchmaking_interval_ms, 1000);
    }

    #[test]
    fn lag_and_disconnect_thresholds_convert_ticks_to_seconds() {
        let room = RoomConfig::default();
        assert_eq!(room.lag_threshold(), Duration::from_secs(2));
        assert_eq!(room.disconnect_threshold(), Duration::from_secs(5));
    }
}
