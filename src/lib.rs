//! # Match Room Server
//!
//! Server-side core of a deterministic lockstep multiplayer engine: a
//! matchmaking queue feeds Match Rooms, each running a fixed-rate tick loop
//! that collects per-player command batches, orders them deterministically,
//! broadcasts them to every participant, and watches for state-hash
//! disagreement between clients.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MATCH ROOM SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  player.rs      - Player identity and roster entries         │
//! │  command.rs      - Opaque command payloads, total ordering   │
//! │  config.rs       - Room/Matchmaker/Server configuration       │
//! │  registry.rs     - Shared playerId/matchId -> Room lookup     │
//! │                                                                │
//! │  room/           - Per-match engine                          │
//! │  ├── room.rs          - Tick loop, phase state machine       │
//! │  ├── command_buffer.rs- In-flight per-tick submissions       │
//! │  ├── history.rs        - Finalized batches for reconnects     │
//! │  ├── activity.rs       - Lag/timeout detection                │
//! │  └── desync.rs         - State-hash agreement checking        │
//! │                                                                │
//! │  matchmaker.rs   - Queue draining, Room construction          │
//! │                                                                │
//! │  network/        - Wire protocol and connection handling      │
//! │  ├── gateway.rs  - WebSocket accept loop, message dispatch    │
//! │  ├── protocol.rs - Named JSON event types                     │
//! │  └── auth.rs     - External JWT validation hook               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## What this core does not do
//!
//! It never interprets a command's `data` payload, never runs game rules
//! (movement, combat, resource generation), and never authenticates tokens
//! itself beyond validating a signature and extracting a subject claim.
//! Those are the client simulation's and the external auth provider's jobs.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod command;
pub mod config;
pub mod matchmaker;
pub mod network;
pub mod player;
pub mod registry;
pub mod room;

pub use command::{order_commands, Command, SubmittedCommand};
pub use config::{DesyncAction, DesyncConfig, MatchmakerConfig, RoomConfig, ServerConfig};
pub use matchmaker::{Matchmaker, MatchmakerError, MatchmakerHandle};
pub use player::{Player, PlayerId};
pub use registry::Registry;
pub use room::{Room, RoomHandle, RoomPhase};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tick rate (Hz), per the configuration surface's `tickRate` default.
pub const DEFAULT_TICK_RATE: u32 = 20;
