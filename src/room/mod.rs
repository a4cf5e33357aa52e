//! Match Room subsystem: the per-match tick loop, command buffer/history,
//! activity tracking and desync detection.

pub mod activity;
pub mod command_buffer;
pub mod desync;
pub mod history;
#[allow(clippy::module_inception)]
pub mod room;

pub use activity::{ActivityEvent, ActivityTracker};
pub use command_buffer::CommandBuffer;
pub use desync::{DesyncDetector, DesyncOutcome};
pub use history::CommandHistory;
pub use room::{MatchId, PlayerSeat, ReconnectResult, Room, RoomEvent, RoomFinished, RoomHandle, RoomPhase, SubmitResult};
