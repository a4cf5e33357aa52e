//! Network layer: wire protocol, authentication hook and the Connection
//! Gateway that ties them to the Matchmaker and Match Rooms.

pub mod auth;
pub mod gateway;
pub mod protocol;

pub use auth::{validate_token, AuthConfig, AuthError, TokenClaims};
pub use gateway::{Gateway, GatewayError};
pub use protocol::{ClientMessage, ServerMessage};
