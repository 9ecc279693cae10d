//! WebSocket signaling relay.
//!
//! - `relay`: per-connection loop and message routing.
//! - `upstream`: HTTP exchange with the realtime model endpoint.

pub mod relay;
pub mod upstream;

pub use relay::ws_handler;
