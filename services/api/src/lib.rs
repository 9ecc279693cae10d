//! Romabot API Library Crate
//!
//! The web service behind the voice assistant: the `/ws` signaling relay that
//! trades SDP offers for answers with the realtime model, and the settings
//! routes holding the assistant instructions and tool list. The `api` binary
//! is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod settings;
pub mod state;
pub mod ws;
