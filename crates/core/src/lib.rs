//! Romabot Core
//!
//! Client-side realtime session protocol: the session state machine that
//! negotiates the media connection through the signaling relay, the tool-call
//! exchange carried over the side channel, and the sleep/wake cycle that mutes
//! the microphone until the wake keyword is heard.

pub mod calls;
pub mod config;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod signaling;
pub mod tools;
pub mod wake;

#[cfg(test)]
mod test_support;

pub use config::ClientConfig;
pub use runtime::{Client, ClientInput, SessionHandle};
pub use session::{Collaborators, Session, SessionState};
