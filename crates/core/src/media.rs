//! Media engine ports.
//!
//! The peer connection, the microphone and the side channel belong to the
//! host's real-time media stack. The session drives them through these traits
//! and receives their asynchronous events through a `MediaEventSink`.

use crate::runtime::{ClientInput, MediaEventSink};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("microphone capture failed: {0}")]
    Capture(String),
    #[error("session description negotiation failed: {0}")]
    Negotiation(String),
    #[error("side channel error: {0}")]
    Channel(String),
    #[error("connection error: {0}")]
    Connection(String),
}

/// Events raised by the media engine for a specific session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// The side channel is open and can carry events.
    ChannelOpen,
    /// A text frame arrived on the side channel.
    ChannelMessage(String),
    /// The side channel closed.
    ChannelClosed,
    /// The remote audio track started playing.
    RemoteAudio,
}

/// A live local audio source.
pub trait AudioTrack: Send {
    fn id(&self) -> &str;
    /// Releases the capture device. Calling it twice is harmless.
    fn stop(&mut self);
}

/// The outbound audio slot of the peer connection.
pub trait AudioSender: Send {
    /// Swaps the outbound track, returning the previous one. `None` sends silence.
    fn replace_track(
        &mut self,
        track: Option<Box<dyn AudioTrack>>,
    ) -> Result<Option<Box<dyn AudioTrack>>, MediaError>;
    fn has_live_track(&self) -> bool;
}

/// The ordered, reliable side channel carried next to the media.
pub trait DataChannel: Send {
    fn send(&mut self, text: &str) -> Result<(), MediaError>;
    fn close(&mut self) -> Result<(), MediaError>;
}

#[async_trait]
pub trait PeerConnection: Send {
    async fn add_audio_track(
        &mut self,
        track: Box<dyn AudioTrack>,
    ) -> Result<Box<dyn AudioSender>, MediaError>;
    fn create_data_channel(&mut self, label: &str) -> Result<Box<dyn DataChannel>, MediaError>;
    /// Creates the local offer, applies it as the local description and returns its SDP.
    async fn create_offer(&mut self) -> Result<String, MediaError>;
    async fn set_remote_answer(&mut self, sdp: &str) -> Result<(), MediaError>;
    fn close(&mut self) -> Result<(), MediaError>;
}

#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn capture_microphone(&self) -> Result<Box<dyn AudioTrack>, MediaError>;
    /// Creates a connection whose events are reported through `events`.
    fn create_peer_connection(
        &self,
        events: MediaEventSink,
    ) -> Result<Box<dyn PeerConnection>, MediaError>;
}

impl MediaEventSink {
    /// Reports an event for the session this sink was created for.
    ///
    /// Returns `false` once the client loop is gone.
    pub fn emit(&self, event: MediaEvent) -> bool {
        self.inputs
            .send(ClientInput::Media {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}
