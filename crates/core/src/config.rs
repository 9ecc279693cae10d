use std::time::Duration;

/// Client-side settings for a voice session.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// WebSocket address of the signaling relay.
    pub relay_url: String,
    /// Base address of the settings API (`/get-assistant`, `/get-tools`).
    pub settings_url: String,
    /// Keyword that ends the sleeping state. Matched case-insensitively.
    pub wake_keyword: String,
    /// Language the wake listener transcribes in.
    pub language: String,
    /// Phrase in the assistant's own speech that puts the session to sleep.
    pub sleep_phrase: String,
    /// Voice requested from the remote model.
    pub voice: String,
    /// Upper bound on the offer/answer round trip through the relay.
    pub signaling_timeout: Duration,
    /// Image shown by the show-QR tool when the model gives no address.
    pub qr_url: String,
    /// How long the QR image stays on screen.
    pub qr_display: Duration,
    /// Pause before the wake listener reopens an ended listening pass.
    pub wake_restart_delay: Duration,
    /// Upper bound on settings fetches and remote tool requests.
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:3002/ws".to_string(),
            settings_url: "http://localhost:3002".to_string(),
            wake_keyword: "рома".to_string(),
            language: "ru-RU".to_string(),
            sleep_phrase: "засыпаю".to_string(),
            voice: "alloy".to_string(),
            signaling_timeout: Duration::from_secs(15),
            qr_url: "/qr.png".to_string(),
            qr_display: Duration::from_secs(10),
            wake_restart_delay: Duration::from_millis(250),
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Whether `transcript` contains the configured sleep phrase.
    pub fn is_sleep_phrase(&self, transcript: &str) -> bool {
        let phrase = self.sleep_phrase.trim().to_lowercase();
        !phrase.is_empty() && transcript.to_lowercase().contains(&phrase)
    }
}
