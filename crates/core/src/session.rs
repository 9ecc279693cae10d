//! Session State Machine
//!
//! One `Session` value lives from a user start until stop. Its lifecycle is
//! driven by the pure `transition` table below: each trigger either moves the
//! session to a new state and yields the effects to run, or is ignored.
//!
//! ```text
//! Idle -> LoadingConfig -> Connecting -> Awake <-> Sleeping
//!   any non-Stopped state --stop--> Stopped
//!   Connecting --signaling timeout--> Stopped
//! ```

use crate::{
    calls::{CallTracker, PendingCall},
    config::ClientConfig,
    media::{AudioSender, DataChannel, MediaEngine, MediaError, MediaEvent, PeerConnection},
    protocol::{ClientEvent, SIDE_CHANNEL_LABEL, ServerEvent, SessionUpdate},
    registry::{QrPresenter, QrSettings, SessionControl, ToolRegistry},
    runtime::{ClientInput, MediaEventSink},
    settings::{HttpSettingsSource, SettingsSource},
    signaling::{SignalingChannel, SignalingConnector, SignalingError, WsSignalingConnector},
    tools::normalize_tools,
    wake::{SpeechEngine, WakeDetector, WakeHandle},
};
use anyhow::Context;
use serde::Serialize;
use std::{fmt, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, timeout_at},
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Idle,
    LoadingConfig,
    Connecting,
    Awake,
    Sleeping,
    Stopped,
}

impl SessionState {
    /// Whether the session has a connected model (awake or sleeping).
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Awake | SessionState::Sleeping)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::LoadingConfig => "loading-config",
            SessionState::Connecting => "connecting",
            SessionState::Awake => "awake",
            SessionState::Sleeping => "sleeping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepCause {
    /// The model called the sleep tool.
    Tool,
    /// The model said the sleep phrase.
    Phrase,
    /// Sessions start asleep once the side channel opens.
    Startup,
    /// Waking failed to capture the microphone.
    MicrophoneUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Start,
    ConfigLoaded,
    ChannelOpened,
    Sleep(SleepCause),
    Wake,
    SignalingTimedOut,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    LoadConfig,
    Connect,
    SendSessionUpdate,
    EnterSleep,
    DetachMicrophone,
    StartWakeListener,
    StopWakeListener,
    AttachMicrophone,
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionState,
    pub effects: Vec<Effect>,
}

/// The lifecycle table. `None` means the trigger is ignored in `state`.
pub fn transition(state: SessionState, trigger: Trigger) -> Option<Transition> {
    use SessionState::*;
    let (next, effects) = match (state, trigger) {
        (Idle, Trigger::Start) => (LoadingConfig, vec![Effect::LoadConfig]),
        (LoadingConfig, Trigger::ConfigLoaded) => (Connecting, vec![Effect::Connect]),
        (Connecting, Trigger::ChannelOpened) => {
            (Awake, vec![Effect::SendSessionUpdate, Effect::EnterSleep])
        }
        (Awake, Trigger::Sleep(_)) => (
            Sleeping,
            vec![Effect::DetachMicrophone, Effect::StartWakeListener],
        ),
        (Sleeping, Trigger::Wake) => (
            Awake,
            vec![Effect::StopWakeListener, Effect::AttachMicrophone],
        ),
        (Connecting, Trigger::SignalingTimedOut) => (Stopped, vec![Effect::Teardown]),
        (Stopped, Trigger::Stop) => return None,
        (_, Trigger::Stop) => (Stopped, vec![Effect::Teardown]),
        _ => return None,
    };
    Some(Transition { next, effects })
}

/// External services a session works with.
#[derive(Clone)]
pub struct Collaborators {
    pub settings: Arc<dyn SettingsSource>,
    pub signaling: Arc<dyn SignalingConnector>,
    pub media: Arc<dyn MediaEngine>,
    pub wake: WakeDetector,
    pub qr: Arc<dyn QrPresenter>,
}

impl Collaborators {
    /// Settings and signaling over the network as described by `config`;
    /// media, speech and QR display supplied by the host.
    pub fn networked(
        config: &ClientConfig,
        media: Arc<dyn MediaEngine>,
        speech: Option<Arc<dyn SpeechEngine>>,
        qr: Arc<dyn QrPresenter>,
    ) -> Self {
        Self {
            settings: Arc::new(
                HttpSettingsSource::new(config.settings_url.as_str())
                    .with_timeout(config.http_timeout),
            ),
            signaling: Arc::new(WsSignalingConnector::new(config.relay_url.as_str())),
            media,
            wake: WakeDetector::new(
                speech,
                &config.wake_keyword,
                &config.language,
                config.wake_restart_delay,
            ),
            qr,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ConnectError {
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error("no answer from the signaling relay within {0:?}")]
    Timeout(Duration),
    #[error("connection resources were released during setup")]
    Released,
}

pub struct Session {
    generation: u64,
    state: SessionState,
    config: ClientConfig,
    deps: Collaborators,
    control: Arc<dyn SessionControl>,
    inputs: mpsc::UnboundedSender<ClientInput>,
    state_tx: Arc<watch::Sender<SessionState>>,

    instructions: String,
    tools: Option<ToolRegistry>,

    signaling: Option<Box<dyn SignalingChannel>>,
    connection: Option<Box<dyn PeerConnection>>,
    channel: Option<Box<dyn DataChannel>>,
    audio: Option<Box<dyn AudioSender>>,
    wake: Option<WakeHandle>,

    calls: CallTracker,
    speaking: bool,
    log: Vec<String>,
}

impl Session {
    pub fn new(
        generation: u64,
        config: ClientConfig,
        deps: Collaborators,
        control: Arc<dyn SessionControl>,
        inputs: mpsc::UnboundedSender<ClientInput>,
        state_tx: Arc<watch::Sender<SessionState>>,
    ) -> Self {
        state_tx.send_replace(SessionState::Idle);
        Self {
            generation,
            state: SessionState::Idle,
            config,
            deps,
            control,
            inputs,
            state_tx,
            instructions: String::new(),
            tools: None,
            signaling: None,
            connection: None,
            channel: None,
            audio: None,
            wake: None,
            calls: CallTracker::default(),
            speaking: false,
            log: Vec::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Human-readable session log, oldest first.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Whether the remote model is currently playing audio.
    pub fn speaking(&self) -> bool {
        self.speaking
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> Option<&ToolRegistry> {
        self.tools.as_ref()
    }

    pub fn pending_call(&self) -> Option<&PendingCall> {
        self.calls.pending()
    }

    pub fn has_wake_listener(&self) -> bool {
        self.wake.is_some()
    }

    pub fn has_live_track(&self) -> bool {
        self.audio.as_ref().is_some_and(|a| a.has_live_track())
    }

    /// Whether any connection resource is still held.
    pub fn holds_resources(&self) -> bool {
        self.signaling.is_some()
            || self.connection.is_some()
            || self.channel.is_some()
            || self.audio.is_some()
            || self.wake.is_some()
    }

    /// Feeds a trigger through the lifecycle table, running effects and any
    /// triggers they produce.
    pub async fn apply(&mut self, trigger: Trigger) {
        let mut pending = Some(trigger);
        while let Some(trigger) = pending.take() {
            let Some(step) = transition(self.state, trigger) else {
                self.note(format!("Ignoring {trigger:?} while {}", self.state));
                continue;
            };
            self.set_state(step.next);
            for effect in step.effects {
                if let Some(follow_up) = self.perform(effect).await {
                    pending = Some(follow_up);
                }
            }
        }
    }

    pub async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::ChannelOpen => {
                self.note("Side channel open");
                self.apply(Trigger::ChannelOpened).await;
            }
            MediaEvent::ChannelMessage(raw) => self.handle_server_event(&raw).await,
            MediaEvent::ChannelClosed => self.note("Side channel closed"),
            MediaEvent::RemoteAudio => self.note("Remote audio track received"),
        }
    }

    async fn handle_server_event(&mut self, raw: &str) {
        let event: ServerEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "Ignoring unparseable side channel message");
                return;
            }
        };

        match event {
            ServerEvent::OutputItemAdded { item } => {
                if let Some((call_id, name)) = item.as_function_call() {
                    self.note(format!("Tool call '{name}' opened ({call_id})"));
                    self.calls.open(call_id, name);
                }
            }
            ServerEvent::FunctionCallArgumentsDelta { delta, .. } => {
                if !self.calls.append(&delta) {
                    debug!("Dropping argument fragment with no open call");
                }
            }
            ServerEvent::FunctionCallArgumentsDone { .. } => self.complete_call().await,
            ServerEvent::AudioTranscriptDone { transcript } => {
                self.note(format!("Assistant: {transcript}"));
                if self.config.is_sleep_phrase(&transcript) {
                    self.apply(Trigger::Sleep(SleepCause::Phrase)).await;
                }
            }
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                self.note(format!("User: {transcript}"));
            }
            ServerEvent::OutputAudioStarted {} => self.speaking = true,
            ServerEvent::OutputAudioStopped {} => self.speaking = false,
            ServerEvent::Error { error } => {
                self.warn(format!("Model error: {}", error.message));
            }
            ServerEvent::AudioTranscriptDelta { .. } | ServerEvent::Other => {}
        }
    }

    async fn complete_call(&mut self) {
        let Some(call) = self.calls.complete() else {
            debug!("Ignoring call completion with no pending call");
            return;
        };
        if let Err(e) = self.run_call(&call).await {
            self.warn(format!(
                "Tool call '{}' ({}) failed: {e:#}",
                call.name, call.call_id
            ));
        }
    }

    async fn run_call(&mut self, call: &PendingCall) -> anyhow::Result<()> {
        let args = call.arguments()?;
        self.note(format!("Calling tool '{}' with {args}", call.name));

        let registry = self.tools.as_ref().context("tool registry is not loaded")?;
        let output = registry.invoke(&call.name, args).await?;
        let output = serde_json::to_string(&output)?;

        self.send_event(&ClientEvent::function_call_output(&call.call_id, output))?;
        self.send_event(&ClientEvent::ResponseCreate {})?;
        self.note(format!("Tool call '{}' answered", call.name));
        Ok(())
    }

    async fn perform(&mut self, effect: Effect) -> Option<Trigger> {
        match effect {
            Effect::LoadConfig => {
                self.load_config().await;
                return Some(Trigger::ConfigLoaded);
            }
            Effect::Connect => match self.establish().await {
                Ok(()) => self.note("Answer applied; waiting for the side channel"),
                Err(ConnectError::Timeout(limit)) => {
                    self.warn(format!("No answer within {limit:?}; stopping"));
                    return Some(Trigger::SignalingTimedOut);
                }
                Err(e) => self.warn(format!("Connection setup failed: {e}")),
            },
            Effect::SendSessionUpdate => {
                let functions = self
                    .tools
                    .as_ref()
                    .map(ToolRegistry::functions)
                    .unwrap_or_default();
                let update = SessionUpdate::new(
                    self.instructions.clone(),
                    self.config.voice.clone(),
                    functions,
                );
                match self.send_event(&ClientEvent::SessionUpdate { session: update }) {
                    Ok(()) => self.note("Session configuration sent"),
                    Err(e) => self.warn(format!("Failed to send session configuration: {e:#}")),
                }
            }
            Effect::EnterSleep => return Some(Trigger::Sleep(SleepCause::Startup)),
            Effect::DetachMicrophone => self.detach_microphone(),
            Effect::StartWakeListener => self.start_wake_listener(),
            Effect::StopWakeListener => {
                if let Some(mut wake) = self.wake.take() {
                    wake.stop();
                }
            }
            Effect::AttachMicrophone => {
                if !self.attach_microphone().await {
                    return Some(Trigger::Sleep(SleepCause::MicrophoneUnavailable));
                }
            }
            Effect::Teardown => self.teardown().await,
        }
        None
    }

    async fn load_config(&mut self) {
        let settings = self.deps.settings.clone();
        let instructions = match settings.instructions().await {
            Ok(instructions) => instructions,
            Err(e) => {
                self.warn(format!("Failed to load instructions: {e}"));
                String::new()
            }
        };
        let tools = match settings.tools().await {
            Ok(tools) => tools,
            Err(e) => {
                self.warn(format!("Failed to load tools: {e}"));
                Vec::new()
            }
        };

        let tools = normalize_tools(tools);
        self.note(format!("Loaded {} tools", tools.len()));
        self.instructions = instructions;
        self.tools = Some(ToolRegistry::new(
            tools,
            self.control.clone(),
            self.deps.qr.clone(),
            QrSettings {
                default_url: self.config.qr_url.clone(),
                display: self.config.qr_display,
            },
        )
        .with_timeout(self.config.http_timeout));
    }

    /// Opens signaling, builds the peer connection and completes the
    /// offer/answer exchange. Handles are stored as soon as they exist so a
    /// later stop can release them.
    ///
    /// Connecting to the relay and waiting for the answer share one deadline.
    async fn establish(&mut self) -> Result<(), ConnectError> {
        let media = self.deps.media.clone();
        let connector = self.deps.signaling.clone();
        let limit = self.config.signaling_timeout;
        let deadline = Instant::now() + limit;

        let signaling = timeout_at(deadline, connector.connect())
            .await
            .map_err(|_| ConnectError::Timeout(limit))??;
        self.signaling = Some(signaling);
        self.note("Signaling connected");

        let sink = MediaEventSink::new(self.generation, self.inputs.clone());
        self.connection = Some(media.create_peer_connection(sink)?);

        let track = media.capture_microphone().await?;
        self.note(format!("Microphone captured ({})", track.id()));

        let connection = self.connection.as_mut().ok_or(ConnectError::Released)?;
        let audio = connection.add_audio_track(track).await?;
        let channel = connection.create_data_channel(SIDE_CHANNEL_LABEL)?;
        let offer = connection.create_offer().await?;
        self.audio = Some(audio);
        self.channel = Some(channel);
        self.note("Offer created; sending to relay");

        let signaling = self.signaling.as_mut().ok_or(ConnectError::Released)?;
        let answer = timeout_at(deadline, signaling.exchange(&offer))
            .await
            .map_err(|_| ConnectError::Timeout(limit))??;
        self.note("Received answer");

        let connection = self.connection.as_mut().ok_or(ConnectError::Released)?;
        connection.set_remote_answer(&answer).await?;
        Ok(())
    }

    fn detach_microphone(&mut self) {
        let Some(audio) = self.audio.as_mut() else {
            return;
        };
        match audio.replace_track(None) {
            Ok(Some(mut track)) => {
                track.stop();
                self.note("Microphone detached");
            }
            Ok(None) => {}
            Err(e) => self.warn(format!("Failed to detach microphone: {e}")),
        }
    }

    /// Returns `false` when no live track could be attached.
    async fn attach_microphone(&mut self) -> bool {
        let media = self.deps.media.clone();
        let track = match media.capture_microphone().await {
            Ok(track) => track,
            Err(e) => {
                self.warn(format!("Failed to capture microphone: {e}"));
                return false;
            }
        };
        let id = track.id().to_string();
        let Some(audio) = self.audio.as_mut() else {
            self.warn("No audio sender to attach the microphone to");
            return false;
        };
        match audio.replace_track(Some(track)) {
            Ok(previous) => {
                if let Some(mut previous) = previous {
                    previous.stop();
                }
                self.note(format!("Microphone attached ({id})"));
                true
            }
            Err(e) => {
                self.warn(format!("Failed to attach microphone: {e}"));
                false
            }
        }
    }

    fn start_wake_listener(&mut self) {
        if self.wake.is_some() {
            debug!("Wake listener already running");
            return;
        }
        let inputs = self.inputs.clone();
        let generation = self.generation;
        self.wake = Some(self.deps.wake.start(move || {
            let _ = inputs.send(ClientInput::Wake { generation });
        }));
        self.note("Sleeping; say the wake word to continue");
    }

    /// Releases everything the session holds. Each step runs even when an
    /// earlier one fails.
    async fn teardown(&mut self) {
        if let Some(mut wake) = self.wake.take() {
            wake.stop();
        }
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close() {
                self.warn(format!("Failed to close side channel: {e}"));
            }
        }
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                self.warn(format!("Failed to close connection: {e}"));
            }
        }
        if let Some(mut audio) = self.audio.take() {
            if let Ok(Some(mut track)) = audio.replace_track(None) {
                track.stop();
            }
        }
        if let Some(mut signaling) = self.signaling.take() {
            if let Err(e) = signaling.close().await {
                self.warn(format!("Failed to close signaling: {e}"));
            }
        }
        self.calls.clear();
        self.speaking = false;
        self.note("Session stopped");
    }

    fn send_event(&mut self, event: &ClientEvent) -> anyhow::Result<()> {
        let text = serde_json::to_string(event)?;
        let channel = self.channel.as_mut().context("side channel is not open")?;
        channel.send(&text)?;
        Ok(())
    }

    fn set_state(&mut self, next: SessionState) {
        let previous = self.state;
        self.state = next;
        self.state_tx.send_replace(next);
        info!(generation = self.generation, from = %previous, to = %next, "Session state changed");
    }

    fn note(&mut self, line: impl Into<String>) {
        let line = line.into();
        info!(generation = self.generation, "{line}");
        self.log.push(line);
    }

    fn warn(&mut self, line: impl Into<String>) {
        let line = line.into();
        warn!(generation = self.generation, "{line}");
        self.log.push(line);
    }
}
