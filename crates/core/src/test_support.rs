//! In-memory media, signaling and settings used by the session and runtime tests.

use crate::{
    config::ClientConfig,
    media::{
        AudioSender, AudioTrack, DataChannel, MediaEngine, MediaError, MediaEvent, PeerConnection,
    },
    registry::{LogQrPresenter, QrPresenter},
    runtime::{ClientInput, MediaEventSink, SessionHandle},
    session::{Collaborators, Session, SessionState, Trigger},
    settings::{SettingsError, SettingsSource},
    signaling::{SignalingChannel, SignalingConnector, SignalingError},
    tools::ToolDescriptor,
    wake::WakeDetector,
};
use async_trait::async_trait;
use serde_json::Value;
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::{Notify, mpsc, watch};

/// Records what the fakes were asked to do.
#[derive(Clone, Default)]
pub struct Journal {
    ops: Arc<Mutex<Vec<String>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    fn op(&self, op: impl Into<String>) {
        self.ops.lock().unwrap().push(op.into());
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    /// Side channel messages, parsed.
    pub fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }
}

struct FakeTrack {
    id: String,
    journal: Journal,
    stopped: bool,
}

impl AudioTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.journal.op(format!("track.stop {}", self.id));
        }
    }
}

struct FakeSender {
    track: Option<Box<dyn AudioTrack>>,
}

impl AudioSender for FakeSender {
    fn replace_track(
        &mut self,
        track: Option<Box<dyn AudioTrack>>,
    ) -> Result<Option<Box<dyn AudioTrack>>, MediaError> {
        Ok(std::mem::replace(&mut self.track, track))
    }

    fn has_live_track(&self) -> bool {
        self.track.is_some()
    }
}

struct FakeChannel {
    journal: Journal,
    fail_close: bool,
}

impl DataChannel for FakeChannel {
    fn send(&mut self, text: &str) -> Result<(), MediaError> {
        self.journal.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<(), MediaError> {
        self.journal.op("channel.close");
        if self.fail_close {
            return Err(MediaError::Channel("already closed".into()));
        }
        Ok(())
    }
}

struct FakeConnection {
    journal: Journal,
    fail_channel_close: bool,
}

#[async_trait]
impl PeerConnection for FakeConnection {
    async fn add_audio_track(
        &mut self,
        track: Box<dyn AudioTrack>,
    ) -> Result<Box<dyn AudioSender>, MediaError> {
        self.journal.op(format!("pc.add_track {}", track.id()));
        Ok(Box::new(FakeSender { track: Some(track) }))
    }

    fn create_data_channel(&mut self, label: &str) -> Result<Box<dyn DataChannel>, MediaError> {
        self.journal.op(format!("pc.data_channel {label}"));
        Ok(Box::new(FakeChannel {
            journal: self.journal.clone(),
            fail_close: self.fail_channel_close,
        }))
    }

    async fn create_offer(&mut self) -> Result<String, MediaError> {
        Ok("local-sdp".to_string())
    }

    async fn set_remote_answer(&mut self, sdp: &str) -> Result<(), MediaError> {
        self.journal.op(format!("pc.answer {sdp}"));
        Ok(())
    }

    fn close(&mut self) -> Result<(), MediaError> {
        self.journal.op("pc.close");
        Ok(())
    }
}

pub struct FakeMedia {
    journal: Journal,
    captures: AtomicUsize,
    fail_channel_close: bool,
    fail_recapture: bool,
    sink: Mutex<Option<MediaEventSink>>,
}

impl FakeMedia {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            captures: AtomicUsize::new(0),
            fail_channel_close: false,
            fail_recapture: false,
            sink: Mutex::new(None),
        }
    }

    /// Emits an event the way the host media stack would.
    pub fn emit(&self, event: MediaEvent) -> bool {
        match self.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }
}

#[async_trait]
impl MediaEngine for FakeMedia {
    async fn capture_microphone(&self) -> Result<Box<dyn AudioTrack>, MediaError> {
        let n = self.captures.fetch_add(1, Ordering::SeqCst) + 1;
        if n > 1 && self.fail_recapture {
            return Err(MediaError::Capture("permission revoked".into()));
        }
        Ok(Box::new(FakeTrack {
            id: format!("mic-{n}"),
            journal: self.journal.clone(),
            stopped: false,
        }))
    }

    fn create_peer_connection(
        &self,
        events: MediaEventSink,
    ) -> Result<Box<dyn PeerConnection>, MediaError> {
        *self.sink.lock().unwrap() = Some(events);
        Ok(Box::new(FakeConnection {
            journal: self.journal.clone(),
            fail_channel_close: self.fail_channel_close,
        }))
    }
}

#[derive(Clone)]
pub enum AnswerMode {
    Answer(String),
    /// Never answers.
    Hang,
    /// The relay accepts no connection.
    HangOnConnect,
    /// The relay drops the connection.
    Fail,
}

struct FakeSignaling {
    journal: Journal,
    mode: AnswerMode,
}

#[async_trait]
impl SignalingConnector for FakeSignaling {
    async fn connect(&self) -> Result<Box<dyn SignalingChannel>, SignalingError> {
        self.journal.op("signaling.connect");
        if matches!(self.mode, AnswerMode::HangOnConnect) {
            return std::future::pending().await;
        }
        Ok(Box::new(FakeSignalingChannel {
            journal: self.journal.clone(),
            mode: self.mode.clone(),
        }))
    }
}

struct FakeSignalingChannel {
    journal: Journal,
    mode: AnswerMode,
}

#[async_trait]
impl SignalingChannel for FakeSignalingChannel {
    async fn exchange(&mut self, offer_sdp: &str) -> Result<String, SignalingError> {
        self.journal.op(format!("signaling.offer {offer_sdp}"));
        match &self.mode {
            AnswerMode::Answer(sdp) => Ok(sdp.clone()),
            AnswerMode::Hang | AnswerMode::HangOnConnect => std::future::pending().await,
            AnswerMode::Fail => Err(SignalingError::Closed),
        }
    }

    async fn close(&mut self) -> Result<(), SignalingError> {
        self.journal.op("signaling.close");
        Ok(())
    }
}

pub struct StaticSettings {
    pub instructions: String,
    pub tools: Vec<ToolDescriptor>,
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn instructions(&self) -> Result<String, SettingsError> {
        Ok(self.instructions.clone())
    }

    async fn tools(&self) -> Result<Vec<ToolDescriptor>, SettingsError> {
        Ok(self.tools.clone())
    }
}

/// Fakes for every collaborator, with no speech engine.
pub fn collaborators(journal: &Journal, answer: AnswerMode) -> Collaborators {
    Collaborators {
        settings: Arc::new(StaticSettings {
            instructions: String::new(),
            tools: Vec::new(),
        }),
        signaling: Arc::new(FakeSignaling {
            journal: journal.clone(),
            mode: answer,
        }),
        media: Arc::new(FakeMedia::new(journal)),
        wake: WakeDetector::new(None, "рома", "ru-RU", Duration::from_millis(10)),
        qr: Arc::new(LogQrPresenter),
    }
}

/// A single session wired to fakes, outside of the client loop.
pub struct Harness {
    pub session: Session,
    pub journal: Journal,
    pub inputs: mpsc::UnboundedReceiver<ClientInput>,
    pub state_rx: watch::Receiver<SessionState>,
}

impl Harness {
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// A session that has negotiated and gone to sleep.
    pub async fn connected() -> Self {
        Self::builder().connected().await
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            answer: AnswerMode::Answer("remote-sdp".to_string()),
            fail_channel_close: false,
            fail_recapture: false,
            tools: Vec::new(),
            settings: None,
            qr: None,
            signaling_timeout: None,
        }
    }
}

pub struct HarnessBuilder {
    answer: AnswerMode,
    fail_channel_close: bool,
    fail_recapture: bool,
    tools: Vec<ToolDescriptor>,
    settings: Option<Arc<dyn SettingsSource>>,
    qr: Option<Arc<dyn QrPresenter>>,
    signaling_timeout: Option<Duration>,
}

impl HarnessBuilder {
    pub fn answer(mut self, answer: AnswerMode) -> Self {
        self.answer = answer;
        self
    }

    pub fn failing_channel_close(mut self) -> Self {
        self.fail_channel_close = true;
        self
    }

    /// The first capture succeeds and every later one fails.
    pub fn failing_recapture(mut self) -> Self {
        self.fail_recapture = true;
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn settings(mut self, settings: Arc<dyn SettingsSource>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn qr<P: QrPresenter + 'static>(mut self, qr: P) -> Self {
        self.qr = Some(Arc::new(qr));
        self
    }

    pub fn signaling_timeout(mut self, limit: Duration) -> Self {
        self.signaling_timeout = Some(limit);
        self
    }

    pub fn build(self) -> Harness {
        let journal = Journal::default();
        let mut deps = collaborators(&journal, self.answer);
        let mut media = FakeMedia::new(&journal);
        media.fail_channel_close = self.fail_channel_close;
        media.fail_recapture = self.fail_recapture;
        deps.media = Arc::new(media);
        deps.settings = self.settings.unwrap_or_else(|| {
            Arc::new(StaticSettings {
                instructions: String::new(),
                tools: self.tools,
            })
        });
        if let Some(qr) = self.qr {
            deps.qr = qr;
        }

        let mut config = ClientConfig::default();
        if let Some(limit) = self.signaling_timeout {
            config.signaling_timeout = limit;
        }

        let (inputs_tx, inputs) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let handle = SessionHandle::new(inputs_tx.clone(), state_rx.clone());
        let control = Arc::new(handle.control_for(1));
        let session = Session::new(1, config, deps, control, inputs_tx, Arc::new(state_tx));
        Harness {
            session,
            journal,
            inputs,
            state_rx,
        }
    }

    pub async fn connected(self) -> Harness {
        let mut harness = self.build();
        harness.session.apply(Trigger::Start).await;
        harness
            .session
            .handle_media_event(MediaEvent::ChannelOpen)
            .await;
        harness
    }
}

/// An HTTP address that accepts connections and never answers. The returned
/// `Notify` fires on each accepted connection.
pub async fn silent_endpoint() -> (String, Arc<Notify>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(Notify::new());
    let notify = accepted.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
            notify.notify_one();
        }
    });
    (format!("http://{addr}/slow"), accepted)
}
