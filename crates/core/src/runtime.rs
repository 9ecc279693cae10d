//! Client event loop.
//!
//! Every session input (user start/stop, media engine events, wake events,
//! sleep requests from tools) is queued on one channel and handled in order by
//! `Client::run`, so no two handlers ever run at the same time. While a
//! handler is waiting on the network or a device, the queue is still read:
//! `Stop` and `Shutdown` cancel the handler, everything else waits its turn.

use crate::{
    config::ClientConfig,
    media::MediaEvent,
    registry::{ControlError, SessionControl},
    session::{Collaborators, Session, SessionState, SleepCause, Trigger},
};
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Everything the client loop reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientInput {
    /// User asked to start talking.
    Start,
    /// User asked to stop.
    Stop,
    /// A tool of session `generation` asked it to sleep.
    Sleep { generation: u64 },
    /// An event from the media engine of session `generation`.
    Media { generation: u64, event: MediaEvent },
    /// The wake listener of session `generation` heard the keyword.
    Wake { generation: u64 },
    /// Stops the active session and ends the loop.
    Shutdown,
}

/// Routes media engine events back to the session that created the connection.
#[derive(Debug, Clone)]
pub struct MediaEventSink {
    pub(crate) generation: u64,
    pub(crate) inputs: mpsc::UnboundedSender<ClientInput>,
}

impl MediaEventSink {
    pub(crate) fn new(generation: u64, inputs: mpsc::UnboundedSender<ClientInput>) -> Self {
        Self { generation, inputs }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Cloneable front end for the client loop, used by the UI and by tools.
#[derive(Clone)]
pub struct SessionHandle {
    inputs: mpsc::UnboundedSender<ClientInput>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn new(
        inputs: mpsc::UnboundedSender<ClientInput>,
        state: watch::Receiver<SessionState>,
    ) -> Self {
        Self { inputs, state }
    }

    pub fn start(&self) -> bool {
        self.inputs.send(ClientInput::Start).is_ok()
    }

    pub fn stop(&self) -> bool {
        self.inputs.send(ClientInput::Stop).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.inputs.send(ClientInput::Shutdown).is_ok()
    }

    /// State of the current session, `Idle` before the first start.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// The control handed to the tools of session `generation`.
    pub(crate) fn control_for(&self, generation: u64) -> SessionPause {
        SessionPause {
            generation,
            inputs: self.inputs.clone(),
            state: self.state.clone(),
        }
    }
}

/// Lets a session's tools put that session, and only that one, to sleep.
pub struct SessionPause {
    generation: u64,
    inputs: mpsc::UnboundedSender<ClientInput>,
    state: watch::Receiver<SessionState>,
}

impl SessionControl for SessionPause {
    fn pause(&self) -> Result<(), ControlError> {
        if !self.state.borrow().is_active() {
            return Err(ControlError::NotReady);
        }
        self.inputs
            .send(ClientInput::Sleep {
                generation: self.generation,
            })
            .map_err(|_| ControlError::NotReady)
    }
}

/// Session work that may wait on the outside world.
enum Work {
    Trigger(Trigger),
    Media(MediaEvent),
}

impl Work {
    async fn run(self, session: &mut Session) {
        match self {
            Work::Trigger(trigger) => session.apply(trigger).await,
            Work::Media(event) => session.handle_media_event(event).await,
        }
    }
}

/// Owns the current session and processes inputs one at a time.
pub struct Client {
    config: ClientConfig,
    deps: Collaborators,
    inputs: mpsc::UnboundedReceiver<ClientInput>,
    state_tx: Arc<watch::Sender<SessionState>>,
    handle: SessionHandle,
    session: Option<Session>,
    generation: u64,
    deferred: VecDeque<ClientInput>,
}

impl Client {
    pub fn new(config: ClientConfig, deps: Collaborators) -> (Self, SessionHandle) {
        let (inputs_tx, inputs) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let handle = SessionHandle::new(inputs_tx, state_rx);
        let client = Self {
            config,
            deps,
            inputs,
            state_tx: Arc::new(state_tx),
            handle: handle.clone(),
            session: None,
            generation: 0,
            deferred: VecDeque::new(),
        };
        (client, handle)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Runs until `Shutdown` is received.
    pub async fn run(mut self) {
        loop {
            let input = match self.deferred.pop_front() {
                Some(input) => input,
                None => match self.inputs.recv().await {
                    Some(input) => input,
                    None => break,
                },
            };
            if !self.handle_input(input).await {
                break;
            }
        }
        info!("Client loop finished.");
    }

    /// Handles one input. Returns `false` once the loop should end.
    pub async fn handle_input(&mut self, input: ClientInput) -> bool {
        let (generation, work) = match input {
            ClientInput::Start => return self.start().await,
            ClientInput::Stop => {
                self.stop().await;
                return true;
            }
            ClientInput::Shutdown => {
                self.stop().await;
                return false;
            }
            ClientInput::Sleep { generation } => (
                generation,
                Work::Trigger(Trigger::Sleep(SleepCause::Tool)),
            ),
            ClientInput::Media { generation, event } => (generation, Work::Media(event)),
            ClientInput::Wake { generation } => (generation, Work::Trigger(Trigger::Wake)),
        };
        if self.current(generation).is_none() {
            return true;
        }
        self.drive(work).await
    }

    /// Handles every input already queued, without waiting for more.
    pub async fn drain(&mut self) {
        loop {
            let input = match self.deferred.pop_front() {
                Some(input) => input,
                None => match self.inputs.try_recv() {
                    Ok(input) => input,
                    Err(_) => break,
                },
            };
            if !self.handle_input(input).await {
                break;
            }
        }
    }

    /// Runs `work` on the current session while still reading the queue.
    /// `Stop` or `Shutdown` drops the work and tears the session down; other
    /// inputs are kept for after it. Returns `false` once the loop should end.
    async fn drive(&mut self, work: Work) -> bool {
        let Some(session) = self.session.as_mut() else {
            return true;
        };
        let inputs = &mut self.inputs;
        let deferred = &mut self.deferred;
        let interrupted = {
            let task = work.run(session);
            tokio::pin!(task);
            loop {
                tokio::select! {
                    _ = &mut task => break None,
                    input = inputs.recv() => match input {
                        Some(input @ (ClientInput::Stop | ClientInput::Shutdown)) => {
                            break Some(input);
                        }
                        Some(input) => deferred.push_back(input),
                        None => {
                            (&mut task).await;
                            break None;
                        }
                    },
                }
            }
        };

        let Some(input) = interrupted else {
            return true;
        };
        info!(?input, "Cancelling in-flight session work");
        // Everything deferred targeted the session being stopped.
        self.deferred.clear();
        self.stop().await;
        input != ClientInput::Shutdown
    }

    fn current(&mut self, generation: u64) -> Option<&mut Session> {
        match self.session.as_mut() {
            Some(session) if session.generation() == generation => Some(session),
            _ => {
                debug!(generation, "Dropping input for a session that is no longer current");
                None
            }
        }
    }

    async fn start(&mut self) -> bool {
        if let Some(session) = &self.session {
            if session.state() != SessionState::Stopped {
                info!(state = %session.state(), "Start ignored; a session is already running");
                return true;
            }
        }
        self.generation += 1;
        self.session = Some(Session::new(
            self.generation,
            self.config.clone(),
            self.deps.clone(),
            Arc::new(self.handle.control_for(self.generation)),
            self.handle.inputs.clone(),
            self.state_tx.clone(),
        ));
        self.drive(Work::Trigger(Trigger::Start)).await
    }

    async fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.apply(Trigger::Stop).await;
        }
    }
}
