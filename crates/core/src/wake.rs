//! Wake Detector
//!
//! Listens continuously through an external speech engine while the session
//! sleeps and fires once when the wake keyword is heard. Engines tend to end a
//! listening pass after a gap in the input, so the detector reopens passes for
//! as long as it is active.

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One result from the speech engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Interim(String),
    Final(String),
    Error(String),
}

/// A single listening pass. The stream ends when the engine ends the pass.
pub type RecognitionStream = BoxStream<'static, Recognition>;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("speech recognition is not available: {0}")]
    Unavailable(String),
    #[error("speech engine error: {0}")]
    Engine(String),
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn listen(&self, language: &str) -> Result<RecognitionStream, SpeechError>;
}

/// Starts wake listeners. Cheap to clone; each `start` yields an independent handle.
#[derive(Clone)]
pub struct WakeDetector {
    engine: Option<Arc<dyn SpeechEngine>>,
    keyword: String,
    language: String,
    restart_delay: Duration,
    unavailable_logged: Arc<AtomicBool>,
}

impl WakeDetector {
    /// Without an engine the detector degrades to a listener that never wakes.
    pub fn new(
        engine: Option<Arc<dyn SpeechEngine>>,
        keyword: &str,
        language: &str,
        restart_delay: Duration,
    ) -> Self {
        Self {
            engine,
            keyword: keyword.trim().to_lowercase(),
            language: language.to_string(),
            restart_delay,
            unavailable_logged: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Begins listening. `on_wake` runs at most once for the returned handle.
    pub fn start<F>(&self, on_wake: F) -> WakeHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let Some(engine) = self.engine.clone() else {
            self.report_unavailable("no speech engine configured");
            return WakeHandle { active, task: None };
        };

        let listener = Listener {
            engine,
            keyword: self.keyword.clone(),
            language: self.language.clone(),
            restart_delay: self.restart_delay,
            active: active.clone(),
            unavailable_logged: self.unavailable_logged.clone(),
        };
        let task = tokio::spawn(listener.run(Box::new(on_wake)));
        info!(keyword = %self.keyword, language = %self.language, "Wake listener started");
        WakeHandle {
            active,
            task: Some(task),
        }
    }

    fn report_unavailable(&self, reason: &str) {
        if !self.unavailable_logged.swap(true, Ordering::SeqCst) {
            warn!(reason, "Wake listener disabled; the session will not wake by voice");
        }
    }
}

/// A running wake listener. Dropping the handle stops it.
pub struct WakeHandle {
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WakeHandle {
    /// Stops listening. Safe to call more than once.
    pub fn stop(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!("Wake listener stopped");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for WakeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Listener {
    engine: Arc<dyn SpeechEngine>,
    keyword: String,
    language: String,
    restart_delay: Duration,
    active: Arc<AtomicBool>,
    unavailable_logged: Arc<AtomicBool>,
}

impl Listener {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn run(self, on_wake: Box<dyn FnOnce() + Send>) {
        let mut on_wake = Some(on_wake);
        while self.is_active() {
            match self.engine.listen(&self.language).await {
                Ok(mut pass) => {
                    while let Some(result) = pass.next().await {
                        if !self.is_active() {
                            return;
                        }
                        match result {
                            Recognition::Final(text) => {
                                let text = text.trim().to_lowercase();
                                debug!(%text, "Wake listener heard");
                                if text.contains(&self.keyword) {
                                    if let Some(callback) = on_wake.take() {
                                        info!("Wake keyword detected");
                                        callback();
                                    }
                                }
                            }
                            Recognition::Interim(_) => {}
                            Recognition::Error(error) => {
                                warn!(%error, "Wake listener recognition error");
                            }
                        }
                    }
                }
                Err(SpeechError::Unavailable(reason)) => {
                    if !self.unavailable_logged.swap(true, Ordering::SeqCst) {
                        warn!(%reason, "Wake listener disabled; the session will not wake by voice");
                    }
                    return;
                }
                Err(error) => {
                    if self.is_active() {
                        warn!(%error, "Failed to open a listening pass");
                    }
                }
            }
            if !self.is_active() {
                break;
            }
            debug!("Listening pass ended; restarting");
            tokio::time::sleep(self.restart_delay).await;
        }
    }
}
