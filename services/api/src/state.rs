//! Shared Application State

use crate::{config::Config, settings::SettingsStore, ws::upstream::RealtimeEndpoint};
use std::sync::Arc;

/// Created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: Arc<dyn SettingsStore>,
    pub upstream: Arc<RealtimeEndpoint>,
}

impl AppState {
    pub fn new(config: Config, settings: Arc<dyn SettingsStore>) -> Self {
        let upstream = Arc::new(RealtimeEndpoint::from_config(&config));
        Self {
            config: Arc::new(config),
            settings,
            upstream,
        }
    }
}
