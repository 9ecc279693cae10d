//! Assistant settings: the instructions text and the configured tool list.

use crate::tools::ToolDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the settings store persists.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

impl Settings {
    /// Drops tools without a name and trims names and endpoints.
    pub fn sanitized(mut self) -> Self {
        self.tools.retain(|t| !t.name.trim().is_empty());
        for tool in &mut self.tools {
            tool.name = tool.name.trim().to_string();
            tool.description = tool.description.trim().to_string();
            if let Some(endpoint) = tool.dispatch.endpoint.take() {
                let endpoint = endpoint.trim();
                if !endpoint.is_empty() {
                    tool.dispatch.endpoint = Some(endpoint.to_string());
                }
            }
        }
        self
    }
}

/// Body of `GET /get-assistant`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AssistantSettings {
    #[serde(default)]
    pub instructions: String,
}

/// Body of `GET /get-tools`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ToolSettings {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Where the session reads its configuration from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn instructions(&self) -> Result<String, SettingsError>;
    async fn tools(&self) -> Result<Vec<ToolDescriptor>, SettingsError>;
}

/// Reads settings from the API server.
pub struct HttpSettingsSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSettingsSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Bounds each settings request by `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.http = crate::registry::http_client(limit);
        self
    }
}

#[async_trait]
impl SettingsSource for HttpSettingsSource {
    async fn instructions(&self) -> Result<String, SettingsError> {
        let body: AssistantSettings = self
            .http
            .get(format!("{}/get-assistant", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.instructions)
    }

    async fn tools(&self) -> Result<Vec<ToolDescriptor>, SettingsError> {
        let body: ToolSettings = self
            .http
            .get(format!("{}/get-tools", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.tools)
    }
}
