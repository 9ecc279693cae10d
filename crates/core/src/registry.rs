//! Tool Registry
//!
//! Resolves a tool name to its action: one of the built-ins executed by the
//! client, or an HTTP request to the endpoint named in the tool's dispatch
//! metadata. Built-ins reach the session through an injected `SessionControl`.

use crate::tools::{
    DispatchKind, FunctionDefinition, HttpMethod, SHOW_QR_TOOL, SLEEP_TOOL, ShowQrArgs,
    ToolDescriptor,
};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("tool '{0}' is marked local but has no built-in action")]
    NoLocalAction(String),
    #[error("tool '{0}' has no endpoint configured")]
    MissingEndpoint(String),
    #[error("malformed arguments for tool '{name}': {source}")]
    MalformedArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("arguments for tool '{0}' are not a JSON object")]
    ArgumentsNotObject(String),
    #[error("request to '{endpoint}' failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("no session is ready")]
    NotReady,
}

/// The session operations built-in tools are allowed to trigger.
#[cfg_attr(test, mockall::automock)]
pub trait SessionControl: Send + Sync {
    /// Requests the `Awake -> Sleeping` transition.
    fn pause(&self) -> Result<(), ControlError>;
}

/// Displays the QR image.
#[cfg_attr(test, mockall::automock)]
pub trait QrPresenter: Send + Sync {
    fn present(&self, url: &str, duration: Duration);
}

/// Presenter for headless runs: records the request in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogQrPresenter;

impl QrPresenter for LogQrPresenter {
    fn present(&self, url: &str, duration: Duration) {
        info!(%url, seconds = duration.as_secs(), "Showing QR image");
    }
}

/// Settings for the show-QR built-in.
#[derive(Debug, Clone)]
pub struct QrSettings {
    pub default_url: String,
    pub display: Duration,
}

/// A `reqwest` client whose requests fail after `limit`.
pub(crate) fn http_client(limit: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(limit)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to an HTTP client without a timeout");
            reqwest::Client::new()
        })
}

pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    http: reqwest::Client,
    control: Arc<dyn SessionControl>,
    qr: Arc<dyn QrPresenter>,
    qr_settings: QrSettings,
}

impl ToolRegistry {
    /// Creates a registry over an already normalized tool list.
    pub fn new(
        tools: Vec<ToolDescriptor>,
        control: Arc<dyn SessionControl>,
        qr: Arc<dyn QrPresenter>,
        qr_settings: QrSettings,
    ) -> Self {
        Self {
            tools,
            http: reqwest::Client::new(),
            control,
            qr,
            qr_settings,
        }
    }

    /// Bounds every remote tool request by `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.http = http_client(limit);
        self
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// The tool list as declared to the remote model.
    pub fn functions(&self) -> Vec<FunctionDefinition> {
        self.tools.iter().map(ToolDescriptor::to_function).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Runs the named tool with already parsed arguments.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        match name {
            SHOW_QR_TOOL => self.show_qr(args),
            SLEEP_TOOL => Ok(self.sleep()),
            _ => {
                let tool = self
                    .get(name)
                    .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
                match tool.dispatch.kind {
                    DispatchKind::Local => Err(ToolError::NoLocalAction(name.to_string())),
                    DispatchKind::Remote => self.invoke_remote(tool, args).await,
                }
            }
        }
    }

    fn show_qr(&self, args: Value) -> Result<Value, ToolError> {
        let args: ShowQrArgs =
            serde_json::from_value(args).map_err(|source| ToolError::MalformedArguments {
                name: SHOW_QR_TOOL.to_string(),
                source,
            })?;
        let url = args
            .qr_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.qr_settings.default_url.clone());
        self.qr.present(&url, self.qr_settings.display);
        Ok(json!({ "ok": true }))
    }

    fn sleep(&self) -> Value {
        match self.control.pause() {
            Ok(()) => json!({ "ok": true }),
            Err(ControlError::NotReady) => json!({ "ok": false, "error": "not_ready" }),
        }
    }

    async fn invoke_remote(&self, tool: &ToolDescriptor, args: Value) -> Result<Value, ToolError> {
        let endpoint = tool
            .dispatch
            .endpoint()
            .ok_or_else(|| ToolError::MissingEndpoint(tool.name.clone()))?;
        let method = tool.dispatch.method.unwrap_or_default();
        info!(tool = %tool.name, %endpoint, ?method, "Dispatching remote tool call");

        let http_err = |source| ToolError::Http {
            endpoint: endpoint.to_string(),
            source,
        };
        let request = match method {
            HttpMethod::Get => self.http.get(endpoint),
            HttpMethod::Post => self.http.post(endpoint).json(&args),
        };
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?;
        let body = response.text().await.map_err(http_err)?;

        // A body that is not JSON is passed back as a plain string.
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}
