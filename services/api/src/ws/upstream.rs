//! Outbound leg of the relay: trades an SDP offer for the model's answer.

use crate::config::Config;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request to realtime endpoint failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("realtime endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

pub struct RealtimeEndpoint {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl RealtimeEndpoint {
    pub fn from_config(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: config.realtime_url.clone(),
            model: config.realtime_model.clone(),
            api_key: config.openai_api_key.clone(),
        }
    }

    /// Posts the offer SDP and returns the answer SDP from the response body.
    pub async fn answer(&self, offer_sdp: &str) -> Result<String, UpstreamError> {
        debug!(bytes = offer_sdp.len(), model = %self.model, "Forwarding offer upstream");
        let response = self
            .http
            .post(&self.url)
            .query(&[("model", self.model.as_str())])
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/sdp")
            .header("OpenAI-Beta", "realtime=v1")
            .body(offer_sdp.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(UpstreamError::Status { status, body });
        }
        info!(bytes = body.len(), "Received answer from realtime endpoint");
        Ok(body)
    }
}
