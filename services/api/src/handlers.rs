//! Axum Handlers for the REST API
//!
//! Health and hello probes plus the settings routes the admin page and the
//! voice client read from.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{AssistantBody, ErrorResponse, HelloResponse, SaveResponse, SettingsBody, ToolsBody},
    state::AppState,
};

pub enum ApiError {
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "OK"
}

#[utoipa::path(
    get,
    path = "/api/hello",
    responses((status = 200, description = "Greeting", body = HelloResponse))
)]
pub async fn hello() -> Json<HelloResponse> {
    Json(HelloResponse {
        message: "Hello from romabot2 API!".to_string(),
    })
}

/// Read the whole settings document.
#[utoipa::path(
    get,
    path = "/admin/settings",
    responses(
        (status = 200, description = "Current settings", body = SettingsBody),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SettingsBody>, ApiError> {
    let settings = state.settings.load().await?;
    Ok(Json(settings.into()))
}

/// Replace the settings document. Tools without a name are dropped.
#[utoipa::path(
    post,
    path = "/admin/settings",
    request_body = SettingsBody,
    responses(
        (status = 200, description = "Settings saved", body = SaveResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn save_settings(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SettingsBody>,
) -> Result<Json<SaveResponse>, ApiError> {
    state.settings.save(payload.into()).await?;
    Ok(Json(SaveResponse { success: true }))
}

/// Instructions for the voice session.
#[utoipa::path(
    get,
    path = "/get-assistant",
    responses(
        (status = 200, description = "Assistant instructions", body = AssistantBody),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_assistant(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AssistantBody>, ApiError> {
    let settings = state.settings.load().await?;
    Ok(Json(AssistantBody {
        instructions: settings.instructions,
    }))
}

/// Tools the voice session declares to the model.
#[utoipa::path(
    get,
    path = "/get-tools",
    responses(
        (status = 200, description = "Configured tools", body = ToolsBody),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_tools(State(state): State<Arc<AppState>>) -> Result<Json<ToolsBody>, ApiError> {
    let settings = state.settings.load().await?;
    Ok(Json(ToolsBody {
        tools: settings.tools,
    }))
}
