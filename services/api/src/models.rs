//! API Models
//!
//! Request and response bodies of the REST routes, with `utoipa` schemas for
//! the OpenAPI document.

use romabot_core::{settings::Settings, tools::ToolDescriptor};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The full settings document edited by the admin page.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default)]
pub struct SettingsBody {
    #[serde(default)]
    #[schema(example = "Ты голосовой помощник Рома.")]
    pub instructions: String,
    /// Tools as `{name, description, parameters, meta}`.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub tools: Vec<ToolDescriptor>,
}

impl From<Settings> for SettingsBody {
    fn from(settings: Settings) -> Self {
        Self {
            instructions: settings.instructions,
            tools: settings.tools,
        }
    }
}

impl From<SettingsBody> for Settings {
    fn from(body: SettingsBody) -> Self {
        Self {
            instructions: body.instructions,
            tools: body.tools,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AssistantBody {
    pub instructions: String,
}

#[derive(Serialize, ToSchema)]
pub struct ToolsBody {
    #[schema(value_type = Vec<Object>)]
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Serialize, ToSchema)]
pub struct SaveResponse {
    pub success: bool,
}

#[derive(Serialize, ToSchema)]
pub struct HelloResponse {
    #[schema(example = "Hello from romabot2 API!")]
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
