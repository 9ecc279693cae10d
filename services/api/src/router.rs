//! Axum Router Configuration
//!
//! HTTP routing for the service: the REST routes, the signaling relay and the
//! OpenAPI documentation.

use crate::{
    handlers,
    models::{AssistantBody, ErrorResponse, HelloResponse, SaveResponse, SettingsBody, ToolsBody},
    state::AppState,
    ws::ws_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::hello,
        handlers::get_settings,
        handlers::save_settings,
        handlers::get_assistant,
        handlers::get_tools,
    ),
    components(
        schemas(SettingsBody, AssistantBody, ToolsBody, SaveResponse, HelloResponse, ErrorResponse)
    ),
    tags(
        (name = "Romabot API", description = "Settings and signaling relay for the Romabot voice assistant")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route(
            "/admin/settings",
            get(handlers::get_settings)
                .post(handlers::save_settings)
                .put(handlers::save_settings),
        )
        .route("/get-assistant", get(handlers::get_assistant))
        .route("/get-tools", get(handlers::get_tools))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health))
        .route("/api/hello", get(handlers::hello))
        .merge(api_router)
}
