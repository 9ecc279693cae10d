use romabot_api::router::ApiDoc;
use utoipa::OpenApi;

/// Writes the OpenAPI document of the REST routes.
///
/// Usage: `openapi [OUTPUT]`, defaulting to `openapi.json`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    std::fs::write(&path, ApiDoc::openapi().to_pretty_json()?)?;
    println!("Wrote {path}");
    Ok(())
}
