use utoipa::OpenApi;
use voicebridge_api::router::ApiDoc;

/// Writes the OpenAPI document for the REST glue to the path given as the
/// first argument, or `openapi.json` in the working directory.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    std::fs::write(&path, ApiDoc::openapi().to_pretty_json()?)?;
    println!("Wrote {}", path);
    Ok(())
}
