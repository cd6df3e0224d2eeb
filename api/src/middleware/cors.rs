use axum::http::{HeaderName, HeaderValue, Method};
use relay_core::config::Settings;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Build a CORS layer from the configured origins.
///
/// - Origins: `RELAY_CORS_ORIGINS`, or `*` to allow any origin
/// - Methods: GET, POST, DELETE, OPTIONS
/// - Headers: Authorization, Content-Type
/// - Max age: 3600s
pub fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let allow_any = settings.allowed_origins.iter().any(|origin| origin == "*");

    let origin = if allow_any {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = settings
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse::<HeaderValue>().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    let layer = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
        ])
        .max_age(std::time::Duration::from_secs(3600));

    // Credentials cannot be combined with a wildcard origin
    if allow_any { layer } else { layer.allow_credentials(true) }
}
