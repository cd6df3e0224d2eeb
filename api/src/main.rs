use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use relay_core::config::{Settings, parse_auth_storage_config};

mod auth;
mod error;
mod middleware;
mod routes;
mod services;
mod state;
mod store;
mod tools;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Relay Agent Backend",
        version = "0.1.0",
        description = "Backend template for AI agents: JWT auth, pluggable session, \
                       memory and artifact storage, and a declarative tool registry \
                       proxying external APIs and MCP servers."
    ),
    paths(
        routes::system::health_check,
        routes::system::info,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::logout,
        routes::sessions::create_session,
        routes::sessions::list_sessions,
        routes::sessions::get_session,
        routes::sessions::delete_session,
        routes::sessions::append_event,
        routes::sessions::archive_session,
        routes::memory::search_memory,
        routes::artifacts::upload_artifact,
        routes::artifacts::list_artifacts,
        routes::artifacts::download_artifact,
        routes::artifacts::delete_artifact,
        routes::tools::list_tools,
        routes::tools::tool_spec,
    ),
    components(schemas(
        relay_core::error::ApiError,
        routes::system::HealthResponse,
        routes::system::InfoResponse,
        routes::auth::RegisterRequest,
        routes::auth::LoginRequest,
        routes::auth::AuthResponse,
        routes::auth::UserResponse,
        routes::auth::LogoutResponse,
        services::session::Session,
        services::session::SessionEvent,
        routes::sessions::SessionWithEvents,
        routes::sessions::AppendEventRequest,
        routes::sessions::ArchiveResponse,
        services::memory::MemoryHit,
        routes::memory::SearchResponse,
        routes::artifacts::Namespace,
        routes::artifacts::UploadResponse,
        routes::artifacts::ArtifactSummary,
        tools::registry::ToolSummary,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let settings = Settings::from_env().expect("invalid RELAY_* configuration");
    if settings.jwt_secret == "change-this-in-production" {
        tracing::warn!("RELAY_JWT_SECRET is the default value; set a real secret in production");
    }

    let services_config = settings
        .services_config()
        .expect("invalid service configuration");

    // Auth storage
    let auth_config = parse_auth_storage_config(
        &settings.auth_storage_type,
        &settings.auth_database_url,
        &services_config.session,
    )
    .expect("invalid auth storage configuration");

    let auth_store = store::select_store(&auth_config)
        .await
        .expect("failed to open auth storage");
    let auth_service = Arc::new(auth::AuthService::new(
        auth_store,
        settings.jwt_secret.clone(),
        settings.token_ttl_days,
    ));
    auth_service
        .init()
        .await
        .expect("failed to initialize auth storage");

    // Backend services
    let sessions = services::ServiceFactory::create_session_store(&services_config.session)
        .await
        .expect("failed to create session store");
    let memory = services::ServiceFactory::create_memory_service(&services_config.memory);
    let artifacts = services::ServiceFactory::create_artifact_store(&services_config.artifact)
        .await
        .expect("failed to create artifact store");

    // Tool registry
    let tool_registry = Arc::new(tools::ToolRegistry::new());
    if let Some(path) = &settings.tools_config_path {
        tool_registry
            .load_file(Path::new(path))
            .expect("failed to load RELAY_TOOLS_CONFIG");
    }
    let spec_cache = Arc::new(tools::SpecCache::new(settings.spec_cache_dir.clone()));

    for (service, backend) in services_config.summary() {
        tracing::info!(service, backend = %backend, "service configured");
    }
    tracing::info!(
        agent = %settings.agent_name,
        model = %settings.agent_model,
        tools = tool_registry.count(),
        "starting Relay backend"
    );

    let cors_layer = middleware::cors::build_cors_layer(&settings);

    let host = settings.host.clone();
    let port = settings.port;
    let app_state = state::AppState {
        settings: Arc::new(settings),
        services: Arc::new(services_config),
        auth: auth_service,
        sessions,
        memory,
        artifacts,
        tools: tool_registry,
        spec_cache,
    };

    // Router with per-endpoint rate limiting on auth routes
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::system::router())
        .merge(routes::auth::register_router().layer(middleware::rate_limit::register_layer()))
        .merge(routes::auth::login_router().layer(middleware::rate_limit::login_layer()))
        .merge(routes::auth::session_router())
        .merge(routes::sessions::router())
        .merge(routes::memory::router())
        .merge(routes::artifacts::router())
        .merge(routes::tools::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .expect("failed to bind listen address");
    tracing::info!("Relay API listening on {}:{}", host, port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}
