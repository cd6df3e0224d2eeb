//! The name → tool table behind `/tools`.
//!
//! Tools are registered programmatically (custom handlers) or loaded from
//! the declarative JSON config. Dispatch clones the entry out of the table
//! before awaiting so the lock is never held across I/O.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Response;
use parking_lot::RwLock;
use relay_core::tools::{ApiToolConfig, CustomToolConfig, McpToolConfig, ToolsFile};
use serde::Serialize;
use utoipa::ToSchema;

use super::ToolRequest;
use super::proxy::ProxyHandler;
use crate::error::AppError;

/// An in-process tool implementation. Boxed so handlers of any shape can
/// live in the same table as proxied upstreams.
pub type CustomHandler = Arc<
    dyn Fn(ToolRequest) -> Pin<Box<dyn Future<Output = Result<Response<Body>, AppError>> + Send>>
        + Send
        + Sync,
>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a tool named '{0}' is already registered")]
    Duplicate(String),
    #[error("failed to read tools config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse tools config: {0}")]
    Parse(#[from] serde_json::Error),
}

enum ToolBackend {
    Proxy(Arc<ProxyHandler>),
    Custom {
        methods: Vec<String>,
        handler: CustomHandler,
    },
}

struct ToolEntry {
    kind: &'static str,
    enabled: bool,
    proxy_prefix: String,
    tags: Vec<String>,
    spec_url: Option<String>,
    backend: ToolBackend,
}

/// One row in the `GET /tools` listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ToolSummary {
    pub name: String,
    /// "api", "mcp", or "custom"
    pub kind: String,
    pub proxy_prefix: String,
    pub enabled: bool,
    pub tags: Vec<String>,
    pub has_auth: bool,
}

/// Where a tool's OpenAPI document comes from.
pub enum SpecSource {
    /// A configured URL or file path, resolved through the spec cache.
    Configured(String),
    /// Fetched live from the upstream's `/openapi.json`.
    Upstream(Arc<ProxyHandler>),
}

#[derive(Default)]
pub struct ToolRegistry {
    entries: RwLock<BTreeMap<String, Arc<ToolEntry>>>,
    client: reqwest::Client,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_api_tool(&self, config: &ApiToolConfig) -> Result<(), RegistryError> {
        let handler = ProxyHandler::for_api(config, self.client.clone());
        self.insert(
            &config.name,
            ToolEntry {
                kind: "api",
                enabled: config.enabled,
                proxy_prefix: config.proxy_prefix(),
                tags: config.tags.clone(),
                spec_url: config.spec_url.clone(),
                backend: ToolBackend::Proxy(Arc::new(handler)),
            },
        )
    }

    pub fn register_mcp_tool(&self, config: &McpToolConfig) -> Result<(), RegistryError> {
        let handler = ProxyHandler::for_mcp(config, self.client.clone());
        self.insert(
            &config.name,
            ToolEntry {
                kind: "mcp",
                enabled: config.enabled,
                proxy_prefix: config.proxy_prefix(),
                tags: config.tags.clone(),
                spec_url: None,
                backend: ToolBackend::Proxy(Arc::new(handler)),
            },
        )
    }

    pub fn register_custom_tool(
        &self,
        config: &CustomToolConfig,
        handler: CustomHandler,
    ) -> Result<(), RegistryError> {
        let methods = config
            .methods
            .iter()
            .map(|m| m.to_uppercase())
            .collect();
        self.insert(
            &config.name,
            ToolEntry {
                kind: "custom",
                enabled: config.enabled,
                proxy_prefix: config.proxy_prefix(),
                tags: config.tags.clone(),
                spec_url: None,
                backend: ToolBackend::Custom { methods, handler },
            },
        )
    }

    /// Load declarative registrations from a JSON file. Returns the number
    /// of tools registered.
    pub fn load_file(&self, path: &Path) -> Result<usize, RegistryError> {
        let raw = std::fs::read_to_string(path)?;
        let file: ToolsFile = serde_json::from_str(&raw)?;
        let mut registered = 0;
        for api in &file.apis {
            self.register_api_tool(api)?;
            registered += 1;
        }
        for mcp in &file.mcp_servers {
            self.register_mcp_tool(mcp)?;
            registered += 1;
        }
        tracing::info!(path = %path.display(), count = registered, "loaded tool registrations");
        Ok(registered)
    }

    pub fn list(&self) -> Vec<ToolSummary> {
        self.entries
            .read()
            .iter()
            .map(|(name, entry)| ToolSummary {
                name: name.clone(),
                kind: entry.kind.to_string(),
                proxy_prefix: entry.proxy_prefix.clone(),
                enabled: entry.enabled,
                tags: entry.tags.clone(),
                has_auth: match &entry.backend {
                    ToolBackend::Proxy(handler) => handler.has_auth(),
                    ToolBackend::Custom { .. } => false,
                },
            })
            .collect()
    }

    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    /// Route a captured request to the named tool. Unknown and disabled
    /// tools are indistinguishable from the outside.
    pub async fn dispatch(
        &self,
        name: &str,
        req: ToolRequest,
    ) -> Result<Response<Body>, AppError> {
        let entry = self.routable_entry(name)?;
        match &entry.backend {
            ToolBackend::Proxy(handler) => handler.forward(req).await,
            ToolBackend::Custom { methods, handler } => {
                if !methods.iter().any(|m| m == req.method.as_str()) {
                    return Err(AppError::MethodNotAllowed {
                        message: format!("Tool '{name}' does not accept {}", req.method),
                        docs_hint: Some(format!("Supported methods: {}", methods.join(", "))),
                    });
                }
                handler(req).await
            }
        }
    }

    /// Resolve how the named tool's OpenAPI document should be obtained.
    pub fn spec_source(&self, name: &str) -> Result<SpecSource, AppError> {
        let entry = self.routable_entry(name)?;
        if let Some(url) = &entry.spec_url {
            return Ok(SpecSource::Configured(url.clone()));
        }
        match &entry.backend {
            ToolBackend::Proxy(handler) => Ok(SpecSource::Upstream(handler.clone())),
            ToolBackend::Custom { .. } => Err(AppError::NotFound {
                message: format!("Tool '{name}' does not publish an OpenAPI document"),
                docs_hint: None,
            }),
        }
    }

    fn routable_entry(&self, name: &str) -> Result<Arc<ToolEntry>, AppError> {
        let entry = self.entries.read().get(name).cloned();
        match entry {
            Some(entry) if entry.enabled => Ok(entry),
            _ => Err(AppError::NotFound {
                message: format!("No tool named '{name}' is available"),
                docs_hint: Some("GET /tools lists the registered tools".to_string()),
            }),
        }
    }

    fn insert(&self, name: &str, entry: ToolEntry) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        tracing::info!(tool = %name, kind = entry.kind, prefix = %entry.proxy_prefix, "registered tool");
        entries.insert(name.to_string(), Arc::new(entry));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};
    use std::io::Write;

    fn api_config(name: &str) -> ApiToolConfig {
        ApiToolConfig {
            name: name.to_string(),
            base_url: "https://api.example.com".to_string(),
            spec_url: None,
            auth: None,
            operations: None,
            tags: vec!["demo".to_string()],
            enabled: true,
            proxy_prefix: None,
        }
    }

    fn echo_handler() -> CustomHandler {
        Arc::new(|req: ToolRequest| {
            Box::pin(async move {
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from(format!("{} /{}", req.method, req.path)))
                    .unwrap())
            })
        })
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = ToolRegistry::new();
        registry.register_api_tool(&api_config("github")).unwrap();
        let err = registry.register_api_tool(&api_config("github")).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(name) if name == "github"));
    }

    #[test]
    fn listing_reflects_registrations() {
        let registry = ToolRegistry::new();
        registry.register_api_tool(&api_config("github")).unwrap();
        registry
            .register_mcp_tool(&McpToolConfig {
                name: "analysis".to_string(),
                server_url: "http://localhost:9000".to_string(),
                auth: Some(relay_core::tools::UpstreamAuth::Bearer {
                    token_env: "ANALYSIS_TOKEN".to_string(),
                }),
                tags: Vec::new(),
                enabled: false,
                proxy_prefix: None,
            })
            .unwrap();

        let tools = registry.list();
        assert_eq!(tools.len(), 2);
        // BTreeMap keeps the listing sorted by name
        assert_eq!(tools[0].name, "analysis");
        assert_eq!(tools[0].kind, "mcp");
        assert!(!tools[0].enabled);
        assert!(tools[0].has_auth);
        assert_eq!(tools[1].proxy_prefix, "/tools/github");
        assert!(!tools[1].has_auth);
    }

    #[tokio::test]
    async fn custom_tools_dispatch_and_enforce_methods() {
        let registry = ToolRegistry::new();
        let config = CustomToolConfig {
            name: "echo".to_string(),
            methods: vec!["GET".to_string()],
            tags: Vec::new(),
            enabled: true,
            proxy_prefix: None,
        };
        registry.register_custom_tool(&config, echo_handler()).unwrap();

        let resp = registry
            .dispatch("echo", ToolRequest::new(Method::GET, "ping"))
            .await
            .unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"GET /ping");

        let err = registry
            .dispatch("echo", ToolRequest::new(Method::DELETE, "ping"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MethodNotAllowed { .. }));
    }

    #[tokio::test]
    async fn unknown_and_disabled_tools_both_404() {
        let registry = ToolRegistry::new();
        let mut config = api_config("dark");
        config.enabled = false;
        registry.register_api_tool(&config).unwrap();

        for name in ["dark", "missing"] {
            let err = registry
                .dispatch(name, ToolRequest::new(Method::GET, ""))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::NotFound { .. }));
        }
        // Disabled tools still show up in the listing
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn loads_registrations_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "apis": [{{"name": "demo", "base_url": "https://jsonplaceholder.typicode.com"}}],
                "mcp_servers": [{{"name": "analysis", "server_url": "http://localhost:9000"}}]
            }}"#
        )
        .unwrap();

        let registry = ToolRegistry::new();
        let count = registry.load_file(file.path()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn custom_tools_have_no_spec_source() {
        let registry = ToolRegistry::new();
        let config = CustomToolConfig {
            name: "echo".to_string(),
            methods: vec!["GET".to_string()],
            tags: Vec::new(),
            enabled: true,
            proxy_prefix: None,
        };
        registry.register_custom_tool(&config, echo_handler()).unwrap();
        assert!(registry.spec_source("echo").is_err());

        let mut api = api_config("github");
        api.spec_url = Some("https://api.example.com/openapi.json".to_string());
        registry.register_api_tool(&api).unwrap();
        assert!(matches!(
            registry.spec_source("github"),
            Ok(SpecSource::Configured(url)) if url.ends_with("openapi.json")
        ));
    }
}
