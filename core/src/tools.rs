//! Configuration models for the tool registry.
//!
//! A tool is an upstream capability mounted under `/tools/{name}`: an
//! external REST API, an MCP-style HTTP tool server, or a custom in-process
//! handler. These models are plain data — the registry and proxy layers in
//! the API crate give them behavior.

use serde::{Deserialize, Serialize};

/// How to authenticate against an upstream. Credentials are never stored in
/// config — only the names of the environment variables that hold them,
/// resolved when the proxy builds a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamAuth {
    Bearer {
        token_env: String,
    },
    ApiKey {
        key_env: String,
        /// Header or query-parameter name carrying the key.
        #[serde(default = "default_api_key_name")]
        key_name: String,
        /// When true the key is appended as a query parameter instead of a
        /// header.
        #[serde(default)]
        in_query: bool,
    },
    Basic {
        username_env: String,
        password_env: String,
    },
}

fn default_api_key_name() -> String {
    "X-API-Key".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Configuration for an external REST API proxied under `/tools/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiToolConfig {
    pub name: String,
    pub base_url: String,
    /// Where to find the upstream's OpenAPI document: a URL or a local
    /// file path. Served (and cached) via `/tool-specs/{name}`.
    #[serde(default)]
    pub spec_url: Option<String>,
    #[serde(default)]
    pub auth: Option<UpstreamAuth>,
    /// Optional allow-list of path prefixes to expose (None = everything).
    #[serde(default)]
    pub operations: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Custom mount prefix, defaults to `/tools/{name}`.
    #[serde(default)]
    pub proxy_prefix: Option<String>,
}

/// Configuration for an MCP-style HTTP tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpToolConfig {
    pub name: String,
    pub server_url: String,
    #[serde(default)]
    pub auth: Option<UpstreamAuth>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub proxy_prefix: Option<String>,
}

/// Configuration for a custom in-process tool handler. The handler itself
/// is registered separately (it is code, not config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomToolConfig {
    pub name: String,
    #[serde(default = "default_custom_methods")]
    pub methods: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub proxy_prefix: Option<String>,
}

fn default_custom_methods() -> Vec<String> {
    vec!["GET".to_string(), "POST".to_string()]
}

/// Declarative tool registrations loaded from a JSON file
/// (`RELAY_TOOLS_CONFIG`). Custom handlers cannot be declared here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsFile {
    #[serde(default)]
    pub apis: Vec<ApiToolConfig>,
    #[serde(default)]
    pub mcp_servers: Vec<McpToolConfig>,
}

pub fn default_proxy_prefix(name: &str) -> String {
    format!("/tools/{name}")
}

impl ApiToolConfig {
    pub fn proxy_prefix(&self) -> String {
        self.proxy_prefix
            .clone()
            .unwrap_or_else(|| default_proxy_prefix(&self.name))
    }
}

impl McpToolConfig {
    pub fn proxy_prefix(&self) -> String {
        self.proxy_prefix
            .clone()
            .unwrap_or_else(|| default_proxy_prefix(&self.name))
    }
}

impl CustomToolConfig {
    pub fn proxy_prefix(&self) -> String {
        self.proxy_prefix
            .clone()
            .unwrap_or_else(|| default_proxy_prefix(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_prefix_defaults_to_tool_name() {
        let config = ApiToolConfig {
            name: "github".to_string(),
            base_url: "https://api.github.com".to_string(),
            spec_url: None,
            auth: None,
            operations: None,
            tags: Vec::new(),
            enabled: true,
            proxy_prefix: None,
        };
        assert_eq!(config.proxy_prefix(), "/tools/github");
    }

    #[test]
    fn proxy_prefix_override_wins() {
        let config = McpToolConfig {
            name: "analysis".to_string(),
            server_url: "http://localhost:9000".to_string(),
            auth: None,
            tags: Vec::new(),
            enabled: true,
            proxy_prefix: Some("/mcp/analysis".to_string()),
        };
        assert_eq!(config.proxy_prefix(), "/mcp/analysis");
    }

    #[test]
    fn api_tool_config_parses_with_defaults() {
        let json = r#"{"name":"weather","base_url":"https://api.openweathermap.org/data/2.5"}"#;
        let config: ApiToolConfig = serde_json::from_str(json).unwrap();
        assert!(config.enabled);
        assert!(config.auth.is_none());
        assert!(config.tags.is_empty());
    }

    #[test]
    fn upstream_auth_parses_tagged_variants() {
        let bearer: UpstreamAuth =
            serde_json::from_str(r#"{"type":"bearer","token_env":"GITHUB_TOKEN"}"#).unwrap();
        assert_eq!(
            bearer,
            UpstreamAuth::Bearer {
                token_env: "GITHUB_TOKEN".to_string()
            }
        );

        let api_key: UpstreamAuth = serde_json::from_str(
            r#"{"type":"api_key","key_env":"OPENWEATHER_API_KEY","key_name":"appid","in_query":true}"#,
        )
        .unwrap();
        assert_eq!(
            api_key,
            UpstreamAuth::ApiKey {
                key_env: "OPENWEATHER_API_KEY".to_string(),
                key_name: "appid".to_string(),
                in_query: true,
            }
        );
    }

    #[test]
    fn api_key_name_defaults() {
        let api_key: UpstreamAuth =
            serde_json::from_str(r#"{"type":"api_key","key_env":"MY_KEY"}"#).unwrap();
        let UpstreamAuth::ApiKey {
            key_name, in_query, ..
        } = api_key
        else {
            panic!("expected api_key variant");
        };
        assert_eq!(key_name, "X-API-Key");
        assert!(!in_query);
    }

    #[test]
    fn tools_file_parses_both_sections() {
        let json = r#"{
            "apis": [{"name": "demo", "base_url": "https://jsonplaceholder.typicode.com"}],
            "mcp_servers": [{"name": "analysis", "server_url": "http://localhost:9000"}]
        }"#;
        let file: ToolsFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.apis.len(), 1);
        assert_eq!(file.mcp_servers.len(), 1);
    }
}
