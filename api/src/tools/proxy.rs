//! Reverse proxy for API and MCP tools.
//!
//! Requests arriving under a tool's mount prefix are re-issued against the
//! upstream base URL with hop-by-hop headers stripped and configured
//! credentials injected from the environment. Transport failures map onto
//! the gateway error taxonomy: connect failures become 502, timeouts 504,
//! and a failing MCP health probe 503.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{HeaderMap, Response};
use relay_core::auth::basic_auth_value;
use relay_core::tools::{ApiToolConfig, McpToolConfig, UpstreamAuth};
use url::Url;

use super::ToolRequest;
use crate::error::AppError;

/// Hop-by-hop and transport headers that must not be forwarded upstream.
const SKIP_REQUEST_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Headers recomputed by our own response body handling.
const SKIP_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "upgrade",
];

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Paths tried, in order, when probing an MCP server for liveness.
const PROBE_PATHS: &[&str] = &["", "health", "openapi.json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyFlavor {
    Api,
    Mcp,
}

/// A credential resolved from the environment, ready to attach.
#[derive(Debug, PartialEq, Eq)]
pub enum ResolvedAuth {
    Header(HeaderName, HeaderValue),
    Query(String, String),
}

/// One tool's upstream connection: base URL, auth config, and (for MCP
/// servers) a sticky readiness flag set by the first successful probe.
pub struct ProxyHandler {
    name: String,
    base_url: String,
    flavor: ProxyFlavor,
    auth: Option<UpstreamAuth>,
    allowed_operations: Option<Vec<String>>,
    client: reqwest::Client,
    ready: AtomicBool,
}

impl ProxyHandler {
    pub fn for_api(config: &ApiToolConfig, client: reqwest::Client) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            flavor: ProxyFlavor::Api,
            auth: config.auth.clone(),
            allowed_operations: config.operations.clone(),
            client,
            ready: AtomicBool::new(true),
        }
    }

    pub fn for_mcp(config: &McpToolConfig, client: reqwest::Client) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.server_url.trim_end_matches('/').to_string(),
            flavor: ProxyFlavor::Mcp,
            auth: config.auth.clone(),
            allowed_operations: None,
            client,
            ready: AtomicBool::new(false),
        }
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    /// Forward a captured request upstream and relay the response verbatim
    /// (minus hop-by-hop headers).
    pub async fn forward(&self, req: ToolRequest) -> Result<Response<Body>, AppError> {
        if self.flavor == ProxyFlavor::Api
            && !operation_allowed(&req.path, self.allowed_operations.as_deref())
        {
            return Err(AppError::NotFound {
                message: format!(
                    "Path '/{}' is not exposed by tool '{}'",
                    req.path.trim_start_matches('/'),
                    self.name
                ),
                docs_hint: self.allowed_operations.as_ref().map(|ops| {
                    format!("Exposed operations: {}", ops.join(", "))
                }),
            });
        }
        if self.flavor == ProxyFlavor::Mcp {
            self.ensure_ready().await?;
        }

        let mut url = self.target_url(&req.path, req.raw_query.as_deref())?;

        let mut headers = filter_request_headers(&req.headers);
        if let Some(auth) = &self.auth {
            match resolve_auth(auth, |var| std::env::var(var).ok()) {
                Ok(ResolvedAuth::Header(name, value)) => {
                    headers.insert(name, value);
                }
                Ok(ResolvedAuth::Query(key, value)) => {
                    url.query_pairs_mut().append_pair(&key, &value);
                }
                Err(reason) => {
                    tracing::warn!(tool = %self.name, %reason, "upstream auth not injected");
                }
            }
        }

        let upstream = self
            .client
            .request(req.method.clone(), url)
            .headers(headers)
            .body(req.body.clone())
            .timeout(UPSTREAM_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = upstream.status();
        let mut builder = Response::builder().status(status);
        for (name, value) in upstream.headers() {
            if !SKIP_RESPONSE_HEADERS.contains(&name.as_str()) {
                builder = builder.header(name, value);
            }
        }
        let body = upstream
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        tracing::debug!(tool = %self.name, %status, "proxied upstream response");
        builder
            .body(Body::from(body))
            .map_err(|e| AppError::Internal(format!("failed to assemble proxied response: {e}")))
    }

    /// Fetch the upstream's OpenAPI document from `{base}/openapi.json`.
    pub async fn fetch_openapi_spec(&self) -> Result<serde_json::Value, AppError> {
        let url = self.target_url("openapi.json", None)?;
        let resp = self
            .client
            .get(url)
            .timeout(UPSTREAM_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        if !resp.status().is_success() {
            return Err(AppError::BadGateway {
                message: format!(
                    "Tool '{}' returned {} for its OpenAPI document",
                    self.name,
                    resp.status()
                ),
            });
        }
        resp.json().await.map_err(|e| AppError::BadGateway {
            message: format!("Tool '{}' served an unreadable OpenAPI document: {e}", self.name),
        })
    }

    /// Probe an MCP server until it answers once, then remember that it is
    /// up. Any HTTP answer below 500 counts — tool servers differ in which
    /// well-known path they serve.
    async fn ensure_ready(&self) -> Result<(), AppError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        for path in PROBE_PATHS {
            let url = self.target_url(path, None)?;
            match self.client.get(url).timeout(PROBE_TIMEOUT).send().await {
                Ok(resp) if resp.status().as_u16() < 500 => {
                    tracing::info!(tool = %self.name, probe = %path, "MCP server is reachable");
                    self.ready.store(true, Ordering::Release);
                    return Ok(());
                }
                Ok(resp) => {
                    tracing::debug!(tool = %self.name, probe = %path, status = %resp.status(), "probe answered with server error");
                }
                Err(e) => {
                    tracing::debug!(tool = %self.name, probe = %path, error = %e, "probe failed");
                }
            }
        }
        Err(AppError::UpstreamUnavailable {
            message: format!(
                "MCP server '{}' at {} did not answer any health probe",
                self.name, self.base_url
            ),
        })
    }

    fn target_url(&self, path: &str, raw_query: Option<&str>) -> Result<Url, AppError> {
        let mut url = build_target_url(&self.base_url, path).map_err(|e| AppError::Internal(
            format!("tool '{}' has an invalid upstream URL: {e}", self.name),
        ))?;
        if let Some(query) = raw_query {
            url.set_query(Some(query));
        }
        Ok(url)
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::GatewayTimeout {
                message: format!("Tool '{}' did not respond within {}s", self.name, UPSTREAM_TIMEOUT.as_secs()),
            }
        } else {
            AppError::BadGateway {
                message: format!("Tool '{}' could not be reached: {e}", self.name),
            }
        }
    }
}

/// Join a path remainder onto a base URL, collapsing duplicate slashes.
fn build_target_url(base: &str, path: &str) -> Result<Url, url::ParseError> {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        Url::parse(base)
    } else {
        Url::parse(&format!("{base}/{path}"))
    }
}

fn filter_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers {
        if !SKIP_REQUEST_HEADERS.contains(&name.as_str()) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Resolve an upstream auth config into a concrete credential using the
/// given environment lookup. Fails when a referenced variable is unset or
/// its value cannot be carried in a header.
fn resolve_auth(
    auth: &UpstreamAuth,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedAuth, String> {
    let var = |name: &str| lookup(name).ok_or_else(|| format!("environment variable {name} is not set"));
    match auth {
        UpstreamAuth::Bearer { token_env } => {
            let token = var(token_env)?;
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| format!("value of {token_env} is not a valid header value"))?;
            Ok(ResolvedAuth::Header(header::AUTHORIZATION, value))
        }
        UpstreamAuth::ApiKey {
            key_env,
            key_name,
            in_query,
        } => {
            let key = var(key_env)?;
            if *in_query {
                return Ok(ResolvedAuth::Query(key_name.clone(), key));
            }
            let name = HeaderName::from_bytes(key_name.as_bytes())
                .map_err(|_| format!("'{key_name}' is not a valid header name"))?;
            let value = HeaderValue::from_str(&key)
                .map_err(|_| format!("value of {key_env} is not a valid header value"))?;
            Ok(ResolvedAuth::Header(name, value))
        }
        UpstreamAuth::Basic {
            username_env,
            password_env,
        } => {
            let username = var(username_env)?;
            let password = var(password_env)?;
            let value = HeaderValue::from_str(&basic_auth_value(&username, &password))
                .map_err(|_| "basic credentials are not a valid header value".to_string())?;
            Ok(ResolvedAuth::Header(header::AUTHORIZATION, value))
        }
    }
}

/// Check a request path against an optional operation allow-list. Entries
/// are path prefixes: `users` exposes `/users` and everything below it.
fn operation_allowed(path: &str, operations: Option<&[String]>) -> bool {
    let Some(operations) = operations else {
        return true;
    };
    let path = path.trim_start_matches('/');
    operations.iter().any(|op| {
        let op = op.trim_matches('/');
        path == op || path.starts_with(&format!("{op}/"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_url_joins_without_double_slashes() {
        let url = build_target_url("https://api.example.com/v1/", "/users/42").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/users/42");

        let root = build_target_url("https://api.example.com", "").unwrap();
        assert_eq!(root.as_str(), "https://api.example.com/");
    }

    #[test]
    fn hop_by_hop_request_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("relay.local"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));

        let filtered = filter_request_headers(&headers);
        assert!(!filtered.contains_key(header::HOST));
        assert!(!filtered.contains_key(header::CONNECTION));
        assert!(filtered.contains_key(header::CONTENT_TYPE));
        assert!(filtered.contains_key(header::AUTHORIZATION));
    }

    #[test]
    fn bearer_auth_resolves_to_authorization_header() {
        let auth = UpstreamAuth::Bearer {
            token_env: "DEMO_TOKEN".to_string(),
        };
        let resolved = resolve_auth(&auth, |var| {
            (var == "DEMO_TOKEN").then(|| "sekrit".to_string())
        })
        .unwrap();
        assert_eq!(
            resolved,
            ResolvedAuth::Header(
                header::AUTHORIZATION,
                HeaderValue::from_static("Bearer sekrit")
            )
        );
    }

    #[test]
    fn missing_env_var_is_reported() {
        let auth = UpstreamAuth::Bearer {
            token_env: "UNSET_TOKEN".to_string(),
        };
        let err = resolve_auth(&auth, |_| None).unwrap_err();
        assert!(err.contains("UNSET_TOKEN"));
    }

    #[test]
    fn api_key_respects_query_placement() {
        let auth = UpstreamAuth::ApiKey {
            key_env: "WEATHER_KEY".to_string(),
            key_name: "appid".to_string(),
            in_query: true,
        };
        let resolved = resolve_auth(&auth, |_| Some("k123".to_string())).unwrap();
        assert_eq!(
            resolved,
            ResolvedAuth::Query("appid".to_string(), "k123".to_string())
        );
    }

    #[test]
    fn basic_auth_encodes_credentials() {
        let auth = UpstreamAuth::Basic {
            username_env: "SVC_USER".to_string(),
            password_env: "SVC_PASS".to_string(),
        };
        let resolved = resolve_auth(&auth, |var| {
            Some(if var == "SVC_USER" { "user" } else { "pass" }.to_string())
        })
        .unwrap();
        assert_eq!(
            resolved,
            ResolvedAuth::Header(
                header::AUTHORIZATION,
                HeaderValue::from_static("Basic dXNlcjpwYXNz")
            )
        );
    }

    #[test]
    fn operation_allow_list_matches_prefixes() {
        let ops = vec!["users".to_string(), "posts".to_string()];
        assert!(operation_allowed("users", Some(&ops)));
        assert!(operation_allowed("/users/42/profile", Some(&ops)));
        assert!(operation_allowed("posts/1", Some(&ops)));
        assert!(!operation_allowed("admin", Some(&ops)));
        assert!(!operation_allowed("userspace", Some(&ops)));
        assert!(operation_allowed("anything", None));
    }
}
