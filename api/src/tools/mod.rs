//! The tool registry and its upstream plumbing.
//!
//! Tools are named upstream capabilities mounted under `/tools/{name}`:
//! external REST APIs and MCP-style tool servers reached through the
//! reverse proxy in [`proxy`], plus custom in-process handlers. The
//! [`registry::ToolRegistry`] owns the name → entry table and dispatches
//! incoming requests; [`spec_cache::SpecCache`] resolves and caches the
//! OpenAPI documents upstreams advertise.

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};

pub mod proxy;
pub mod registry;
pub mod spec_cache;

pub use proxy::ProxyHandler;
pub use registry::{ToolRegistry, ToolSummary};
pub use spec_cache::SpecCache;

/// A request captured at the tool mount point, ready for dispatch.
/// `path` is the remainder after `/tools/{name}` (may be empty).
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub method: Method,
    pub path: String,
    pub raw_query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ToolRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            raw_query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}
