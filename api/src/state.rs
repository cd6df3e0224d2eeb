use std::sync::Arc;

use relay_core::config::{ServicesConfig, Settings};

use crate::auth::AuthService;
use crate::services::{ArtifactStore, MemoryService, SessionStore};
use crate::tools::{SpecCache, ToolRegistry};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub services: Arc<ServicesConfig>,
    pub auth: Arc<AuthService>,
    pub sessions: Arc<dyn SessionStore>,
    pub memory: Arc<MemoryService>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub tools: Arc<ToolRegistry>,
    pub spec_cache: Arc<SpecCache>,
}
