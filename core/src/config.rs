//! Environment-driven configuration for the Relay backend.
//!
//! Settings are read once at startup from `RELAY_*` environment variables
//! (after `dotenvy::dotenv()` has run). The service selectors are parsed
//! into tagged config enums so that the factory layer can switch on a
//! closed set of variants instead of raw strings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default SQLite database for auth storage when nothing else is configured.
pub const DEFAULT_AUTH_DB_URL: &str = "sqlite://data/auth.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: String, message: String },
    #[error("{var} is required for {context}")]
    MissingVar { var: String, context: String },
    #[error("unknown service type '{value}' for {var}")]
    UnknownServiceType { var: String, value: String },
}

/// Application settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    // Server
    pub host: String,
    pub port: u16,

    // Agent identity (surfaced on /info)
    pub agent_name: String,
    pub agent_description: String,
    pub agent_model: String,

    // CORS
    pub allowed_origins: Vec<String>,

    // Authentication
    pub jwt_secret: String,
    pub token_ttl_days: i64,

    // Service selectors (parsed into typed configs by `services_config`)
    pub session_service_type: String,
    pub session_database_url: Option<String>,
    pub memory_service_type: String,
    pub artifact_service_type: String,
    pub artifact_local_base_path: String,
    pub auth_storage_type: String,
    pub auth_database_url: String,

    // Declarative tool registrations (optional JSON file)
    pub tools_config_path: Option<String>,

    // OpenAPI document cache for tool upstreams
    pub spec_cache_dir: String,
    pub spec_cache_ttl_secs: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("RELAY_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                var: "RELAY_PORT".to_string(),
                message: format!("'{raw}' is not a valid port"),
            })?,
            Err(_) => 8000,
        };

        let token_ttl_days = match std::env::var("RELAY_TOKEN_TTL_DAYS") {
            Ok(raw) => raw.parse::<i64>().map_err(|_| ConfigError::Invalid {
                var: "RELAY_TOKEN_TTL_DAYS".to_string(),
                message: format!("'{raw}' is not a valid number of days"),
            })?,
            Err(_) => 7,
        };

        let spec_cache_ttl_secs = match std::env::var("RELAY_SPEC_CACHE_TTL_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
                var: "RELAY_SPEC_CACHE_TTL_SECS".to_string(),
                message: format!("'{raw}' is not a valid number of seconds"),
            })?,
            Err(_) => 3600,
        };

        let allowed_origins = std::env::var("RELAY_CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host: env_or("RELAY_HOST", "0.0.0.0"),
            port,
            agent_name: env_or("RELAY_AGENT_NAME", "generic_assistant"),
            agent_description: env_or(
                "RELAY_AGENT_DESCRIPTION",
                "A helpful AI assistant backend with pluggable storage and tools.",
            ),
            agent_model: env_or("RELAY_AGENT_MODEL", "gemini-2.0-flash-exp"),
            allowed_origins,
            jwt_secret: env_or("RELAY_JWT_SECRET", "change-this-in-production"),
            token_ttl_days,
            session_service_type: env_or("RELAY_SESSION_SERVICE", "inmemory"),
            session_database_url: std::env::var("RELAY_SESSION_DATABASE_URL").ok(),
            memory_service_type: env_or("RELAY_MEMORY_SERVICE", "inmemory"),
            artifact_service_type: env_or("RELAY_ARTIFACT_SERVICE", "inmemory"),
            artifact_local_base_path: env_or("RELAY_ARTIFACT_LOCAL_PATH", "./artifacts"),
            auth_storage_type: env_or("RELAY_AUTH_STORAGE", "auto"),
            auth_database_url: env_or("RELAY_AUTH_DATABASE_URL", DEFAULT_AUTH_DB_URL),
            tools_config_path: std::env::var("RELAY_TOOLS_CONFIG").ok(),
            spec_cache_dir: env_or("RELAY_SPEC_CACHE_DIR", "./data/spec_cache"),
            spec_cache_ttl_secs,
        })
    }

    /// Parse the raw service selectors into the typed bundle.
    pub fn services_config(&self) -> Result<ServicesConfig, ConfigError> {
        Ok(ServicesConfig {
            session: parse_session_config(
                &self.session_service_type,
                self.session_database_url.as_deref(),
            )?,
            memory: parse_memory_config(&self.memory_service_type)?,
            artifact: parse_artifact_config(
                &self.artifact_service_type,
                &self.artifact_local_base_path,
            )?,
        })
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

// ──────────────────────────────────────────────
// Service configurations
// ──────────────────────────────────────────────

/// Session persistence backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionConfig {
    #[serde(rename = "inmemory")]
    InMemory,
    Database { url: String },
}

/// Memory (recall) backend. Only an in-process implementation exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MemoryConfig {
    #[serde(rename = "inmemory")]
    InMemory,
}

/// Artifact (file) storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactConfig {
    #[serde(rename = "inmemory")]
    InMemory,
    Local { base_path: String },
}

/// Auth user storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStorageConfig {
    /// Follow the session database where practical, default to SQLite.
    Auto,
    Database { url: String },
    InMemory,
}

impl SessionConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::InMemory => "inmemory",
            Self::Database { .. } => "database",
        }
    }
}

impl MemoryConfig {
    pub fn type_name(&self) -> &'static str {
        "inmemory"
    }
}

impl ArtifactConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::InMemory => "inmemory",
            Self::Local { .. } => "local",
        }
    }
}

/// Combined configuration for all backend services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicesConfig {
    pub session: SessionConfig,
    pub memory: MemoryConfig,
    pub artifact: ArtifactConfig,
}

impl ServicesConfig {
    /// Map of service name to configured backend type, for startup logging
    /// and the /info endpoint.
    pub fn summary(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("session_service", self.session.type_name().to_string()),
            ("memory_service", self.memory.type_name().to_string()),
            ("artifact_service", self.artifact.type_name().to_string()),
        ])
    }
}

/// Validate that a database URL uses a supported scheme.
pub fn validate_database_url(url: &str, var: &str) -> Result<(), ConfigError> {
    const VALID_PREFIXES: [&str; 3] = ["sqlite:", "postgres:", "postgresql:"];
    if VALID_PREFIXES.iter().any(|prefix| url.starts_with(prefix)) {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        var: var.to_string(),
        message: format!(
            "database URL must start with one of: {}",
            VALID_PREFIXES.join(", ")
        ),
    })
}

pub fn parse_session_config(
    service_type: &str,
    database_url: Option<&str>,
) -> Result<SessionConfig, ConfigError> {
    match service_type {
        "inmemory" => Ok(SessionConfig::InMemory),
        "database" => {
            let url = database_url.ok_or_else(|| ConfigError::MissingVar {
                var: "RELAY_SESSION_DATABASE_URL".to_string(),
                context: "the database session service".to_string(),
            })?;
            validate_database_url(url, "RELAY_SESSION_DATABASE_URL")?;
            Ok(SessionConfig::Database {
                url: url.to_string(),
            })
        }
        other => Err(ConfigError::UnknownServiceType {
            var: "RELAY_SESSION_SERVICE".to_string(),
            value: other.to_string(),
        }),
    }
}

pub fn parse_memory_config(service_type: &str) -> Result<MemoryConfig, ConfigError> {
    match service_type {
        "inmemory" => Ok(MemoryConfig::InMemory),
        other => Err(ConfigError::UnknownServiceType {
            var: "RELAY_MEMORY_SERVICE".to_string(),
            value: other.to_string(),
        }),
    }
}

pub fn parse_artifact_config(
    service_type: &str,
    local_base_path: &str,
) -> Result<ArtifactConfig, ConfigError> {
    match service_type {
        "inmemory" => Ok(ArtifactConfig::InMemory),
        "local" => {
            if local_base_path.trim().is_empty() {
                return Err(ConfigError::MissingVar {
                    var: "RELAY_ARTIFACT_LOCAL_PATH".to_string(),
                    context: "the local folder artifact service".to_string(),
                });
            }
            Ok(ArtifactConfig::Local {
                base_path: local_base_path.to_string(),
            })
        }
        other => Err(ConfigError::UnknownServiceType {
            var: "RELAY_ARTIFACT_SERVICE".to_string(),
            value: other.to_string(),
        }),
    }
}

/// Resolve the auth storage selection. `auto` follows the session database
/// when one is configured, otherwise falls back to the default SQLite file.
pub fn parse_auth_storage_config(
    storage_type: &str,
    auth_database_url: &str,
    session: &SessionConfig,
) -> Result<AuthStorageConfig, ConfigError> {
    match storage_type {
        "auto" => match session {
            SessionConfig::Database { url } => Ok(AuthStorageConfig::Database { url: url.clone() }),
            SessionConfig::InMemory => Ok(AuthStorageConfig::Database {
                url: auth_database_url.to_string(),
            }),
        },
        "database" | "sqlite" => {
            validate_database_url(auth_database_url, "RELAY_AUTH_DATABASE_URL")?;
            Ok(AuthStorageConfig::Database {
                url: auth_database_url.to_string(),
            })
        }
        "inmemory" => Ok(AuthStorageConfig::InMemory),
        other => Err(ConfigError::UnknownServiceType {
            var: "RELAY_AUTH_STORAGE".to_string(),
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_defaults_to_inmemory() {
        assert_eq!(
            parse_session_config("inmemory", None).unwrap(),
            SessionConfig::InMemory
        );
    }

    #[test]
    fn session_database_requires_url() {
        assert!(parse_session_config("database", None).is_err());
        assert_eq!(
            parse_session_config("database", Some("sqlite://data/sessions.db")).unwrap(),
            SessionConfig::Database {
                url: "sqlite://data/sessions.db".to_string()
            }
        );
    }

    #[test]
    fn database_url_scheme_is_validated() {
        assert!(validate_database_url("postgres://localhost/relay", "X").is_ok());
        assert!(validate_database_url("postgresql://localhost/relay", "X").is_ok());
        assert!(validate_database_url("sqlite://data/auth.db", "X").is_ok());
        assert!(validate_database_url("mysql://localhost/relay", "X").is_err());
        assert!(validate_database_url("mongodb://localhost", "X").is_err());
    }

    #[test]
    fn unknown_service_types_are_rejected() {
        assert!(parse_session_config("redis", None).is_err());
        assert!(parse_memory_config("vertex").is_err());
        assert!(parse_artifact_config("s3", "./artifacts").is_err());
    }

    #[test]
    fn auto_auth_storage_follows_session_database() {
        let session = SessionConfig::Database {
            url: "postgres://localhost/relay".to_string(),
        };
        assert_eq!(
            parse_auth_storage_config("auto", DEFAULT_AUTH_DB_URL, &session).unwrap(),
            AuthStorageConfig::Database {
                url: "postgres://localhost/relay".to_string()
            }
        );
    }

    #[test]
    fn auto_auth_storage_defaults_to_sqlite() {
        assert_eq!(
            parse_auth_storage_config("auto", DEFAULT_AUTH_DB_URL, &SessionConfig::InMemory)
                .unwrap(),
            AuthStorageConfig::Database {
                url: DEFAULT_AUTH_DB_URL.to_string()
            }
        );
    }

    #[test]
    fn services_summary_names_every_service() {
        let config = ServicesConfig {
            session: SessionConfig::InMemory,
            memory: MemoryConfig::InMemory,
            artifact: ArtifactConfig::Local {
                base_path: "./artifacts".to_string(),
            },
        };
        let summary = config.summary();
        assert_eq!(summary["session_service"], "inmemory");
        assert_eq!(summary["memory_service"], "inmemory");
        assert_eq!(summary["artifact_service"], "local");
    }

    #[test]
    fn artifact_config_serde_tag_roundtrip() {
        let json = r#"{"type":"local","base_path":"/var/artifacts"}"#;
        let config: ArtifactConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config,
            ArtifactConfig::Local {
                base_path: "/var/artifacts".to_string()
            }
        );
    }
}
