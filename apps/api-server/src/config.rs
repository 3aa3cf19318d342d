//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Authentication provider mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthProvider {
    /// Debug mode: any email with a non-empty password (DO NOT USE IN PRODUCTION)
    Dev,
    /// Firebase email/password sign-in
    Firebase,
}

impl AuthProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("firebase") {
            Self::Firebase
        } else {
            Self::Dev
        }
    }
}

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite file-based storage
    Sqlite,
    /// Cloud Firestore collection
    Firestore,
}

impl StorageProvider {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("sqlite") {
            Self::Sqlite
        } else if s.eq_ignore_ascii_case("firestore") {
            Self::Firestore
        } else {
            Self::Memory
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Firestore settings (when using firestore storage).
#[derive(Debug, Clone)]
#[cfg_attr(not(feature = "firestore"), allow(dead_code))]
pub struct FirestoreSettings {
    pub project_id: String,
    pub collection: String,
    pub endpoint: Option<String>,
    pub timeout: Duration,
}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3001)
    pub port: u16,
    /// Authentication provider
    pub auth_provider: AuthProvider,
    /// Allowed email domain for dev auth
    pub allowed_domain: Option<String>,
    /// Firebase Web API key (required for firebase auth)
    pub firebase_api_key: Option<String>,
    /// Identity Toolkit endpoint override
    pub firebase_auth_endpoint: Option<String>,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Storage provider
    pub storage_provider: StorageProvider,
    /// SQLite database path (when using sqlite storage)
    pub db_path: PathBuf,
    /// Firestore settings (present when storage provider is firestore)
    pub firestore: Option<FirestoreSettings>,
    /// Log format
    pub log_format: LogFormat,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `get`.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Port
        let port = match get("PORT") {
            Some(s) => s.parse().map_err(|_| ConfigError {
                field: "PORT",
                message: format!("Invalid port '{}'", s),
            })?,
            None => 3001,
        };

        // Auth provider
        let auth_provider =
            AuthProvider::from_str(&get("AUTH_PROVIDER").unwrap_or_else(|| "dev".into()));
        let allowed_domain = get("ALLOWED_DOMAIN").filter(|s| !s.is_empty());
        let firebase_api_key = get("FIREBASE_API_KEY").filter(|s| !s.is_empty());
        let firebase_auth_endpoint = get("FIREBASE_AUTH_ENDPOINT").filter(|s| !s.is_empty());

        // Validate: Firebase auth requires an API key
        if auth_provider == AuthProvider::Firebase && firebase_api_key.is_none() {
            return Err(ConfigError {
                field: "FIREBASE_API_KEY",
                message: "Required when AUTH_PROVIDER=firebase".into(),
            });
        }

        // CORS allow origin
        let cors_origin_str = get("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Storage provider
        let storage_provider = StorageProvider::from_str(
            &get("STORAGE_PROVIDER").unwrap_or_else(|| "sqlite".into()),
        );

        // DB path (for sqlite)
        let db_path = PathBuf::from(get("DB_PATH").unwrap_or_else(|| "./data/clients.db".into()));

        // Firestore
        let firestore = if storage_provider == StorageProvider::Firestore {
            let project_id = get("FIRESTORE_PROJECT_ID").filter(|s| !s.is_empty()).ok_or(
                ConfigError {
                    field: "FIRESTORE_PROJECT_ID",
                    message: "Required when STORAGE_PROVIDER=firestore".into(),
                },
            )?;
            // Firestore requests are authorized with the signed-in user's ID token.
            if auth_provider != AuthProvider::Firebase {
                return Err(ConfigError {
                    field: "AUTH_PROVIDER",
                    message: "STORAGE_PROVIDER=firestore requires AUTH_PROVIDER=firebase".into(),
                });
            }
            let timeout_secs = match get("FIRESTORE_TIMEOUT_SECS") {
                Some(s) => s.parse::<u64>().map_err(|_| ConfigError {
                    field: "FIRESTORE_TIMEOUT_SECS",
                    message: format!("Invalid number of seconds '{}'", s),
                })?,
                None => 10,
            };
            Some(FirestoreSettings {
                project_id,
                collection: get("FIRESTORE_COLLECTION").unwrap_or_else(|| "clients".into()),
                endpoint: get("FIRESTORE_ENDPOINT").filter(|s| !s.is_empty()),
                timeout: Duration::from_secs(timeout_secs),
            })
        } else {
            None
        };

        // Log format
        let log_format =
            LogFormat::from_str(&get("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        Ok(Self {
            port,
            auth_provider,
            allowed_domain,
            firebase_api_key,
            firebase_auth_endpoint,
            cors_allow_origin,
            storage_provider,
            db_path,
            firestore,
            log_format,
        })
    }

    /// Log warnings about insecure configuration.
    pub fn warn_if_insecure(&self) {
        if self.auth_provider == AuthProvider::Dev {
            tracing::warn!(
                "AUTH_PROVIDER=dev: any email with a non-empty password can sign in. \
                 DO NOT USE IN PRODUCTION."
            );
            if self.allowed_domain.is_none() {
                tracing::warn!(
                    "ALLOWED_DOMAIN not set: Any email domain will be accepted. \
                     Set ALLOWED_DOMAIN for domain restriction."
                );
            }
        }
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: client records are lost on restart.");
        }
    }
}
