use crate::connector::Backend;
use mongodb::options::ConnectionString;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Config file looked up in the current directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "conncache.toml";

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error occurred while reading config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error occurred
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// No connection URI in the environment or the config file
    #[error("Please define the {var} environment variable or set database.uri")]
    MissingUri {
        /// Environment variable that was consulted
        var: String,
    },

    /// Connection URI is malformed
    #[error("Invalid connection URI: {reason}")]
    InvalidUri {
        /// What is wrong with it
        reason: String,
    },

    /// Connection URI names a scheme no connector handles
    #[error("Unsupported connection scheme '{scheme}' (expected mongodb, mongodb+srv, postgres or postgresql)")]
    UnsupportedScheme {
        /// Scheme as written
        scheme: String,
    },

    /// Auth server base URL is malformed
    #[error("Invalid auth base URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// URL as written
        url: String,
        /// Parser message
        reason: String,
    },
}

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Auth server configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Database connection configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Inline connection URI, used when the environment variable is unset
    pub uri: Option<String>,
    /// Environment variable containing the connection URI
    pub uri_env: String,
    /// Application name reported to the document database
    pub app_name: String,
    /// Upper bound on pooled relational connections
    pub max_pool_size: u32,
    /// How long a single connection attempt may wait on the server, in milliseconds
    ///
    /// Unset keeps each driver's default. A timeout written into the URI wins.
    pub connect_timeout_ms: Option<u64>,
}

/// Auth server configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// Root of the auth server's HTTP API
    pub base_url: String,
    /// Environment variable holding the session token
    pub session_token_env: String,
    /// Cookie name the auth server expects the session token under
    pub cookie_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: None,
            uri_env: "MONGODB_URI".to_string(),
            app_name: "conncache".to_string(),
            max_pool_size: 10,
            connect_timeout_ms: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api/auth".to_string(),
            session_token_env: "AUTH_SESSION_TOKEN".to_string(),
            cookie_name: "better-auth.session_token".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load from an explicit path, else from `conncache.toml` if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            return Self::from_file(path);
        }

        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            debug!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
            Self::from_file(default_path)
        } else {
            debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
            Ok(Self::default())
        }
    }
}

impl DatabaseConfig {
    /// Configured connection timeout, if any
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Resolve and validate the connection URI from the process environment
    pub fn connection_uri(&self) -> Result<ConnectionUri, ConfigError> {
        self.connection_uri_with(|var| env::var(var).ok())
    }

    /// Resolve and validate the connection URI using `lookup` for environment reads
    ///
    /// The environment variable wins over `uri`. Empty values count as unset.
    pub fn connection_uri_with<F>(&self, lookup: F) -> Result<ConnectionUri, ConfigError>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let from_env = lookup(&self.uri_env).filter(|value| !value.trim().is_empty());
        if from_env.is_some() {
            debug!("Reading connection URI from environment variable: {}", self.uri_env);
        }

        let raw = from_env
            .or_else(|| self.uri.clone().filter(|value| !value.trim().is_empty()))
            .ok_or_else(|| ConfigError::MissingUri {
                var: self.uri_env.clone(),
            })?;

        ConnectionUri::parse(&raw)
    }
}

/// A validated database connection URI
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionUri {
    raw: String,
    backend: Backend,
}

impl ConnectionUri {
    /// Parse a connection URI and determine which backend serves it
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let Some((scheme, rest)) = raw.split_once("://") else {
            return Err(ConfigError::InvalidUri {
                reason: "expected <scheme>://<host>".to_string(),
            });
        };

        let backend =
            Backend::from_scheme(scheme).ok_or_else(|| ConfigError::UnsupportedScheme {
                scheme: scheme.to_string(),
            })?;
        if rest.is_empty() {
            return Err(ConfigError::InvalidUri {
                reason: "expected <scheme>://<host>".to_string(),
            });
        }

        // Let the driver reject bad hosts and options now rather than on first connect.
        let parsed = match backend {
            Backend::Document => ConnectionString::parse(raw)
                .map(drop)
                .map_err(|e| e.to_string()),
            Backend::Relational => tokio_postgres::Config::from_str(raw)
                .map(drop)
                .map_err(|e| e.to_string()),
        };
        parsed.map_err(|reason| ConfigError::InvalidUri { reason })?;

        Ok(Self {
            raw: raw.to_string(),
            backend,
        })
    }

    /// The URI exactly as configured, credentials included
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Backend selected by the URI scheme
    #[must_use]
    pub const fn backend(&self) -> Backend {
        self.backend
    }

    /// The URI with any password replaced, safe for logs and error messages
    #[must_use]
    pub fn redacted(&self) -> String {
        let Some((scheme, rest)) = self.raw.split_once("://") else {
            return self.raw.clone();
        };
        let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);

        let Some((userinfo, hosts)) = authority.rsplit_once('@') else {
            return self.raw.clone();
        };
        let user = match userinfo.split_once(':') {
            Some((user, _)) => format!("{user}:***"),
            None => userinfo.to_string(),
        };

        format!("{scheme}://{user}@{hosts}{tail}")
    }
}

impl fmt::Display for ConnectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for ConnectionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionUri")
            .field("uri", &self.redacted())
            .field("backend", &self.backend)
            .finish()
    }
}
