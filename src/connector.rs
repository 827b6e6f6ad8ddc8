//! Connectors: the driver-facing side of the connection cache
//!
//! A [`Connector`] performs exactly one connection attempt per call. The cache
//! decides when to call it; the connector only knows how to reach a server.

use crate::config::{ConnectionUri, DatabaseConfig};
use crate::database::{DatabasePool, RelationalConnector};
use crate::document::DocumentConnector;
use crate::error::ConnectError;
use futures::future::{BoxFuture, FutureExt, TryFutureExt};
use std::fmt;

/// Kind of database a connection URI points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// MongoDB (`mongodb://`, `mongodb+srv://`)
    Document,
    /// PostgreSQL (`postgres://`, `postgresql://`)
    Relational,
}

impl Backend {
    /// Map a URI scheme to the backend that serves it
    #[must_use]
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "mongodb" | "mongodb+srv" => Some(Self::Document),
            "postgres" | "postgresql" => Some(Self::Relational),
            _ => None,
        }
    }

    /// Short driver name used in logs and errors
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Document => "mongodb",
            Self::Relational => "postgres",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opens a single database connection
///
/// The returned future must own everything it needs: the cache shares it between
/// every caller that arrives while it is still running.
pub trait Connector: Send + Sync {
    /// Handle produced by a successful attempt
    type Connection: Send + Sync + 'static;

    /// Start one connection attempt against `uri`
    fn connect(
        &self,
        uri: &ConnectionUri,
    ) -> BoxFuture<'static, Result<Self::Connection, ConnectError>>;
}

/// Live connection produced by [`DriverConnector`]
pub enum DatabaseHandle {
    /// MongoDB client
    Document(mongodb::Client),
    /// PostgreSQL connection pool
    Relational(DatabasePool),
}

impl DatabaseHandle {
    /// Backend this handle talks to
    #[must_use]
    pub const fn backend(&self) -> Backend {
        match self {
            Self::Document(_) => Backend::Document,
            Self::Relational(_) => Backend::Relational,
        }
    }

    /// The MongoDB client, if this is a document connection
    #[must_use]
    pub const fn as_document(&self) -> Option<&mongodb::Client> {
        match self {
            Self::Document(client) => Some(client),
            Self::Relational(_) => None,
        }
    }

    /// The PostgreSQL pool, if this is a relational connection
    #[must_use]
    pub const fn as_relational(&self) -> Option<&DatabasePool> {
        match self {
            Self::Relational(pool) => Some(pool),
            Self::Document(_) => None,
        }
    }
}

impl fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DatabaseHandle").field(&self.backend()).finish()
    }
}

/// Picks the document or relational connector from the URI scheme
#[derive(Debug, Clone)]
pub struct DriverConnector {
    document: DocumentConnector,
    relational: RelationalConnector,
}

impl DriverConnector {
    /// Build both connectors from the database configuration
    #[must_use]
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            document: DocumentConnector::new(config.app_name.clone())
                .with_connect_timeout(config.connect_timeout()),
            relational: RelationalConnector::new(config.max_pool_size)
                .with_connect_timeout(config.connect_timeout()),
        }
    }
}

impl Connector for DriverConnector {
    type Connection = DatabaseHandle;

    fn connect(
        &self,
        uri: &ConnectionUri,
    ) -> BoxFuture<'static, Result<DatabaseHandle, ConnectError>> {
        match uri.backend() {
            Backend::Document => self
                .document
                .connect(uri)
                .map_ok(DatabaseHandle::Document)
                .boxed(),
            Backend::Relational => self
                .relational
                .connect(uri)
                .map_ok(DatabaseHandle::Relational)
                .boxed(),
        }
    }
}
