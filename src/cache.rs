//! # Connection Cache
//!
//! Holds at most one live connection and at most one in-flight connection attempt.
//! Callers that arrive while an attempt is running await that same attempt instead
//! of opening a connection of their own. A failed attempt is dropped so the next
//! caller starts over; a successful one is kept for the lifetime of the cache.
//!
//! The cache is an ordinary value: build one at startup and share it by reference
//! or through an `Arc`.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use conncache::{Config, ConnectionCache};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! let cache = ConnectionCache::from_config(&config.database)?;
//!
//! let first = cache.get_connection().await?;
//! let second = cache.get_connection().await?;
//! assert!(std::sync::Arc::ptr_eq(&first, &second));
//! # Ok(())
//! # }
//! ```

use crate::config::{ConfigError, ConnectionUri, DatabaseConfig};
use crate::connector::{Connector, DriverConnector};
use crate::error::ConnectError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

type Attempt<T> = Shared<BoxFuture<'static, Result<Arc<T>, ConnectError>>>;

struct PendingAttempt<T> {
    number: u64,
    attempt: Attempt<T>,
}

struct CacheState<T> {
    connection: Option<Arc<T>>,
    pending: Option<PendingAttempt<T>>,
    attempts: u64,
}

/// Lazily opened connection shared by every caller
pub struct ConnectionCache<C: Connector> {
    connector: C,
    uri: ConnectionUri,
    // Never held across an await.
    state: Mutex<CacheState<C::Connection>>,
}

impl<C: Connector> ConnectionCache<C> {
    /// Create an empty cache; nothing is opened until the first call
    #[must_use]
    pub fn new(connector: C, uri: ConnectionUri) -> Self {
        Self {
            connector,
            uri,
            state: Mutex::new(CacheState {
                connection: None,
                pending: None,
                attempts: 0,
            }),
        }
    }

    /// Return the cached connection, joining or starting a connection attempt if needed
    ///
    /// Every caller waiting on the same attempt receives the same handle or the same
    /// error. After an error the cache is empty again and the next call retries.
    pub async fn get_connection(&self) -> Result<Arc<C::Connection>, ConnectError> {
        let (number, attempt) = {
            let mut state = self.lock_state();
            if let Some(connection) = &state.connection {
                return Ok(Arc::clone(connection));
            }

            let joined = state
                .pending
                .as_ref()
                .map(|pending| (pending.number, pending.attempt.clone()));
            match joined {
                Some((number, attempt)) => {
                    debug!(attempt = number, "Joining in-flight connection attempt");
                    (number, attempt)
                }
                None => self.start_attempt(&mut state),
            }
        };

        let outcome = attempt.await;

        let mut state = self.lock_state();
        // Only the attempt still on record may be settled; an older one was already.
        if state
            .pending
            .as_ref()
            .is_some_and(|pending| pending.number == number)
        {
            state.pending = None;
            match &outcome {
                Ok(connection) => {
                    info!(attempt = number, "Connected to {}", self.uri);
                    state.connection = Some(Arc::clone(connection));
                }
                Err(e) => {
                    warn!(attempt = number, "Connection attempt failed: {}", e);
                }
            }
        }

        outcome
    }

    fn start_attempt(
        &self,
        state: &mut CacheState<C::Connection>,
    ) -> (u64, Attempt<C::Connection>) {
        state.attempts += 1;
        let number = state.attempts;
        info!(
            attempt = number,
            "Opening {} connection to {}",
            self.uri.backend(),
            self.uri
        );

        // A panic settles the attempt as an error; a poisoned Shared never would.
        let backend = self.uri.backend();
        let attempt = AssertUnwindSafe(self.connector.connect(&self.uri))
            .catch_unwind()
            .map(move |outcome| match outcome {
                Ok(result) => result.map(Arc::new),
                Err(payload) => Err(ConnectError::Panicked {
                    backend,
                    message: panic_message(payload.as_ref()),
                }),
            })
            .boxed()
            .shared();
        state.pending = Some(PendingAttempt {
            number,
            attempt: attempt.clone(),
        });
        (number, attempt)
    }

    /// The established connection, without starting an attempt
    #[must_use]
    pub fn cached(&self) -> Option<Arc<C::Connection>> {
        self.lock_state().connection.clone()
    }

    /// Whether a connection attempt is currently in flight
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.lock_state().pending.is_some()
    }

    /// Number of connection attempts started so far
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.lock_state().attempts
    }

    /// The URI this cache connects to
    #[must_use]
    pub const fn uri(&self) -> &ConnectionUri {
        &self.uri
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState<C::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "connector panicked".to_string())
}

impl ConnectionCache<DriverConnector> {
    /// Validate the connection URI and build a cache over the real drivers
    ///
    /// Fails with [`ConfigError::MissingUri`] when no URI is configured.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, ConfigError> {
        let uri = config.connection_uri()?;
        Ok(Self::new(DriverConnector::from_config(config), uri))
    }
}

impl<C: Connector> fmt::Debug for ConnectionCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("ConnectionCache")
            .field("uri", &self.uri)
            .field("connected", &state.connection.is_some())
            .field("connecting", &state.pending.is_some())
            .field("attempts", &state.attempts)
            .finish()
    }
}
