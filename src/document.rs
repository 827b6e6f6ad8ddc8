//! MongoDB connector
//!
//! `mongodb::Client` connects lazily, so a successful attempt here means the
//! server answered a `ping` on the `admin` database.

use crate::config::ConnectionUri;
use crate::connector::Backend;
use crate::error::ConnectError;
use futures::future::{BoxFuture, FutureExt};
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::Client;
use std::time::Duration;
use tracing::{debug, error, info};

/// Opens a `mongodb::Client` and verifies the deployment is reachable
#[derive(Debug, Clone)]
pub struct DocumentConnector {
    app_name: String,
    connect_timeout: Option<Duration>,
}

impl DocumentConnector {
    /// Connector that reports `app_name` to the server unless the URI sets `appName`
    #[must_use]
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            connect_timeout: None,
        }
    }

    /// Bound connecting and server selection by `timeout` unless the URI sets its own
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Parse client options from `uri`, build the client and ping the server
    pub fn connect(&self, uri: &ConnectionUri) -> BoxFuture<'static, Result<Client, ConnectError>> {
        open(
            uri.as_str().to_string(),
            uri.redacted(),
            self.app_name.clone(),
            self.connect_timeout,
        )
        .boxed()
    }
}

async fn open(
    url: String,
    target: String,
    app_name: String,
    timeout: Option<Duration>,
) -> Result<Client, ConnectError> {
    debug!("Parsing MongoDB client options for {}", target);
    let mut options = ClientOptions::parse(url.as_str())
        .await
        .map_err(|e| invalid_options(&e))?;
    if options.app_name.is_none() {
        options.app_name = Some(app_name);
    }
    if let Some(timeout) = timeout {
        options.connect_timeout.get_or_insert(timeout);
        options.server_selection_timeout.get_or_insert(timeout);
    }

    let client = Client::with_options(options).map_err(|e| invalid_options(&e))?;

    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| {
            error!("MongoDB at {} did not answer ping: {}", target, e);
            ConnectError::Unreachable {
                backend: Backend::Document,
                target: target.clone(),
                message: e.to_string(),
            }
        })?;

    info!("Connected to MongoDB at {}", target);
    Ok(client)
}

fn invalid_options(err: &mongodb::error::Error) -> ConnectError {
    ConnectError::InvalidOptions {
        backend: Backend::Document,
        message: err.to_string(),
    }
}
