//! `conncache` - lazily opened, shared database connections
//!
//! One [`ConnectionCache`] per process opens its database connection on first use,
//! lets concurrent callers share a single in-flight attempt, and forgets failed
//! attempts so the next caller can retry. The [`auth`] module talks to the external
//! social-login server.

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    missing_docs,
    rust_2018_idioms
)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

pub mod auth;
pub mod cache;
/// Command line interface definitions
pub mod cli;
/// Command handlers for the CLI
pub mod commands;
/// Configuration loading and validation
pub mod config;
pub mod connector;
pub mod database;
pub mod document;
/// Error types
pub mod error;

pub use auth::{AuthClient, Provider, Session};
pub use cache::ConnectionCache;
pub use config::{Config, ConnectionUri};
pub use connector::{Backend, Connector, DatabaseHandle, DriverConnector};
pub use database::DatabasePool;
pub use error::{ConnectError, Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
