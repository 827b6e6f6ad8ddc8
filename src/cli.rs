use crate::auth::Provider;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI interface for `conncache`
#[derive(Parser)]
#[command(name = "conncache")]
#[command(version = crate::VERSION)]
#[command(about = "conncache - shared database connections and social sign-in")]
#[command(
    long_about = "Open one database connection per process, shared by every caller, and manage the social-login session"
)]
pub struct Cli {
    /// Configuration file (defaults to ./conncache.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Open the database connection through the cache
    Connect {
        /// Number of concurrent callers sharing the connection attempt
        #[arg(long, default_value_t = 1, value_name = "N")]
        callers: usize,
    },
    /// Show the current session
    Session,
    /// Start social sign-in and print the provider URL
    SignIn {
        /// Social login provider
        #[arg(long, value_enum, default_value_t = Provider::Google)]
        provider: Provider,
        /// Where the auth server sends the browser afterwards
        #[arg(long, default_value = "/", value_name = "URL")]
        callback_url: String,
    },
    /// End the current session
    SignOut,
}

impl Cli {
    /// Parse command line arguments
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
