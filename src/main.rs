use conncache::cli::{Cli, Commands};
use conncache::commands::{connect, session};
use conncache::Config;
use std::process;
use tracing_subscriber::EnvFilter;

// Allow println in main CLI binary
#[allow(clippy::disallowed_methods)]
fn main() {
    init_logging();

    let cli = Cli::parse();
    tracing::info!("conncache CLI initialized");

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::disallowed_methods)]
fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    let Some(command) = cli.command else {
        println!("conncache - Use --help for available commands");
        return Ok(());
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        match command {
            Commands::Connect { callers } => connect::handle_connect(&config, callers).await,
            Commands::Session => Ok(session::handle_session(&config).await?),
            Commands::SignIn {
                provider,
                callback_url,
            } => Ok(session::handle_sign_in(&config, provider, &callback_url).await?),
            Commands::SignOut => Ok(session::handle_sign_out(&config).await?),
        }
    })
}

/// Initialize logging based on environment variables
fn init_logging() {
    // Default to INFO level, can be overridden by RUST_LOG environment variable
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("conncache=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
