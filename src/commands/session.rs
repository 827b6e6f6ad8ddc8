//! Session, sign-in and sign-out commands

use crate::auth::{AuthClient, Provider};
use crate::config::Config;
use crate::error::Result;
use chrono::Utc;
use tracing::info;

/// Handle the session command
#[allow(clippy::disallowed_methods)]
pub async fn handle_session(config: &Config) -> Result<()> {
    let client = AuthClient::from_config(&config.auth)?;

    match client.get_session().await? {
        Some(session) => {
            let user = &session.user;
            println!("👤 [{}] {} <{}>", user.initial(), user.display_name(), user.email);
            if let Some(image) = &user.image {
                println!("   Avatar: {image}");
            }
            if session.is_expired_at(Utc::now()) {
                println!("   ⚠️  Session expired at {}", session.session.expires_at);
            } else {
                println!("   Session valid until {}", session.session.expires_at);
            }
        }
        None => {
            println!("Not signed in");
        }
    }
    Ok(())
}

/// Handle the sign-in command
#[allow(clippy::disallowed_methods)]
pub async fn handle_sign_in(config: &Config, provider: Provider, callback_url: &str) -> Result<()> {
    let client = AuthClient::from_config(&config.auth)?;
    let redirect = client.sign_in_social(provider, callback_url).await?;

    info!("Received {} authorization URL", redirect.provider);
    println!("🔑 Continue signing in with {} at:", redirect.provider);
    println!("{}", redirect.url);
    Ok(())
}

/// Handle the sign-out command
#[allow(clippy::disallowed_methods)]
pub async fn handle_sign_out(config: &Config) -> Result<()> {
    let client = AuthClient::from_config(&config.auth)?;
    client.sign_out().await?;

    println!("👋 Signed out");
    println!("   Redirect: /");
    Ok(())
}
