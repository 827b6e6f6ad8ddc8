//! Client for the external auth server
//!
//! Social sign-in, sign-out and the "current session or none" read. The OAuth
//! dance itself happens between the browser, the auth server and the provider;
//! this client only calls the server's public HTTP endpoints.

use crate::config::{AuthConfig, ConfigError};
use chrono::{DateTime, Utc};
use reqwest::header::COOKIE;
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

/// Errors returned by the auth server client
#[derive(Debug, Error)]
pub enum AuthError {
    /// Transport failure or non-success status
    #[error("Auth server request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint URL could not be built
    #[error("Invalid auth endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// Sign-in succeeded but no provider URL came back
    #[error("Auth server returned no redirect URL for {provider}")]
    MissingRedirect {
        /// Provider that was requested
        provider: Provider,
    },

    /// Sign-out answered without confirming success
    #[error("Auth server did not confirm sign out")]
    SignOutRejected,
}

/// Social login providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google
    #[default]
    Google,
    /// GitHub
    Github,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Google => "google",
            Self::Github => "github",
        })
    }
}

/// Current session as reported by the auth server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    /// Session record
    pub session: SessionInfo,
    /// Signed-in user
    pub user: SessionUser,
}

/// Session record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session id
    pub id: String,
    /// Owning user id
    pub user_id: String,
    /// When the session stops being valid
    pub expires_at: DateTime<Utc>,
}

/// Signed-in user profile
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    /// User id
    pub id: String,
    /// Display name, if the provider shared one
    pub name: Option<String>,
    /// Email address
    pub email: String,
    /// Avatar URL
    pub image: Option<String>,
    /// Whether the provider verified the email
    #[serde(default)]
    pub email_verified: bool,
}

impl SessionUser {
    /// First character of the name, uppercased; `?` when the name is missing or empty
    ///
    /// Full case mapping applies, so `ß` becomes `SS`.
    #[must_use]
    pub fn initial(&self) -> String {
        self.name
            .as_deref()
            .and_then(|name| name.chars().next())
            .map_or_else(|| "?".to_string(), |c| c.to_uppercase().collect())
    }

    /// Name to show, falling back to `User`
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("User")
    }
}

impl Session {
    /// Whether the session has expired at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.session.expires_at <= now
    }
}

/// Where to send the user to finish social sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInRedirect {
    /// Provider being signed in with
    pub provider: Provider,
    /// Provider authorization URL
    pub url: String,
}

#[derive(Serialize)]
struct SocialSignInRequest<'a> {
    provider: Provider,
    #[serde(rename = "callbackURL")]
    callback_url: &'a str,
}

#[derive(Deserialize)]
struct SocialSignInResponse {
    url: Option<String>,
}

#[derive(Deserialize)]
struct SignOutResponse {
    #[serde(default)]
    success: bool,
}

/// HTTP client for the auth server
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: Url,
    session_cookie: Option<String>,
}

impl AuthClient {
    /// Client for `config.base_url` carrying `session_token` as the session cookie
    pub fn new(config: &AuthConfig, session_token: Option<String>) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason,
        };

        let mut base_url = Url::parse(&config.base_url).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("not a hierarchical URL".to_string()));
        }
        // Relative joins would otherwise replace the last path segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let session_cookie = session_token
            .filter(|token| !token.trim().is_empty())
            .map(|token| format!("{}={}", config.cookie_name, token.trim()));

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            session_cookie,
        })
    }

    /// Client whose session token is read from `config.session_token_env`
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let token = env::var(&config.session_token_env).ok();
        if token.is_none() {
            debug!(
                "Environment variable {} not set, requests carry no session",
                config.session_token_env
            );
        }
        Self::new(config, token)
    }

    /// Normalized base URL, always ending in `/`
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether a session cookie is attached to requests
    #[must_use]
    pub const fn has_session(&self) -> bool {
        self.session_cookie.is_some()
    }

    /// Absolute URL of an auth server endpoint
    pub fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        Ok(self.base_url.join(path)?)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, AuthError> {
        let url = self.endpoint(path)?;
        debug!("{} {}", method, url);
        let mut request = self.http.request(method, url);
        if let Some(cookie) = &self.session_cookie {
            request = request.header(COOKIE, cookie);
        }
        Ok(request)
    }

    /// Ask the auth server for the provider's authorization URL
    pub async fn sign_in_social(
        &self,
        provider: Provider,
        callback_url: &str,
    ) -> Result<SignInRedirect, AuthError> {
        info!("Starting {} sign in", provider);
        let response: SocialSignInResponse = self
            .request(Method::POST, "sign-in/social")?
            .json(&SocialSignInRequest {
                provider,
                callback_url,
            })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                error!("Authentication failed: {}", e);
                e
            })?
            .json()
            .await?;

        let url = response
            .url
            .filter(|url| !url.is_empty())
            .ok_or(AuthError::MissingRedirect { provider })?;
        Ok(SignInRedirect { provider, url })
    }

    /// End the current session
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        info!("Signing out");
        let response: SignOutResponse = self
            .request(Method::POST, "sign-out")?
            .json(&serde_json::json!({}))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                error!("Sign out failed: {}", e);
                e
            })?
            .json()
            .await?;

        if response.success {
            Ok(())
        } else {
            Err(AuthError::SignOutRejected)
        }
    }

    /// Current session, or `None` when signed out
    pub async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let session = self
            .request(Method::GET, "get-session")?
            .send()
            .await?
            .error_for_status()?
            .json::<Option<Session>>()
            .await?;
        Ok(session)
    }
}
