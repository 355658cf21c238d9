//! Token acquisition with caching.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::credentials::CredentialStore;
use super::token::{is_fresh, AuthToken, TokenResponse};
use crate::config::AppixConfig;
use crate::errors::AuthError;

/// Exchanges a refresh secret for a new access token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Performs one refresh call. Implementations must not retry.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;
}

/// Token source talking to the identity provider over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTokenSource {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTokenSource {
    /// Creates a source posting to `{refresh_token_url}{api_key}`.
    #[must_use]
    pub fn new(client: reqwest::Client, refresh_token_url: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: format!("{refresh_token_url}{api_key}"),
        }
    }

    /// Returns the full refresh endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            }))
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| AuthError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Default)]
struct TokenState {
    refresh_token: Option<String>,
    cached: Option<AuthToken>,
}

/// Hands out bearer tokens, refreshing them lazily.
///
/// The cached token is reused while it is valid for longer than the safety
/// margin. Refreshes are serialized: concurrent callers wait for the one in
/// flight and then see its token. A failed refresh is reported to the caller
/// and never retried here.
pub struct TokenProvider {
    source: Arc<dyn TokenSource>,
    store: Option<CredentialStore>,
    margin: Duration,
    state: Mutex<TokenState>,
}

impl TokenProvider {
    /// Default safety margin before expiry.
    pub const DEFAULT_MARGIN_SECONDS: i64 = 60;

    /// Creates a provider reading its refresh secret from `store`.
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>, store: CredentialStore) -> Self {
        Self {
            source,
            store: Some(store),
            margin: Duration::seconds(Self::DEFAULT_MARGIN_SECONDS),
            state: Mutex::new(TokenState::default()),
        }
    }

    /// Creates a provider with an in-memory refresh secret.
    #[must_use]
    pub fn with_refresh_token(source: Arc<dyn TokenSource>, refresh_token: impl Into<String>) -> Self {
        Self {
            source,
            store: None,
            margin: Duration::seconds(Self::DEFAULT_MARGIN_SECONDS),
            state: Mutex::new(TokenState {
                refresh_token: Some(refresh_token.into()),
                cached: None,
            }),
        }
    }

    /// Builds a provider from the tool configuration.
    #[must_use]
    pub fn from_config(config: &AppixConfig, client: reqwest::Client) -> Self {
        let source = HttpTokenSource::new(client, &config.refresh_token_url, &config.api_key);
        let provider = Self::new(Arc::new(source), CredentialStore::new(&config.auth_file_path));
        match Duration::try_seconds(config.token_safety_margin_seconds) {
            Some(margin) => provider.with_margin(margin),
            None => {
                warn!(
                    seconds = config.token_safety_margin_seconds,
                    "Token safety margin out of range, using default"
                );
                provider
            }
        }
    }

    /// Sets the safety margin.
    #[must_use]
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    /// Returns a valid token, refreshing if needed.
    pub async fn token(&self) -> Result<AuthToken, AuthError> {
        self.token_at(Utc::now()).await
    }

    /// Returns a token valid at `now`, refreshing if needed.
    pub async fn token_at(&self, now: DateTime<Utc>) -> Result<AuthToken, AuthError> {
        let mut state = self.state.lock().await;

        if let Some(token) = state.cached.as_ref().filter(|t| is_fresh(t, now, self.margin)) {
            debug!(expires_at = %token.expires_at, "Reusing cached token");
            return Ok(token.clone());
        }

        let refresh_token = match state.refresh_token.clone() {
            Some(secret) => secret,
            None => {
                let store = self.store.as_ref().ok_or_else(|| {
                    AuthError::Request("no refresh token configured".to_string())
                })?;
                store.load()?.refresh_token
            }
        };

        debug!("Refreshing access token");
        let response = self.source.refresh(&refresh_token).await?;
        let token = response.into_token(now, &refresh_token)?;

        if token.refresh_token != refresh_token {
            info!("Identity provider rotated the refresh token");
            if let Some(store) = &self.store {
                if let Err(error) = store.save_refresh_token(&token.refresh_token) {
                    warn!(error = %error, "Could not persist rotated refresh token");
                }
            }
        }

        state.refresh_token = Some(token.refresh_token.clone());
        state.cached = Some(token.clone());
        Ok(token)
    }

    /// Drops the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        self.state.lock().await.cached = None;
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("store", &self.store)
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}
