//! Upstream credential management.
//!
//! The pipeline consults [`AuthProvider::token`] exactly once per request
//! and attempts [`AuthProvider::refresh`] at most once when the credentials
//! are expired. Sign-in tooling and periodic refresh timers live outside
//! the gateway; [`CopilotAuth`] only exchanges an already-persisted GitHub
//! OAuth token for short-lived Copilot credentials.

use std::path::PathBuf;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::{GatewayError, GatewayResult};

const DEFAULT_API_ENDPOINT: &str = "https://api.githubcopilot.com";
const TOKEN_EXCHANGE_URL: &str = "https://api.github.com/copilot_internal/v2/token";

/// Refresh this many seconds before the reported expiry.
const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Credentials for one upstream call.
pub struct UpstreamCredentials {
    /// Base URL of the Copilot API.
    pub endpoint: String,

    /// Bearer token for the `Authorization` header.
    pub token: SecretString,

    /// Whether the token should be refreshed before use.
    pub expired: bool,

    /// Unix timestamp of the token expiry, when known.
    pub expires_at: Option<i64>,
}

/// Source of upstream credentials.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the current credentials without performing I/O upstream.
    async fn token(&self) -> GatewayResult<UpstreamCredentials>;

    /// Attempts to obtain fresh credentials. Returns false on failure.
    async fn refresh(&self) -> bool;
}

/// File-backed provider that exchanges a persisted GitHub OAuth token for
/// Copilot credentials.
pub struct CopilotAuth {
    client: reqwest::Client,
    token_path: PathBuf,
    exchange_url: String,
    editor_version: String,
    state: RwLock<Option<CachedToken>>,
}

struct CachedToken {
    endpoint: String,
    token: SecretString,
    expires_at: Option<i64>,
}

/// On-disk token state written by the sign-in tooling.
#[derive(Deserialize)]
struct TokenFile {
    #[serde(default)]
    github_token: Option<String>,

    #[serde(default)]
    oauth_token: Option<String>,

    #[serde(default)]
    token: Option<String>,
}

impl TokenFile {
    fn github_token(self) -> Option<String> {
        self.github_token.or(self.oauth_token).or(self.token)
    }
}

/// Response from the Copilot token exchange endpoint.
#[derive(Deserialize)]
struct ExchangeResponse {
    token: String,

    #[serde(default)]
    expires_at: Option<i64>,

    #[serde(default)]
    endpoints: Option<ExchangeEndpoints>,
}

#[derive(Deserialize)]
struct ExchangeEndpoints {
    #[serde(default)]
    api: Option<String>,
}

impl CopilotAuth {
    pub fn new(config: &config::Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_path: config.auth.token_path(),
            exchange_url: TOKEN_EXCHANGE_URL.to_string(),
            editor_version: config.upstream.editor_version.clone(),
            state: RwLock::new(None),
        }
    }

    /// Overrides the exchange endpoint, for tests.
    pub fn with_exchange_url(mut self, url: impl Into<String>) -> Self {
        self.exchange_url = url.into();
        self
    }

    async fn exchange(&self) -> GatewayResult<CachedToken> {
        let content = std::fs::read_to_string(&self.token_path).map_err(|e| {
            GatewayError::Authentication(format!(
                "cannot read token file {}: {e}; sign in first",
                self.token_path.display()
            ))
        })?;

        let token_file: TokenFile = serde_json::from_str(&content)
            .map_err(|e| GatewayError::Authentication(format!("malformed token file: {e}")))?;

        let github_token = token_file
            .github_token()
            .ok_or_else(|| GatewayError::Authentication("token file carries no GitHub token".to_string()))?;

        let response = self
            .client
            .get(self.exchange_url.as_str())
            .header("Authorization", format!("token {github_token}"))
            .header("Accept", "application/json")
            .header("Editor-Version", &self.editor_version)
            .send()
            .await
            .map_err(|e| GatewayError::Connection(format!("token exchange failed: {e}")))?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<empty response>".to_string());
            return Err(GatewayError::Authentication(format!(
                "token exchange returned {status}: {body}"
            )));
        }

        let exchange: ExchangeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Authentication(format!("malformed token exchange response: {e}")))?;

        Ok(CachedToken {
            endpoint: exchange
                .endpoints
                .and_then(|endpoints| endpoints.api)
                .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
            token: SecretString::from(exchange.token),
            expires_at: exchange.expires_at,
        })
    }
}

#[async_trait]
impl AuthProvider for CopilotAuth {
    async fn token(&self) -> GatewayResult<UpstreamCredentials> {
        let state = self.state.read().await;

        match &*state {
            Some(cached) => {
                let expired = cached
                    .expires_at
                    .is_some_and(|at| at - EXPIRY_MARGIN_SECONDS <= now_seconds());

                Ok(UpstreamCredentials {
                    endpoint: cached.endpoint.clone(),
                    token: cached.token.clone(),
                    expired,
                    expires_at: cached.expires_at,
                })
            }
            // No exchange has happened yet; report expired so the pipeline
            // triggers a refresh before the first upstream call.
            None => Ok(UpstreamCredentials {
                endpoint: DEFAULT_API_ENDPOINT.to_string(),
                token: SecretString::from(String::new()),
                expired: true,
                expires_at: None,
            }),
        }
    }

    async fn refresh(&self) -> bool {
        match self.exchange().await {
            Ok(cached) => {
                log::debug!("Copilot token refreshed, endpoint: {}", cached.endpoint);
                *self.state.write().await = Some(cached);
                true
            }
            Err(error) => {
                log::warn!("Copilot token refresh failed: {error}");
                false
            }
        }
    }
}

/// Provider with a fixed endpoint and token.
///
/// Useful for enterprise deployments with long-lived tokens, and for
/// pointing the gateway at a mock upstream in tests.
pub struct StaticTokenProvider {
    endpoint: String,
    token: SecretString,
}

impl StaticTokenProvider {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: SecretString::from(token.into()),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn token(&self) -> GatewayResult<UpstreamCredentials> {
        Ok(UpstreamCredentials {
            endpoint: self.endpoint.clone(),
            token: self.token.clone(),
            expired: false,
            expires_at: None,
        })
    }

    async fn refresh(&self) -> bool {
        true
    }
}

fn now_seconds() -> i64 {
    jiff::Timestamp::now().as_second()
}
