//! HTTP client for the financing provider
//!
//! Token acquisition uses a client-credential exchange; the token is cached
//! under a mutex so concurrent callers wait for one refresh instead of racing
//! into several. Transport and 5xx failures are retried with bounded backoff;
//! 4xx responses are surfaced immediately.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;

use super::model::{
    GatewaySettings, ProviderLoanStatus, StatusHint, SubmitLoanPayload, SubmitOutcome,
    TokenResponse,
};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;

/// Errors surfaced by provider interactions
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Token exchange failed: {0}")]
    Token(String),

    #[error("Provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider response missing field: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Timeout | GatewayError::Transport(_) => true,
            GatewayError::Provider { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, skew_seconds: i64) -> bool {
        Utc::now() + chrono::Duration::seconds(skew_seconds) < self.expires_at
    }
}

/// Client for the financing provider API
pub struct GatewayClient {
    settings: GatewaySettings,
    http: Client,
    token: Mutex<Option<CachedToken>>,
}

impl GatewayClient {
    pub fn new(settings: GatewaySettings) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            settings,
            http,
            token: Mutex::new(None),
        }
    }

    /// Return a non-expired access token, fetching one if needed.
    ///
    /// The cache lock is held across the refresh so that concurrent callers
    /// with a stale cache produce a single token request.
    pub async fn get_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(self.settings.token_expiry_skew_seconds) {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);

        Ok(access_token)
    }

    /// Drop the cached token so the next call fetches a fresh one
    async fn invalidate_token(&self) {
        let mut cached = self.token.lock().await;
        *cached = None;
    }

    async fn fetch_token(&self) -> Result<CachedToken, GatewayError> {
        tracing::debug!("Requesting access token from financing provider");

        let response = self
            .http
            .post(format!("{}/token", self.settings.base_url))
            .json(&json!({
                "grant_type": "client_credentials",
                "client_id": self.settings.client_id,
                "client_secret": self.settings.client_secret,
            }))
            .send()
            .await
            .map_err(map_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Token(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Token(format!("Malformed token response: {}", e)))?;

        Ok(CachedToken {
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
            access_token: token.access_token,
        })
    }

    /// Submit a loan request to the provider.
    ///
    /// Transport and 5xx failures are retried up to [`MAX_ATTEMPTS`] with
    /// exponential backoff and jitter; a 401 is retried once with a fresh
    /// token; other 4xx responses fail immediately.
    pub async fn submit(&self, payload: &SubmitLoanPayload) -> Result<SubmitOutcome, GatewayError> {
        let raw = self
            .request_with_retries(|token| {
                self.http
                    .post(format!("{}/loan-requests", self.settings.base_url))
                    .bearer_auth(token)
                    .json(payload)
            })
            .await?;

        let external_id = raw
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::MalformedResponse("id".to_string()))?
            .to_string();
        let status = raw
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("under_analysis")
            .to_string();

        tracing::info!(
            external_id = %external_id,
            status = %status,
            reference = %payload.external_reference,
            "Loan request submitted to provider"
        );

        Ok(SubmitOutcome {
            external_id,
            status,
            raw,
        })
    }

    /// Read the provider's current status for a submitted request.
    ///
    /// Read-only: the caller decides what, if anything, to apply.
    pub async fn poll_status(
        &self,
        external_id: &str,
    ) -> Result<(StatusHint, serde_json::Value), GatewayError> {
        let raw = self
            .request_with_retries(|token| {
                self.http
                    .get(format!(
                        "{}/loan-requests/{}",
                        self.settings.base_url, external_id
                    ))
                    .bearer_auth(token)
            })
            .await?;

        let parsed: ProviderLoanStatus = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        Ok((StatusHint::from_provider(&parsed.status), raw))
    }

    /// Run one provider request with auth, a single 401 retry, and bounded
    /// backoff for transient failures.
    async fn request_with_retries<F>(&self, build: F) -> Result<serde_json::Value, GatewayError>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let mut auth_retried = false;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let token = self.get_token().await?;

            let outcome = match build(&token).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::UNAUTHORIZED && !auth_retried {
                        // Token rejected; refresh once and replay without
                        // consuming a transient-retry attempt.
                        auth_retried = true;
                        attempt -= 1;
                        self.invalidate_token().await;
                        continue;
                    }

                    if status.is_success() {
                        return response.json().await.map_err(map_transport);
                    }

                    let body = response.text().await.unwrap_or_default();
                    Err(GatewayError::Provider {
                        status: status.as_u16(),
                        body,
                    })
                }
                Err(e) => Err(map_transport(e)),
            };

            match outcome {
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = backoff_with_jitter(attempt);
                    tracing::warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

fn map_transport(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(err)
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = BACKOFF_BASE_MS * 2u64.pow(attempt.saturating_sub(1));
    let jitter = rand::thread_rng().gen_range(0..BACKOFF_BASE_MS / 2);
    Duration::from_millis(base + jitter)
}
