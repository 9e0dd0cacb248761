//! Minimal `GarminClient` trait and a reqwest-based Garmin Connect client.

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http_client;
pub mod oauth1;
pub mod sso;
pub mod token_store;

#[derive(Debug, Error)]
pub enum GarminError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("api error (status {status}): {body}")]
    Api { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("token store error: {0}")]
    TokenStore(String),
}

impl GarminError {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => GarminError::Auth(body),
            404 => GarminError::NotFound(body),
            429 => GarminError::RateLimited(body),
            _ => GarminError::Api { status, body },
        }
    }
}

/// One day of step activity as reported by Garmin Connect.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyStepRecord {
    pub calendar_date: NaiveDate,
    #[serde(default)]
    pub total_steps: Option<u64>,
    #[serde(default)]
    pub step_goal: Option<u64>,
    /// Meters.
    #[serde(default)]
    pub total_distance: Option<f64>,
}

#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct OAuth1Token {
    pub oauth_token: String,
    pub oauth_token_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct OAuth2Token {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub jti: Option<String>,
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    /// Unix seconds. Filled in locally when the service omits it.
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default)]
    pub refresh_token_expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token_expires_at: Option<i64>,
}

impl OAuth2Token {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Derive absolute expiry timestamps from the relative ones.
    pub fn stamp_expiry(&mut self, now: i64) {
        if self.expires_at == 0 {
            self.expires_at = now + self.expires_in;
        }
        if self.refresh_token_expires_at.is_none() {
            self.refresh_token_expires_at = self.refresh_token_expires_in.map(|secs| now + secs);
        }
    }
}

/// The token bundle persisted between runs.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GarminTokens {
    pub oauth1: OAuth1Token,
    pub oauth2: OAuth2Token,
}

impl std::fmt::Debug for GarminTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarminTokens")
            .field("oauth1", &"[REDACTED]")
            .field("oauth2_expires_at", &self.oauth2.expires_at)
            .finish()
    }
}

/// An authenticated handle: verified tokens plus the owner's display name.
#[derive(Clone, Debug)]
pub struct AuthSession {
    pub tokens: GarminTokens,
    pub display_name: String,
}

/// State needed to resume a login that stopped at the second factor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MfaChallenge {
    pub csrf_token: String,
}

#[derive(Clone, Debug)]
pub enum LoginOutcome {
    Authenticated(GarminTokens),
    NeedsMfa(MfaChallenge),
}

#[async_trait]
pub trait GarminClient: Send + Sync + 'static {
    /// Primary credential exchange. Returns control to the caller when a
    /// second factor is required instead of blocking.
    async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, GarminError>;

    /// Submit the one-time code for a pending second-factor challenge.
    async fn resume_login(
        &self,
        challenge: MfaChallenge,
        code: &str,
    ) -> Result<GarminTokens, GarminError>;

    /// Turn previously issued tokens into a verified session, refreshing the
    /// access token when it has expired.
    async fn resume_session(&self, tokens: GarminTokens) -> Result<AuthSession, GarminError>;

    /// Daily step summaries for `start..=end`.
    async fn get_daily_steps(
        &self,
        session: &AuthSession,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStepRecord>, GarminError>;
}
