//! HTTP client implementation for Garmin SSO and the Connect API.
//!
//! This module provides a reqwest-based implementation of the [`GarminClient`](crate::GarminClient) trait.

use std::sync::Arc;

use crate::oauth1::{self, Nonce, OAuthConsumer};
use crate::sso::{self, SigninPage};
use crate::{
    AuthSession, DailyStepRecord, GarminClient, GarminError, GarminTokens, LoginOutcome,
    MfaChallenge, OAuth1Token, OAuth2Token,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OnceCell;
use uuid::Uuid;

pub const DEFAULT_SSO_BASE_URL: &str = "https://sso.garmin.com";
pub const DEFAULT_API_BASE_URL: &str = "https://connectapi.garmin.com";
/// Published consumer credentials of the Connect mobile app.
pub const DEFAULT_CONSUMER_URL: &str = "https://thegarth.s3.amazonaws.com/oauth_consumer.json";

const USER_AGENT: &str = "com.garmin.android.apps.connectmobile";

/// Client for Garmin SSO and the Connect API using reqwest.
///
/// The SSO pages rely on cookies between the sign-in and MFA steps, so the
/// underlying client keeps a cookie jar for its whole lifetime.
#[derive(Clone, Debug)]
pub struct ReqwestGarminClient {
    sso_base: String,
    api_base: String,
    consumer_url: String,
    consumer: Arc<OnceCell<OAuthConsumer>>,
    client: reqwest::Client,
}

impl ReqwestGarminClient {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `sso_base` - Base URL of the SSO service (e.g., "https://sso.garmin.com")
    /// * `api_base` - Base URL of the Connect API (e.g., "https://connectapi.garmin.com")
    pub fn new(sso_base: &str, api_base: &str) -> Result<Self, GarminError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;
        Ok(Self {
            sso_base: sso_base.trim_end_matches('/').to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            consumer_url: DEFAULT_CONSUMER_URL.to_string(),
            consumer: Arc::new(OnceCell::new()),
            client,
        })
    }

    /// Fetch the OAuth consumer from `url` instead of the default location.
    pub fn with_consumer_url(mut self, url: impl Into<String>) -> Self {
        self.consumer_url = url.into();
        self
    }

    /// Use fixed consumer credentials; nothing is fetched.
    pub fn with_consumer(mut self, consumer: OAuthConsumer) -> Self {
        self.consumer = Arc::new(OnceCell::from(consumer));
        self
    }

    fn embed_url(&self) -> String {
        format!("{}/sso/embed", self.sso_base)
    }

    /// Query parameters shared by every SSO page.
    fn signin_params(&self) -> Vec<(&'static str, String)> {
        let embed = self.embed_url();
        vec![
            ("id", "gauth-widget".to_string()),
            ("embedWidget", "true".to_string()),
            ("gauthHost", embed.clone()),
            ("service", embed.clone()),
            ("source", embed.clone()),
            ("redirectAfterAccountLoginUrl", embed.clone()),
            ("redirectAfterAccountCreationUrl", embed),
        ]
    }

    /// Build an authenticated GET request against the Connect API.
    fn api_get(&self, session: &AuthSession, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&session.tokens.oauth2.access_token)
    }

    /// Execute a request and expect a JSON response.
    async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GarminError> {
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(self.error_from_response(resp).await);
        }
        Ok(resp.json::<T>().await?)
    }

    /// Execute a request and expect a text response.
    async fn execute_text(&self, request: reqwest::RequestBuilder) -> Result<String, GarminError> {
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(self.error_from_response(resp).await);
        }
        Ok(resp.text().await?)
    }

    /// Extract error information from a failed response.
    async fn error_from_response(&self, resp: reqwest::Response) -> GarminError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let body_snippet: String = body.chars().take(256).collect();
        GarminError::from_status(status, body_snippet)
    }

    /// Consumer credentials, fetched once per client.
    async fn consumer(&self) -> Result<&OAuthConsumer, GarminError> {
        self.consumer
            .get_or_try_init(|| async {
                tracing::debug!(url = %self.consumer_url, "fetching oauth consumer");
                self.execute_json::<OAuthConsumer>(self.client.get(&self.consumer_url))
                    .await
            })
            .await
    }

    /// OAuth1 `Authorization` header for a token endpoint call. `params`
    /// must be exactly the query or form parameters the request sends.
    async fn oauth1_header(
        &self,
        token: Option<&OAuth1Token>,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<String, GarminError> {
        let consumer = self.consumer().await?;
        let nonce = Uuid::new_v4().simple().to_string();
        oauth1::authorization_header(
            consumer,
            token,
            method,
            url,
            params,
            Nonce {
                nonce: &nonce,
                timestamp: Utc::now().timestamp(),
            },
        )
    }

    /// Trade an SSO service ticket for the OAuth1/OAuth2 token pair.
    async fn exchange_ticket(&self, ticket: &str) -> Result<GarminTokens, GarminError> {
        let url = format!(
            "{}/oauth-service/oauth/preauthorized",
            self.api_base
        );
        let login_url = self.embed_url();
        let query = [
            ("ticket", ticket),
            ("login-url", login_url.as_str()),
            ("accepts-mfa-tokens", "true"),
        ];
        let auth = self.oauth1_header(None, "GET", &url, &query).await?;
        let body = self
            .execute_text(
                self.client
                    .get(&url)
                    .query(&query)
                    .header(reqwest::header::AUTHORIZATION, auth),
            )
            .await?;
        let oauth1 = sso::parse_oauth1_body(&body)?;
        let oauth2 = self.exchange_oauth2(&oauth1).await?;
        Ok(GarminTokens { oauth1, oauth2 })
    }

    /// Signed with the OAuth1 token; its secret only feeds the signature.
    async fn exchange_oauth2(&self, oauth1: &OAuth1Token) -> Result<OAuth2Token, GarminError> {
        let url = format!(
            "{}/oauth-service/oauth/exchange/user/2.0",
            self.api_base
        );
        let mut form: Vec<(&str, &str)> = Vec::new();
        if let Some(mfa) = oauth1.mfa_token.as_deref() {
            form.push(("mfa_token", mfa));
        }
        let auth = self.oauth1_header(Some(oauth1), "POST", &url, &form).await?;
        let mut oauth2: OAuth2Token = self
            .execute_json(
                self.client
                    .post(&url)
                    .header(reqwest::header::AUTHORIZATION, auth)
                    .form(&form),
            )
            .await?;
        oauth2.stamp_expiry(Utc::now().timestamp());
        Ok(oauth2)
    }

    /// Turn a sign-in page into a login outcome, exchanging the ticket on success.
    async fn finish_signin(&self, html: &str) -> Result<LoginOutcome, GarminError> {
        match sso::classify_signin_page(html)? {
            SigninPage::Success { ticket } => {
                tracing::debug!("garmin sso: ticket issued");
                Ok(LoginOutcome::Authenticated(self.exchange_ticket(&ticket).await?))
            }
            SigninPage::NeedsMfa { csrf_token } => {
                tracing::debug!("garmin sso: second factor required");
                Ok(LoginOutcome::NeedsMfa(MfaChallenge { csrf_token }))
            }
        }
    }
}

#[async_trait]
impl GarminClient for ReqwestGarminClient {
    async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, GarminError> {
        let url = format!("{}/sso/signin", self.sso_base);
        let params = self.signin_params();

        let page = self
            .execute_text(self.client.get(&url).query(&params))
            .await?;
        let csrf = sso::csrf_token(&page)?;

        let form = [
            ("username", email),
            ("password", password.expose_secret()),
            ("embed", "true"),
            ("_csrf", csrf.as_str()),
        ];
        let html = self
            .execute_text(self.client.post(&url).query(&params).form(&form))
            .await?;
        self.finish_signin(&html).await
    }

    async fn resume_login(
        &self,
        challenge: MfaChallenge,
        code: &str,
    ) -> Result<GarminTokens, GarminError> {
        let url = format!("{}/sso/verifyMFA/loginEnterMfaCode", self.sso_base);
        let form = [
            ("mfa-verification-code", code),
            ("embed", "true"),
            ("_csrf", challenge.csrf_token.as_str()),
            ("fromPage", "setupEnterMfaCode"),
        ];
        let html = self
            .execute_text(self.client.post(&url).query(&self.signin_params()).form(&form))
            .await?;
        match self.finish_signin(&html).await? {
            LoginOutcome::Authenticated(tokens) => Ok(tokens),
            LoginOutcome::NeedsMfa(_) => Err(GarminError::Auth("MFA code rejected".into())),
        }
    }

    async fn resume_session(&self, mut tokens: GarminTokens) -> Result<AuthSession, GarminError> {
        if tokens.oauth2.is_expired_at(Utc::now().timestamp()) {
            tracing::debug!("garmin access token expired, refreshing from oauth1 token");
            tokens.oauth2 = self.exchange_oauth2(&tokens.oauth1).await?;
        }

        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SocialProfile {
            display_name: Option<String>,
        }

        let url = format!("{}/userprofile-service/socialProfile", self.api_base);
        let profile: SocialProfile = self
            .execute_json(
                self.client
                    .get(&url)
                    .bearer_auth(&tokens.oauth2.access_token),
            )
            .await?;
        let display_name = profile
            .display_name
            .ok_or_else(|| GarminError::Protocol("profile has no displayName".into()))?;
        Ok(AuthSession {
            tokens,
            display_name,
        })
    }

    async fn get_daily_steps(
        &self,
        session: &AuthSession,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStepRecord>, GarminError> {
        let path = format!("/usersummary-service/stats/steps/daily/{start}/{end}");
        tracing::debug!(%start, %end, "fetching daily steps");
        self.execute_json(self.api_get(session, &path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_new_trims_trailing_slash() {
        let client = ReqwestGarminClient::new("http://sso.local/", "http://api.local/").unwrap();
        assert_eq!(client.embed_url(), "http://sso.local/sso/embed");
        assert_eq!(client.api_base, "http://api.local");
    }

    #[test]
    fn signin_params_point_at_embed() {
        let client = ReqwestGarminClient::new("http://sso.local", "http://api.local").unwrap();
        let params = client.signin_params();
        assert!(params.contains(&("service", "http://sso.local/sso/embed".to_string())));
        assert!(params.contains(&("embedWidget", "true".to_string())));
    }
}
