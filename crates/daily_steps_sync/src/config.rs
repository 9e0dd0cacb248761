use std::path::PathBuf;

use garmin_connect_client::token_store::TokenStore;
use secrecy::SecretString;

use crate::auth::Credentials;
use crate::error::{AppError, AppResult};

const DEFAULT_DAYS_BACK: u32 = 1;
/// One year plus a leap day.
pub const MAX_DAYS_BACK: u32 = 366;

#[derive(Clone, Debug)]
pub struct Config {
    pub garmin_email: String,
    pub garmin_password: SecretString,
    pub notion_token: SecretString,
    pub notion_database_id: String,
    /// Overrides `~/.garminconnect` when set.
    pub token_store_dir: Option<PathBuf>,
    pub garmin_sso_base_url: String,
    pub garmin_api_base_url: String,
    /// JSON document with the OAuth consumer key and secret.
    pub garmin_oauth_consumer_url: String,
    pub notion_base_url: String,
    pub days_back: u32,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function. Empty values count as missing.
    pub fn from_env_with<F>(mut get: F) -> AppResult<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut get = move |k: &str| get(k).filter(|v| !v.trim().is_empty());
        let mut required = |k: &str| get(k).ok_or_else(|| AppError::Config(format!("{k} missing")));

        let garmin_email = required("GARMIN_EMAIL")?;
        let garmin_password = required("GARMIN_PASSWORD")?;
        let notion_token = required("NOTION_TOKEN")?;
        let notion_database_id = required("NOTION_STEPS_DB_ID")?;

        let days_back = match get("SYNC_DAYS_BACK") {
            None => DEFAULT_DAYS_BACK,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if (1..=MAX_DAYS_BACK).contains(&n) => n,
                _ => {
                    return Err(AppError::Config(format!(
                        "SYNC_DAYS_BACK must be between 1 and {MAX_DAYS_BACK}, got {raw:?}"
                    )));
                }
            },
        };

        Ok(Self {
            garmin_email,
            garmin_password: SecretString::new(garmin_password.into()),
            notion_token: SecretString::new(notion_token.into()),
            notion_database_id,
            token_store_dir: get("GARMIN_TOKEN_STORE").map(PathBuf::from),
            garmin_sso_base_url: get("GARMIN_SSO_BASE_URL").unwrap_or_else(|| {
                garmin_connect_client::http_client::DEFAULT_SSO_BASE_URL.into()
            }),
            garmin_api_base_url: get("GARMIN_CONNECT_API_BASE_URL").unwrap_or_else(|| {
                garmin_connect_client::http_client::DEFAULT_API_BASE_URL.into()
            }),
            garmin_oauth_consumer_url: get("GARMIN_OAUTH_CONSUMER_URL").unwrap_or_else(|| {
                garmin_connect_client::http_client::DEFAULT_CONSUMER_URL.into()
            }),
            notion_base_url: get("NOTION_BASE_URL")
                .unwrap_or_else(|| notion_db_client::http_client::DEFAULT_BASE_URL.into()),
            days_back,
        })
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.garmin_email.clone(),
            password: self.garmin_password.clone(),
        }
    }

    pub fn token_store(&self) -> AppResult<TokenStore> {
        match &self.token_store_dir {
            Some(dir) => Ok(TokenStore::new(dir)),
            None => Ok(TokenStore::default_location()?),
        }
    }
}
