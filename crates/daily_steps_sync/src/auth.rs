//! Establishing an authenticated Garmin session.
//!
//! Stored tokens are tried first. When they are missing or no longer
//! accepted, a fresh login runs, pausing for a one-time code if the account
//! has a second factor, and the new tokens are written back so the next run
//! takes the quiet path again.

use std::io::{BufRead, Write};

use garmin_connect_client::token_store::TokenStore;
use garmin_connect_client::{AuthSession, GarminClient, LoginOutcome};
use secrecy::SecretString;

use crate::error::{AppError, AppResult};

const MFA_PROMPT: &str = "Enter the Garmin MFA code from your email: ";

#[derive(Clone, Debug)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

/// Supplies the one-time code when a login stops at the second factor.
pub trait ChallengeResponder: Send + Sync {
    fn respond(&self, prompt: &str) -> AppResult<String>;
}

/// Reads the code from standard input.
pub struct StdinResponder;

impl ChallengeResponder for StdinResponder {
    fn respond(&self, prompt: &str) -> AppResult<String> {
        let mut stderr = std::io::stderr();
        stderr.write_all(prompt.as_bytes()).map_err(AppError::Prompt)?;
        stderr.flush().map_err(AppError::Prompt)?;
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(AppError::Prompt)?;
        Ok(line.trim().to_string())
    }
}

/// Result of trying the stored tokens.
#[derive(Debug)]
pub enum RestoreOutcome {
    Restored(AuthSession),
    NotFound,
    Unreadable(String),
    /// The service refused the tokens or the handshake failed.
    Expired(String),
}

pub async fn restore_session(client: &dyn GarminClient, store: &TokenStore) -> RestoreOutcome {
    let tokens = match store.load() {
        Ok(Some(tokens)) => tokens,
        Ok(None) => return RestoreOutcome::NotFound,
        Err(e) => return RestoreOutcome::Unreadable(e.to_string()),
    };
    match client.resume_session(tokens).await {
        Ok(session) => RestoreOutcome::Restored(session),
        Err(e) => RestoreOutcome::Expired(e.to_string()),
    }
}

/// Produce a usable session, prompting only when a fresh login needs a
/// second factor. Errors after the restore attempt are fatal.
pub async fn establish_session(
    client: &dyn GarminClient,
    store: &TokenStore,
    credentials: &Credentials,
    responder: &dyn ChallengeResponder,
) -> AppResult<AuthSession> {
    match restore_session(client, store).await {
        RestoreOutcome::Restored(session) => {
            tracing::info!(user = %session.display_name, "garmin login via stored tokens");
            return Ok(session);
        }
        RestoreOutcome::NotFound => {
            tracing::info!(dir = %store.dir().display(), "no stored garmin tokens");
        }
        RestoreOutcome::Unreadable(reason) => {
            tracing::info!(%reason, "stored garmin tokens unreadable");
        }
        RestoreOutcome::Expired(reason) => {
            tracing::info!(%reason, "stored garmin tokens rejected");
        }
    }

    tracing::info!("starting new garmin login");
    let tokens = match client.login(&credentials.email, &credentials.password).await? {
        LoginOutcome::Authenticated(tokens) => tokens,
        LoginOutcome::NeedsMfa(challenge) => {
            let code = responder.respond(MFA_PROMPT)?;
            client.resume_login(challenge, &code).await?
        }
    };

    store.dump(&tokens)?;
    tracing::info!(dir = %store.dir().display(), "saved new garmin tokens");

    Ok(client.resume_session(tokens).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        EventLevels, MockGarmin, ScriptedResponder, credentials, sample_tokens,
    };
    use garmin_connect_client::GarminError;

    fn store() -> (tempfile::TempDir, TokenStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join(".garminconnect"));
        (dir, store)
    }

    #[tokio::test]
    async fn restore_without_tokens_is_not_found() {
        let (_dir, store) = store();
        let garmin = MockGarmin::new("good");
        assert!(matches!(
            restore_session(&garmin, &store).await,
            RestoreOutcome::NotFound
        ));
        assert!(garmin.calls().is_empty());
    }

    #[tokio::test]
    async fn restore_with_corrupt_tokens_is_unreadable() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.dir().join("oauth1_token.json"), "garbage").unwrap();
        std::fs::write(store.dir().join("oauth2_token.json"), "garbage").unwrap();
        let garmin = MockGarmin::new("good");
        assert!(matches!(
            restore_session(&garmin, &store).await,
            RestoreOutcome::Unreadable(_)
        ));
    }

    #[tokio::test]
    async fn restore_with_rejected_tokens_is_expired() {
        let (_dir, store) = store();
        store.dump(&sample_tokens("stale")).unwrap();
        let garmin = MockGarmin::new("good");
        assert!(matches!(
            restore_session(&garmin, &store).await,
            RestoreOutcome::Expired(_)
        ));
    }

    #[tokio::test]
    async fn valid_cache_skips_login_prompt_and_rewrite() {
        let (_dir, store) = store();
        let cached = sample_tokens("good");
        store.dump(&cached).unwrap();
        let oauth2_path = store.dir().join("oauth2_token.json");
        let before = std::fs::metadata(&oauth2_path).unwrap().modified().unwrap();

        let garmin = MockGarmin::new("good");
        let responder = ScriptedResponder::new("123456");
        let session = establish_session(&garmin, &store, &credentials(), &responder)
            .await
            .unwrap();

        assert_eq!(session.tokens, cached);
        assert_eq!(responder.prompt_count(), 0);
        assert_eq!(garmin.calls(), vec!["resume_session".to_string()]);
        let after = std::fs::metadata(&oauth2_path).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn missing_cache_with_mfa_prompts_once_then_saves() {
        let (_dir, store) = store();
        let garmin = MockGarmin::new("fresh").with_mfa();
        let responder = ScriptedResponder::new("123456");

        let session = establish_session(&garmin, &store, &credentials(), &responder)
            .await
            .unwrap();

        assert_eq!(responder.prompt_count(), 1);
        assert_eq!(session.tokens.oauth2.access_token, "fresh");
        assert_eq!(store.load().unwrap(), Some(sample_tokens("fresh")));
        assert_eq!(
            garmin.calls(),
            vec![
                "login".to_string(),
                "resume_login 123456".to_string(),
                "resume_session".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn expired_cache_without_mfa_logs_in_and_overwrites() {
        let (_dir, store) = store();
        store.dump(&sample_tokens("stale")).unwrap();
        let garmin = MockGarmin::new("fresh");
        let responder = ScriptedResponder::new("unused");

        establish_session(&garmin, &store, &credentials(), &responder)
            .await
            .unwrap();

        assert_eq!(responder.prompt_count(), 0);
        assert_eq!(store.load().unwrap(), Some(sample_tokens("fresh")));
    }

    #[tokio::test]
    async fn unusable_cache_falls_back_quietly() {
        let levels = EventLevels::default();
        let _guard = levels.install();

        let (_dir, store) = store();
        store.dump(&sample_tokens("stale")).unwrap();
        establish_session(
            &MockGarmin::new("fresh"),
            &store,
            &credentials(),
            &ScriptedResponder::new("unused"),
        )
        .await
        .unwrap();

        std::fs::write(store.dir().join("oauth1_token.json"), "garbage").unwrap();
        establish_session(
            &MockGarmin::new("fresh"),
            &store,
            &credentials(),
            &ScriptedResponder::new("unused"),
        )
        .await
        .unwrap();

        assert!(levels.count() > 0);
        assert_eq!(levels.at_or_above(tracing::Level::WARN), 0);
    }

    #[tokio::test]
    async fn wrong_mfa_code_is_fatal_and_nothing_is_saved() {
        let (_dir, store) = store();
        let garmin = MockGarmin::new("fresh").with_mfa();
        let responder = ScriptedResponder::new("000000");

        let err = establish_session(&garmin, &store, &credentials(), &responder)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Garmin(GarminError::Auth(_))));
        assert_eq!(responder.prompt_count(), 1);
        assert!(store.load().unwrap().is_none());
    }
}
