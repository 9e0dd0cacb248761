//! In-memory `GarminClient` / `NotionClient` doubles and a scripted
//! challenge responder shared by the unit tests.
#![cfg(test)]

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use garmin_connect_client::{
    AuthSession, DailyStepRecord, GarminClient, GarminError, GarminTokens, LoginOutcome,
    MfaChallenge, OAuth1Token, OAuth2Token,
};
use notion_db_client::{Filter, NotionClient, NotionError, Page, Properties, PropertyValue};
use secrecy::SecretString;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

use crate::auth::{ChallengeResponder, Credentials};
use crate::error::AppResult;
use crate::schema;

pub fn sample_tokens(access_token: &str) -> GarminTokens {
    GarminTokens {
        oauth1: OAuth1Token {
            oauth_token: format!("oauth1-{access_token}"),
            oauth_token_secret: "secret".into(),
            mfa_token: None,
            domain: None,
        },
        oauth2: OAuth2Token {
            scope: None,
            jti: None,
            token_type: "Bearer".into(),
            access_token: access_token.into(),
            refresh_token: "refresh".into(),
            expires_in: 3600,
            expires_at: i64::MAX,
            refresh_token_expires_in: None,
            refresh_token_expires_at: None,
        },
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        email: "runner@example.com".into(),
        password: SecretString::new("pw".into()),
    }
}

/// Garmin double. Sessions are accepted only for `accepted_access_token`;
/// a fresh login issues tokens carrying that same access token.
pub struct MockGarmin {
    pub accepted_access_token: String,
    pub mfa_required: bool,
    pub mfa_code: String,
    pub records: Vec<DailyStepRecord>,
    fail_fetch: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockGarmin {
    pub fn new(accepted_access_token: &str) -> Self {
        Self {
            accepted_access_token: accepted_access_token.into(),
            mfa_required: false,
            mfa_code: "123456".into(),
            records: Vec::new(),
            fail_fetch: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_mfa(mut self) -> Self {
        self.mfa_required = true;
        self
    }

    pub fn with_records(mut self, records: Vec<DailyStepRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn fail_fetches(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record_call(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GarminClient for MockGarmin {
    async fn login(
        &self,
        _email: &str,
        _password: &SecretString,
    ) -> Result<LoginOutcome, GarminError> {
        self.record_call("login".into());
        if self.mfa_required {
            Ok(LoginOutcome::NeedsMfa(MfaChallenge {
                csrf_token: "csrf".into(),
            }))
        } else {
            Ok(LoginOutcome::Authenticated(sample_tokens(
                &self.accepted_access_token,
            )))
        }
    }

    async fn resume_login(
        &self,
        _challenge: MfaChallenge,
        code: &str,
    ) -> Result<GarminTokens, GarminError> {
        self.record_call(format!("resume_login {code}"));
        if code == self.mfa_code {
            Ok(sample_tokens(&self.accepted_access_token))
        } else {
            Err(GarminError::Auth("MFA code rejected".into()))
        }
    }

    async fn resume_session(&self, tokens: GarminTokens) -> Result<AuthSession, GarminError> {
        self.record_call("resume_session".into());
        if tokens.oauth2.access_token == self.accepted_access_token {
            Ok(AuthSession {
                tokens,
                display_name: "runner".into(),
            })
        } else {
            Err(GarminError::Auth("token expired".into()))
        }
    }

    async fn get_daily_steps(
        &self,
        _session: &AuthSession,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyStepRecord>, GarminError> {
        self.record_call(format!("get_daily_steps {start} {end}"));
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(GarminError::Api {
                status: 500,
                body: "boom".into(),
            });
        }
        Ok(self
            .records
            .iter()
            .filter(|r| r.calendar_date >= start && r.calendar_date <= end)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Write {
    Create {
        database_id: String,
        properties: Properties,
    },
    Update {
        page_id: String,
        properties: Properties,
    },
}

/// Notion double backed by a vector of pages. Filters are evaluated with
/// the same typed accessors the real rows are read with.
#[derive(Default)]
pub struct MockNotion {
    pages: Mutex<Vec<Page>>,
    writes: Mutex<Vec<Write>>,
    next_id: AtomicU32,
    fail_queries: AtomicBool,
}

impl MockNotion {
    pub fn insert_row(
        &self,
        date: NaiveDate,
        steps: Option<u64>,
        goal: Option<u64>,
        km: Option<f64>,
    ) -> String {
        let props = Properties::from([
            (schema::DATE.to_string(), PropertyValue::Date(date)),
            (
                schema::ACTIVITY_TYPE.to_string(),
                PropertyValue::Title(schema::WALKING.into()),
            ),
            (schema::TOTAL_STEPS.to_string(), PropertyValue::Integer(steps)),
            (schema::STEP_GOAL.to_string(), PropertyValue::Integer(goal)),
            (schema::TOTAL_DISTANCE_KM.to_string(), PropertyValue::Number(km)),
        ]);
        self.store_page(&props)
    }

    pub fn fail_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn row_count(&self) -> usize {
        self.pages.lock().unwrap().len()
    }

    fn store_page(&self, properties: &Properties) -> String {
        let id = format!("page-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let page = Page {
            id: id.clone(),
            properties: properties
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        };
        self.pages.lock().unwrap().push(page);
        id
    }
}

fn matches(filter: &Filter, page: &Page) -> bool {
    match filter {
        Filter::And(parts) => parts.iter().all(|f| matches(f, page)),
        Filter::DateEquals { property, date } => page.date(property) == Some(*date),
        Filter::TitleEquals { property, value } => {
            page.title(property).as_deref() == Some(value.as_str())
        }
    }
}

#[async_trait]
impl NotionClient for MockNotion {
    async fn query_database(
        &self,
        _database_id: &str,
        filter: &Filter,
    ) -> Result<Vec<Page>, NotionError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(NotionError::Api {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .filter(|p| matches(filter, p))
            .cloned()
            .collect())
    }

    async fn create_page(
        &self,
        database_id: &str,
        properties: &Properties,
    ) -> Result<Page, NotionError> {
        self.writes.lock().unwrap().push(Write::Create {
            database_id: database_id.into(),
            properties: properties.clone(),
        });
        let id = self.store_page(properties);
        Ok(Page {
            id,
            properties: Default::default(),
        })
    }

    async fn update_page(
        &self,
        page_id: &str,
        properties: &Properties,
    ) -> Result<Page, NotionError> {
        self.writes.lock().unwrap().push(Write::Update {
            page_id: page_id.into(),
            properties: properties.clone(),
        });
        let mut pages = self.pages.lock().unwrap();
        let page = pages
            .iter_mut()
            .find(|p| p.id == page_id)
            .ok_or_else(|| NotionError::NotFound(page_id.into()))?;
        for (k, v) in properties {
            page.properties.insert(k.clone(), v.to_json());
        }
        Ok(page.clone())
    }
}

/// Answers every prompt with a fixed code and counts how often it was asked.
pub struct ScriptedResponder {
    code: String,
    prompts: AtomicUsize,
}

impl ScriptedResponder {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.into(),
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl ChallengeResponder for ScriptedResponder {
    fn respond(&self, _prompt: &str) -> AppResult<String> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(self.code.clone())
    }
}

/// Records the level of every event emitted while installed.
#[derive(Clone, Default)]
pub struct EventLevels {
    levels: Arc<Mutex<Vec<tracing::Level>>>,
}

impl EventLevels {
    /// Capture events on the current thread until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(Registry::default().with(self.clone()))
    }

    pub fn count(&self) -> usize {
        self.levels.lock().unwrap().len()
    }

    /// `Level` orders verbosity, so `ERROR` is the smallest.
    pub fn at_or_above(&self, level: tracing::Level) -> usize {
        self.levels
            .lock()
            .unwrap()
            .iter()
            .filter(|l| **l <= level)
            .count()
    }
}

impl<S: tracing::Subscriber> Layer<S> for EventLevels {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.levels.lock().unwrap().push(*event.metadata().level());
    }
}
