//! One synchronization pass: authenticate, fetch the date window, reconcile.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use garmin_connect_client::http_client::ReqwestGarminClient;
use garmin_connect_client::token_store::TokenStore;
use garmin_connect_client::{AuthSession, DailyStepRecord, GarminClient};
use notion_db_client::NotionClient;
use notion_db_client::http_client::ReqwestNotionClient;

use crate::auth::{self, ChallengeResponder, Credentials};
use crate::config::Config;
use crate::error::AppResult;
use crate::reconcile::{self, ReconcileAction};

/// Dates from `today - days_back` up to, excluding, `today`. Empty when
/// the start would fall before the calendar's range; `Config` bounds
/// `days_back` well inside it.
pub fn date_window(today: NaiveDate, days_back: u32) -> Vec<NaiveDate> {
    let Some(start) = today.checked_sub_days(Days::new(u64::from(days_back))) else {
        return Vec::new();
    };
    start.iter_days().take_while(|d| *d < today).collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl SyncReport {
    pub fn record(&mut self, action: ReconcileAction) {
        match action {
            ReconcileAction::Created => self.created += 1,
            ReconcileAction::Updated => self.updated += 1,
            ReconcileAction::Unchanged => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged
    }
}

pub struct StepSync {
    garmin: Arc<dyn GarminClient>,
    notion: Arc<dyn NotionClient>,
    token_store: TokenStore,
    credentials: Credentials,
    database_id: String,
    days_back: u32,
}

impl StepSync {
    pub fn new(
        config: &Config,
        garmin: Arc<dyn GarminClient>,
        notion: Arc<dyn NotionClient>,
        token_store: TokenStore,
    ) -> Self {
        Self {
            garmin,
            notion,
            token_store,
            credentials: config.credentials(),
            database_id: config.notion_database_id.clone(),
            days_back: config.days_back,
        }
    }

    /// Wire up the reqwest clients and token store described by `config`.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let garmin =
            ReqwestGarminClient::new(&config.garmin_sso_base_url, &config.garmin_api_base_url)?
                .with_consumer_url(config.garmin_oauth_consumer_url.as_str());
        let notion = ReqwestNotionClient::new(&config.notion_base_url, config.notion_token.clone())?;
        Ok(Self::new(
            config,
            Arc::new(garmin),
            Arc::new(notion),
            config.token_store()?,
        ))
    }

    /// Fetch each date of the window in order, one request per day.
    pub async fn fetch_records(
        &self,
        session: &AuthSession,
        dates: &[NaiveDate],
    ) -> AppResult<Vec<DailyStepRecord>> {
        let mut records = Vec::new();
        for &day in dates {
            records.extend(self.garmin.get_daily_steps(session, day, day).await?);
        }
        Ok(records)
    }

    /// Reconcile records one after another, stopping at the first failure.
    pub async fn reconcile_all(&self, records: &[DailyStepRecord]) -> AppResult<SyncReport> {
        let mut report = SyncReport::default();
        for record in records {
            let action =
                reconcile::reconcile_record(self.notion.as_ref(), &self.database_id, record)
                    .await?;
            report.record(action);
        }
        Ok(report)
    }

    pub async fn run(
        &self,
        today: NaiveDate,
        responder: &dyn ChallengeResponder,
    ) -> AppResult<SyncReport> {
        let session = auth::establish_session(
            self.garmin.as_ref(),
            &self.token_store,
            &self.credentials,
            responder,
        )
        .await?;

        let dates = date_window(today, self.days_back);
        tracing::info!(days = dates.len(), from = ?dates.first(), "fetching garmin daily steps");
        let records = self.fetch_records(&session, &dates).await?;

        let report = self.reconcile_all(&records).await?;
        tracing::info!(
            records = report.total(),
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            "daily steps sync finished"
        );
        Ok(report)
    }
}
