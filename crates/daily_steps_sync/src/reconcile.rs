//! Per-record reconciliation of Garmin daily steps against the Notion database.

use chrono::NaiveDate;
use garmin_connect_client::DailyStepRecord;
use notion_db_client::NotionClient;

use crate::error::AppResult;
use crate::schema::{self, StepRow};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    Created,
    Updated,
    Unchanged,
}

/// Find the Walking row for `date`. Only the first match is considered.
pub async fn lookup_row(
    client: &dyn NotionClient,
    database_id: &str,
    date: NaiveDate,
) -> AppResult<Option<StepRow>> {
    let pages = client
        .query_database(database_id, &schema::row_filter(date))
        .await?;
    if pages.len() > 1 {
        tracing::debug!(%date, matches = pages.len(), "multiple rows match, using the first");
    }
    Ok(pages.first().map(StepRow::from_page))
}

/// Whether any tracked field of `row` differs from `record`.
///
/// Steps and goal are compared as nullable values with no zero
/// substitution; only the distance goes through the zero default.
pub fn needs_update(row: &StepRow, record: &DailyStepRecord) -> bool {
    row.total_steps != record.total_steps
        || row.step_goal != record.step_goal
        || row.total_distance_km != Some(schema::distance_km(record.total_distance))
}

/// Make the database reflect `record` with at most one write.
pub async fn reconcile_record(
    client: &dyn NotionClient,
    database_id: &str,
    record: &DailyStepRecord,
) -> AppResult<ReconcileAction> {
    let date = record.calendar_date;
    match lookup_row(client, database_id, date).await? {
        None => {
            client
                .create_page(database_id, &schema::create_properties(record))
                .await?;
            tracing::info!(%date, steps = ?record.total_steps, "created steps row");
            Ok(ReconcileAction::Created)
        }
        Some(row) if needs_update(&row, record) => {
            client
                .update_page(&row.page_id, &schema::update_properties(record))
                .await?;
            tracing::info!(%date, page_id = %row.page_id, steps = ?record.total_steps, "updated steps row");
            Ok(ReconcileAction::Updated)
        }
        Some(_) => {
            tracing::debug!(%date, "steps row up to date");
            Ok(ReconcileAction::Unchanged)
        }
    }
}
