//! Column layout of the Notion steps database and the mapping from a
//! Garmin daily record to row properties.

use chrono::NaiveDate;
use garmin_connect_client::DailyStepRecord;
use notion_db_client::{Filter, Page, Properties, PropertyValue};

pub const DATE: &str = "Date";
pub const ACTIVITY_TYPE: &str = "Activity Type";
pub const TOTAL_STEPS: &str = "Total Steps";
pub const STEP_GOAL: &str = "Step Goal";
pub const TOTAL_DISTANCE_KM: &str = "Total Distance (km)";

pub const WALKING: &str = "Walking";

/// The tracked fields of an existing steps row.
#[derive(Clone, Debug, PartialEq)]
pub struct StepRow {
    pub page_id: String,
    pub total_steps: Option<u64>,
    pub step_goal: Option<u64>,
    pub total_distance_km: Option<f64>,
}

impl StepRow {
    pub fn from_page(page: &Page) -> Self {
        Self {
            page_id: page.id.clone(),
            total_steps: page.integer(TOTAL_STEPS),
            step_goal: page.integer(STEP_GOAL),
            total_distance_km: page.number(TOTAL_DISTANCE_KM),
        }
    }
}

/// Meters to kilometers rounded to two decimals. Missing distance is zero.
///
/// Rounds the exact binary value of the quotient, so 15 m is 0.01 km
/// (0.015 is stored just below the half).
pub fn distance_km(meters: Option<f64>) -> f64 {
    let km = meters.unwrap_or(0.0) / 1000.0;
    format!("{km:.2}").parse().unwrap_or(km)
}

/// Exact match on `(Date, Activity Type = Walking)`.
pub fn row_filter(date: NaiveDate) -> Filter {
    Filter::And(vec![
        Filter::DateEquals {
            property: DATE.into(),
            date,
        },
        Filter::TitleEquals {
            property: ACTIVITY_TYPE.into(),
            value: WALKING.into(),
        },
    ])
}

/// Properties rewritten on update: the three numbers plus the activity label.
pub fn update_properties(record: &DailyStepRecord) -> Properties {
    Properties::from([
        (ACTIVITY_TYPE.to_string(), PropertyValue::Title(WALKING.into())),
        (TOTAL_STEPS.to_string(), PropertyValue::Integer(record.total_steps)),
        (STEP_GOAL.to_string(), PropertyValue::Integer(record.step_goal)),
        (
            TOTAL_DISTANCE_KM.to_string(),
            PropertyValue::Number(Some(distance_km(record.total_distance))),
        ),
    ])
}

/// Properties for a new row: the update set plus the date key.
pub fn create_properties(record: &DailyStepRecord) -> Properties {
    let mut props = update_properties(record);
    props.insert(DATE.to_string(), PropertyValue::Date(record.calendar_date));
    props
}
