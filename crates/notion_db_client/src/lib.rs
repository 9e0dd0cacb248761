//! Minimal `NotionClient` trait covering database queries and page writes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value, json};
use thiserror::Error;

pub mod http_client;

#[derive(Debug, Error)]
pub enum NotionError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unauthorized: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("invalid request: {0}")]
    InvalidInput(String),
    #[error("api error (status {status}): {body}")]
    Api { status: u16, body: String },
}

impl NotionError {
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 | 422 => NotionError::InvalidInput(message),
            401 | 403 => NotionError::Auth(message),
            404 => NotionError::NotFound(message),
            429 => NotionError::RateLimited(message),
            _ => NotionError::Api {
                status,
                body: message,
            },
        }
    }
}

/// A typed page property value, serialized in Notion's wire shape.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Title(String),
    Integer(Option<u64>),
    Number(Option<f64>),
    Date(NaiveDate),
}

impl PropertyValue {
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Title(text) => json!({"title": [{"text": {"content": text}}]}),
            PropertyValue::Integer(n) => json!({"number": n}),
            PropertyValue::Number(n) => json!({"number": n}),
            PropertyValue::Date(d) => json!({"date": {"start": d.to_string()}}),
        }
    }
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Property name to value, as sent on create and update.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Database query filter.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    DateEquals { property: String, date: NaiveDate },
    TitleEquals { property: String, value: String },
}

impl Filter {
    pub fn to_json(&self) -> Value {
        match self {
            Filter::And(parts) => json!({"and": parts.iter().map(Filter::to_json).collect::<Vec<_>>()}),
            Filter::DateEquals { property, date } => {
                json!({"property": property, "date": {"equals": date.to_string()}})
            }
            Filter::TitleEquals { property, value } => {
                json!({"property": property, "title": {"equals": value}})
            }
        }
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// A database row as returned by the API. Properties stay in wire form;
/// callers read them through the typed accessors.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Page {
    /// Value of a `number` property. `None` when absent or null.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.properties.get(name)?.get("number")?.as_f64()
    }

    /// Value of a `number` property holding a whole non-negative number.
    pub fn integer(&self, name: &str) -> Option<u64> {
        let raw = self.properties.get(name)?.get("number")?;
        raw.as_u64().or_else(|| {
            raw.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        })
    }

    /// Concatenated plain text of a `title` property.
    pub fn title(&self, name: &str) -> Option<String> {
        let parts = self.properties.get(name)?.get("title")?.as_array()?;
        Some(
            parts
                .iter()
                .filter_map(|p| {
                    p.get("plain_text")
                        .or_else(|| p.get("text").and_then(|t| t.get("content")))
                        .and_then(Value::as_str)
                })
                .collect(),
        )
    }

    /// Start date of a `date` property.
    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        let start = self.properties.get(name)?.get("date")?.get("start")?.as_str()?;
        NaiveDate::parse_from_str(start.get(..10)?, "%Y-%m-%d").ok()
    }
}

#[async_trait]
pub trait NotionClient: Send + Sync + 'static {
    /// First page of rows in `database_id` matching `filter`.
    async fn query_database(
        &self,
        database_id: &str,
        filter: &Filter,
    ) -> Result<Vec<Page>, NotionError>;

    async fn create_page(
        &self,
        database_id: &str,
        properties: &Properties,
    ) -> Result<Page, NotionError>;

    async fn update_page(
        &self,
        page_id: &str,
        properties: &Properties,
    ) -> Result<Page, NotionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(props: Value) -> Page {
        serde_json::from_value(json!({"id": "p1", "properties": props})).expect("page")
    }

    #[test]
    fn property_values_use_wire_shapes() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            PropertyValue::Title("Walking".into()).to_json(),
            json!({"title": [{"text": {"content": "Walking"}}]})
        );
        assert_eq!(PropertyValue::Integer(Some(8000)).to_json(), json!({"number": 8000}));
        assert_eq!(PropertyValue::Integer(None).to_json(), json!({"number": null}));
        assert_eq!(PropertyValue::Number(Some(6.0)).to_json(), json!({"number": 6.0}));
        assert_eq!(
            PropertyValue::Date(date).to_json(),
            json!({"date": {"start": "2024-05-01"}})
        );
    }

    #[test]
    fn filter_serializes_nested_and() {
        let f = Filter::And(vec![
            Filter::DateEquals {
                property: "Date".into(),
                date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            },
            Filter::TitleEquals {
                property: "Activity Type".into(),
                value: "Walking".into(),
            },
        ]);
        assert_eq!(
            serde_json::to_value(&f).unwrap(),
            json!({"and": [
                {"property": "Date", "date": {"equals": "2024-05-01"}},
                {"property": "Activity Type", "title": {"equals": "Walking"}}
            ]})
        );
    }

    #[test]
    fn page_accessors_read_typed_values() {
        let p = page(json!({
            "Total Steps": {"type": "number", "number": 8000},
            "Total Distance (km)": {"type": "number", "number": 6.25},
            "Step Goal": {"type": "number", "number": null},
            "Activity Type": {"type": "title", "title": [{"plain_text": "Walk"}, {"plain_text": "ing"}]},
            "Date": {"type": "date", "date": {"start": "2024-05-01T00:00:00.000+00:00"}}
        }));
        assert_eq!(p.integer("Total Steps"), Some(8000));
        assert_eq!(p.number("Total Distance (km)"), Some(6.25));
        assert_eq!(p.integer("Step Goal"), None);
        assert_eq!(p.integer("Missing"), None);
        assert_eq!(p.title("Activity Type").as_deref(), Some("Walking"));
        assert_eq!(p.date("Date"), NaiveDate::from_ymd_opt(2024, 5, 1));
    }

    #[test]
    fn integer_accessor_accepts_whole_floats_only() {
        let p = page(json!({
            "A": {"number": 7000.0},
            "B": {"number": 7000.5}
        }));
        assert_eq!(p.integer("A"), Some(7000));
        assert_eq!(p.integer("B"), None);
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(NotionError::from_status(400, String::new()), NotionError::InvalidInput(_)));
        assert!(matches!(NotionError::from_status(401, String::new()), NotionError::Auth(_)));
        assert!(matches!(NotionError::from_status(404, String::new()), NotionError::NotFound(_)));
        assert!(matches!(
            NotionError::from_status(502, String::new()),
            NotionError::Api { status: 502, .. }
        ));
    }
}
