//! Error type for the sync application.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("garmin error: {0}")]
    Garmin(#[from] garmin_connect_client::GarminError),

    #[error("notion error: {0}")]
    Notion(#[from] notion_db_client::NotionError),

    #[error("failed to read one-time code: {0}")]
    Prompt(#[source] std::io::Error),
}

/// Result type alias for sync operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("NOTION_TOKEN missing".into());
        assert_eq!(e.to_string(), "configuration error: NOTION_TOKEN missing");
    }

    #[test]
    fn wraps_client_errors() {
        let g: AppError = garmin_connect_client::GarminError::Auth("bad password".into()).into();
        assert_eq!(
            g.to_string(),
            "garmin error: authentication failed: bad password"
        );
        let n: AppError = notion_db_client::NotionError::NotFound("db".into()).into();
        assert_eq!(n.to_string(), "notion error: not found: db");
    }
}
