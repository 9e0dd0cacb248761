//! HTTP client implementation for the Notion API.
//!
//! This module provides a reqwest-based implementation of the [`NotionClient`](crate::NotionClient) trait.

use crate::{Filter, NotionClient, NotionError, Page, Properties};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://api.notion.com";
pub const NOTION_VERSION: &str = "2022-06-28";

/// Client for the Notion API using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestNotionClient {
    base_url: String,
    token: SecretString,
    client: reqwest::Client,
}

impl ReqwestNotionClient {
    /// Create a new client instance.
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Notion API (e.g., "https://api.notion.com")
    /// * `token` - Integration token sent as a bearer credential
    pub fn new(base_url: &str, token: SecretString) -> Result<Self, NotionError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    /// Build an authenticated request carrying the API version header.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(self.token.expose_secret())
            .header("Notion-Version", NOTION_VERSION)
    }

    /// Execute a request and expect a JSON response.
    async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, NotionError> {
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(self.error_from_response(resp).await);
        }
        Ok(resp.json::<T>().await?)
    }

    /// Extract error information from a failed response, preferring the
    /// `message` field of Notion's error object.
    async fn error_from_response(&self, resp: reqwest::Response) -> NotionError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| body.chars().take(256).collect());
        NotionError::from_status(status, message)
    }
}

#[async_trait]
impl NotionClient for ReqwestNotionClient {
    async fn query_database(
        &self,
        database_id: &str,
        filter: &Filter,
    ) -> Result<Vec<Page>, NotionError> {
        #[derive(serde::Deserialize)]
        struct QueryResponse {
            #[serde(default)]
            results: Vec<Page>,
        }

        let path = format!("/v1/databases/{database_id}/query");
        tracing::debug!(database_id, "querying notion database");
        let resp: QueryResponse = self
            .execute_json(
                self.request(reqwest::Method::POST, &path)
                    .json(&json!({ "filter": filter })),
            )
            .await?;
        Ok(resp.results)
    }

    async fn create_page(
        &self,
        database_id: &str,
        properties: &Properties,
    ) -> Result<Page, NotionError> {
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": properties,
        });
        self.execute_json(self.request(reqwest::Method::POST, "/v1/pages").json(&body))
            .await
    }

    async fn update_page(
        &self,
        page_id: &str,
        properties: &Properties,
    ) -> Result<Page, NotionError> {
        let path = format!("/v1/pages/{page_id}");
        self.execute_json(
            self.request(reqwest::Method::PATCH, &path)
                .json(&json!({ "properties": properties })),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_new_trims_trailing_slash() {
        let client =
            ReqwestNotionClient::new("http://localhost/", SecretString::new("tok".into())).unwrap();
        assert_eq!(client.base_url, "http://localhost");
    }
}
