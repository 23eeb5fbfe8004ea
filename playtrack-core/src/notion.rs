use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use url::Url;

use crate::status::{ApiErrorClass, DEFAULT_REQUEST_TIMEOUT, build_http, classify_api_status};

const DEFAULT_BASE_URL: &str = "https://api.notion.com";
const NOTION_VERSION: &str = "2022-06-28";

#[derive(Debug, Error)]
pub enum NotionError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

impl NotionError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            NotionError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }
}

/// Client bound to a single Notion database.
#[derive(Clone)]
pub struct NotionClient {
    http: Client,
    base_url: Url,
    token: String,
    database_id: String,
}

impl NotionClient {
    pub fn new(
        token: impl Into<String>,
        database_id: impl Into<String>,
    ) -> Result<Self, NotionError> {
        Self::with_base_url(DEFAULT_BASE_URL, token, database_id)
    }

    pub fn with_base_url(
        base_url: &str,
        token: impl Into<String>,
        database_id: impl Into<String>,
    ) -> Result<Self, NotionError> {
        Ok(Self {
            http: build_http(DEFAULT_REQUEST_TIMEOUT)?,
            base_url: Url::parse(base_url)?,
            token: token.into(),
            database_id: database_id.into(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, NotionError> {
        self.http = build_http(timeout)?;
        Ok(self)
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    /// Fetches one page of database rows starting at `cursor`.
    pub async fn query_database(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<QueryPage, NotionError> {
        let url = self.endpoint(&format!("/v1/databases/{}/query", self.database_id))?;
        let mut body = Map::new();
        body.insert("page_size".into(), json!(page_size.clamp(1, 100)));
        if let Some(cursor) = cursor {
            body.insert("start_cursor".into(), json!(cursor));
        }
        let response = self.authorized(self.http.post(url)).json(&body).send().await?;
        Self::handle_response(response).await
    }

    /// Creates a row. Returns the new page id when the response carries one.
    pub async fn create_page(
        &self,
        properties: Map<String, Value>,
    ) -> Result<Option<String>, NotionError> {
        let url = self.endpoint("/v1/pages")?;
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": properties,
        });
        let response = self.authorized(self.http.post(url)).json(&body).send().await?;
        Self::handle_write(response).await
    }

    pub async fn update_page(
        &self,
        page_id: &str,
        properties: Map<String, Value>,
    ) -> Result<Option<String>, NotionError> {
        let url = self.endpoint(&format!("/v1/pages/{page_id}"))?;
        let body = json!({ "properties": properties });
        let response = self
            .authorized(self.http.patch(url))
            .json(&body)
            .send()
            .await?;
        Self::handle_write(response).await
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", NOTION_VERSION)
    }

    fn endpoint(&self, path: &str) -> Result<Url, NotionError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, NotionError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(NotionError::Api { status, body })
        }
    }

    /// A write succeeds on a 2xx status alone; the body is only mined for the page id.
    async fn handle_write(response: reqwest::Response) -> Result<Option<String>, NotionError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(NotionError::Api { status, body });
        }
        Ok(serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| value.get("id")?.as_str().map(str::to_owned)))
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QueryPage {
    #[serde(default)]
    pub results: Vec<DatabasePage>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabasePage {
    pub id: String,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl DatabasePage {
    /// Reads a `number` property as an item id. Missing, null, zero and
    /// non-integral values yield `None`.
    pub fn number_id(&self, property: &str) -> Option<u32> {
        let number = self.properties.get(property)?.get("number")?.as_f64()?;
        if number <= 0.0 || number.fract() != 0.0 || number > f64::from(u32::MAX) {
            return None;
        }
        Some(number as u32)
    }
}
