use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::Record,
    error::{ApiErrorEnvelope, FetchError},
    protocol::ListDocumentsResponse,
};
use tracing::debug;
use url::Url;

use crate::{AccessTokenSource, DocumentStore};

pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com";
const DEFAULT_DATABASE: &str = "(default)";

#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub base_url: String,
    pub project_id: String,
    pub database: String,
    pub page_size: Option<u32>,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_FIRESTORE_URL.to_string(),
            project_id: project_id.into(),
            database: DEFAULT_DATABASE.to_string(),
            page_size: None,
        }
    }
}

/// Reads whole collections through the document service's REST API.
pub struct FirestoreStore {
    http: Client,
    config: FirestoreConfig,
    tokens: Option<Arc<dyn AccessTokenSource>>,
}

impl FirestoreStore {
    pub fn new(http: Client, config: FirestoreConfig) -> Self {
        Self {
            http,
            config,
            tokens: None,
        }
    }

    pub fn with_access_tokens(mut self, tokens: Arc<dyn AccessTokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    fn collection_url(&self, name: &str) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|err| FetchError::new(name, format!("invalid document service url: {err}")))?;
        url.path_segments_mut()
            .map_err(|()| FetchError::new(name, "document service url cannot be a base"))?
            .pop_if_empty()
            .extend([
                "v1",
                "projects",
                self.config.project_id.as_str(),
                "databases",
                self.config.database.as_str(),
                "documents",
                name,
            ]);
        Ok(url)
    }

    async fn fetch_page(
        &self,
        name: &str,
        url: &Url,
        page_token: Option<&str>,
    ) -> Result<ListDocumentsResponse, FetchError> {
        let mut req = self.http.get(url.clone());
        if let Some(page_size) = self.config.page_size {
            req = req.query(&[("pageSize", page_size.to_string())]);
        }
        if let Some(token) = page_token {
            req = req.query(&[("pageToken", token)]);
        }
        if let Some(bearer) = self.tokens.as_ref().and_then(|t| t.access_token()) {
            req = req.bearer_auth(bearer);
        }

        let res = req
            .send()
            .await
            .map_err(|err| FetchError::new(name, err.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorEnvelope>(&body) {
                Ok(envelope) => envelope.error.message,
                Err(_) => format!("document service returned {status}"),
            };
            return Err(FetchError::new(name, message));
        }

        res.json::<ListDocumentsResponse>()
            .await
            .map_err(|err| FetchError::new(name, format!("invalid list response: {err}")))
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn fetch_collection(&self, name: &str) -> Result<Vec<Record>, FetchError> {
        let url = self.collection_url(name)?;
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.fetch_page(name, &url, page_token.as_deref()).await?;
            records.extend(page.documents.iter().map(|doc| doc.to_record()));
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) if page_token.as_deref() != Some(next.as_str()) => {
                    page_token = Some(next);
                }
                _ => break,
            }
        }

        debug!(collection = name, records = records.len(), "fetched collection");
        Ok(records)
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
