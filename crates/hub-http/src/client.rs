//! HTTP backend for the notebook service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use hub_core::{
    Backend, HubError, IndexMode, Notebook, NotebookId, Result, SearchQuery, SearchResult,
    ServerConfig,
};

use crate::wire::{
    ErrorReply, FilePathsBody, FilePathsReply, IndexBody, NotebookBody,
    NotebookRecord, NotebookSearchParams, RagSearchParams, SearchReply,
};

/// Talks to the notebook service over HTTP/JSON.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| HubError::Config {
            message: format!("invalid server base_url {:?}: {}", base_url, e),
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HubError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        debug!("Notebook service backend: {} (timeout {:?})", base_url, timeout);

        Ok(Self { client, base_url })
    }

    /// Create a backend from server configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    /// Base address requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and map transport failures and non-2xx statuses.
    async fn send(&self, what: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("{} timed out", what)
            } else {
                format!("{} failed: {}", what, e)
            };
            warn!("{}", message);
            HubError::remote(None, message)
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "{} ok", what);
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorReply>(&body)
            .map(|e| e.message())
            .unwrap_or(body);

        warn!(status = status.as_u16(), "{} rejected: {}", what, detail);

        Err(match status {
            StatusCode::NOT_FOUND => HubError::NotFound {
                resource: "remote resource",
                id: detail,
            },
            StatusCode::CONFLICT => HubError::conflict(detail),
            other => HubError::remote(Some(other.as_u16()), detail),
        })
    }

    async fn json<T: DeserializeOwned>(&self, what: &str, response: Response) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| HubError::remote(None, format!("{}: malformed response: {}", what, e)))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_notebooks(&self) -> Result<Vec<Notebook>> {
        let response = self
            .send("list notebooks", self.client.get(self.url("/notebooks")))
            .await?;
        let records: Vec<NotebookRecord> = self.json("list notebooks", response).await?;
        Ok(records.into_iter().map(Notebook::from).collect())
    }

    async fn create_notebook(&self, name: &str, description: &str) -> Result<Notebook> {
        let request = self
            .client
            .post(self.url("/notebooks"))
            .json(&NotebookBody { name, description });
        let response = self.send("create notebook", request).await?;
        let record: NotebookRecord = self.json("create notebook", response).await?;
        Ok(record.into())
    }

    async fn update_notebook(&self, id: NotebookId, name: &str, description: &str) -> Result<()> {
        let request = self
            .client
            .put(self.url(&format!("/notebooks/{}", id)))
            .json(&NotebookBody { name, description });
        self.send("update notebook", request).await?;
        Ok(())
    }

    async fn delete_notebook(&self, id: NotebookId) -> Result<()> {
        let request = self.client.delete(self.url(&format!("/notebooks/{}", id)));
        self.send("delete notebook", request).await?;
        Ok(())
    }

    async fn list_files(&self, id: NotebookId) -> Result<Vec<String>> {
        let request = self.client.get(self.url(&format!("/notebooks/{}/files", id)));
        let response = self.send("list files", request).await?;
        let reply: FilePathsReply = self.json("list files", response).await?;
        Ok(reply.file_paths)
    }

    async fn add_files(&self, id: NotebookId, paths: &[String]) -> Result<()> {
        let request = self
            .client
            .post(self.url(&format!("/notebooks/{}/files", id)))
            .json(&FilePathsBody { file_paths: paths });
        self.send("add files", request).await?;
        Ok(())
    }

    async fn remove_files(&self, id: NotebookId, paths: &[String]) -> Result<()> {
        let request = self
            .client
            .delete(self.url(&format!("/notebooks/{}/files", id)))
            .json(&FilePathsBody { file_paths: paths });
        self.send("remove files", request).await?;
        Ok(())
    }

    async fn index_files(&self, id: NotebookId, paths: &[String], mode: IndexMode) -> Result<()> {
        let request = self
            .client
            .post(self.url(&format!("/notebooks/{}/index", id)))
            .json(&IndexBody {
                file_paths: paths,
                use_advanced_indexing: mode.is_advanced(),
            });
        self.send("index files", request).await?;
        Ok(())
    }

    async fn search_notebook(
        &self,
        id: NotebookId,
        mode: IndexMode,
        query: &SearchQuery,
    ) -> Result<SearchResult> {
        let request = self
            .client
            .get(self.url(&format!("/notebooks/{}/search", id)))
            .query(&NotebookSearchParams {
                query: &query.query,
                use_advanced_indexing: mode.is_advanced(),
                top_k: query.top_k,
                prompt_template: query.prompt_template.as_deref(),
            });
        let response = self.send("notebook search", request).await?;
        let reply: SearchReply = self.json("notebook search", response).await?;
        Ok(reply.into())
    }

    async fn rag_search(&self, collection: &str, query: &SearchQuery) -> Result<SearchResult> {
        let request = self.client.get(self.url("/rag_search")).query(&RagSearchParams {
            query: &query.query,
            collection_name: collection,
            top_k: query.top_k,
            prompt_template: query.prompt_template.as_deref(),
        });
        let response = self.send("global search", request).await?;
        let reply: SearchReply = self.json("global search", response).await?;
        Ok(reply.into())
    }

    async fn health(&self) -> Result<()> {
        self.send("health check", self.client.get(self.url("/health")))
            .await?;
        Ok(())
    }

    fn download_url(&self, encoded_path: &str) -> String {
        let base = self.url("/download");
        match Url::parse_with_params(&base, &[("encoded_path", encoded_path)]) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}?encoded_path={}", base, encoded_path),
        }
    }
}
