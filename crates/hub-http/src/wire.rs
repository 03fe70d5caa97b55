//! Request and response bodies, one struct per endpoint.

use serde::{Deserialize, Deserializer, Serialize};

use hub_core::{Citation, MainResponse, Notebook, NotebookId, Passage, SearchResult};

/// Body of `POST /notebooks` and `PUT /notebooks/{id}`.
#[derive(Debug, Serialize)]
pub struct NotebookBody<'a> {
    pub name: &'a str,
    pub description: &'a str,
}

/// A notebook as returned by `GET /notebooks` and `POST /notebooks`.
#[derive(Debug, Deserialize)]
pub struct NotebookRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<NotebookRecord> for Notebook {
    fn from(record: NotebookRecord) -> Self {
        Notebook {
            id: NotebookId(record.id),
            name: record.name,
            description: record.description.unwrap_or_default(),
        }
    }
}

/// Body of `POST/DELETE /notebooks/{id}/files`.
#[derive(Debug, Serialize)]
pub struct FilePathsBody<'a> {
    pub file_paths: &'a [String],
}

/// Reply of `GET /notebooks/{id}/files`.
#[derive(Debug, Deserialize)]
pub struct FilePathsReply {
    #[serde(default)]
    pub file_paths: Vec<String>,
}

/// Body of `POST /notebooks/{id}/index`.
#[derive(Debug, Serialize)]
pub struct IndexBody<'a> {
    pub file_paths: &'a [String],
    pub use_advanced_indexing: bool,
}

/// Query string of `GET /notebooks/{id}/search`.
#[derive(Debug, Serialize)]
pub struct NotebookSearchParams<'a> {
    pub query: &'a str,
    pub use_advanced_indexing: bool,
    pub top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<&'a str>,
}

/// Query string of `GET /rag_search`.
#[derive(Debug, Serialize)]
pub struct RagSearchParams<'a> {
    pub query: &'a str,
    pub collection_name: &'a str,
    pub top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<&'a str>,
}

/// Reply of both search endpoints.
#[derive(Debug, Deserialize)]
pub struct SearchReply {
    pub main_response: MainResponseRecord,
    #[serde(default)]
    pub other_relevant_passages: Vec<PassageRecord>,
}

#[derive(Debug, Deserialize)]
pub struct MainResponseRecord {
    pub response: String,
    pub source: SourceRecord,
}

#[derive(Debug, Deserialize)]
pub struct PassageRecord {
    pub document: String,
    pub metadata: SourceRecord,
}

/// Citation metadata. The indexer stores the page under `page`, the search
/// reply documents it as `page_number`. Either or both may be present;
/// `page_number` wins when both carry a usable label.
#[derive(Debug, Deserialize)]
pub struct SourceRecord {
    pub file_path: String,
    #[serde(default, deserialize_with = "page_label")]
    pub page_number: Option<String>,
    #[serde(default, deserialize_with = "page_label")]
    pub page: Option<String>,
}

impl From<SourceRecord> for Citation {
    fn from(source: SourceRecord) -> Self {
        Citation::new(source.file_path, source.page_number.or(source.page))
    }
}

impl From<SearchReply> for SearchResult {
    fn from(reply: SearchReply) -> Self {
        SearchResult {
            main_response: MainResponse {
                text: reply.main_response.response,
                source: reply.main_response.source.into(),
            },
            other_passages: reply
                .other_relevant_passages
                .into_iter()
                .map(|p| Passage {
                    document: p.document,
                    source: p.metadata.into(),
                })
                .collect(),
        }
    }
}

/// FastAPI-style error body.
#[derive(Debug, Deserialize)]
pub struct ErrorReply {
    pub detail: serde_json::Value,
}

impl ErrorReply {
    /// Human-readable detail.
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Page labels arrive as integers, strings, `"Unknown"` or null.
fn page_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("unknown") {
                None
            } else {
                Some(s.to_string())
            }
        }
        _ => None,
    })
}
