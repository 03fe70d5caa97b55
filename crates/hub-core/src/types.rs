//! Core domain types for the research hub.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ulid::Ulid;

use crate::error::HubError;

/// Global collection holding the basic (lightweight chunking) index.
pub const BASIC_COLLECTION: &str = "file_embeddings";

/// Global collection holding the advanced (heavier parsing) index.
pub const ADVANCED_COLLECTION: &str = "file_embeddings_unstructured";

/// Server-assigned notebook identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotebookId(pub i64);

impl std::fmt::Display for NotebookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NotebookId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for NotebookId {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| HubError::validation(format!("invalid notebook id: {:?}", s)))
    }
}

/// A named collection of file references with its own index and search scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    /// Unique identifier, assigned by the server.
    pub id: NotebookId,

    /// Display name (non-empty).
    pub name: String,

    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

/// Partial update of a notebook. `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotebookPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl NotebookPatch {
    /// Patch that only renames.
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            description: None,
        }
    }

    /// Patch that only changes the description.
    pub fn describe(description: impl Into<String>) -> Self {
        Self {
            name: None,
            description: Some(description.into()),
        }
    }

    /// Check whether the patch changes anything.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }

    /// Merge the patch onto an existing record, returning `(name, description)`.
    pub fn merge(&self, current: &Notebook) -> (String, String) {
        (
            self.name
                .as_ref()
                .map(|n| n.trim().to_string())
                .unwrap_or_else(|| current.name.clone()),
            self.description
                .clone()
                .unwrap_or_else(|| current.description.clone()),
        )
    }
}

/// Indexing strategy. Semantics are owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Lightweight chunking.
    #[default]
    Basic,
    /// Heavier parsing pipeline.
    Advanced,
}

impl IndexMode {
    /// Map the wire flag `use_advanced_indexing` to a mode.
    pub fn from_advanced(advanced: bool) -> Self {
        if advanced {
            Self::Advanced
        } else {
            Self::Basic
        }
    }

    /// The wire flag `use_advanced_indexing`.
    pub fn is_advanced(&self) -> bool {
        matches!(self, Self::Advanced)
    }

    /// Global collection backing this mode.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Basic => BASIC_COLLECTION,
            Self::Advanced => ADVANCED_COLLECTION,
        }
    }
}

impl std::fmt::Display for IndexMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Advanced => write!(f, "advanced"),
        }
    }
}

impl FromStr for IndexMode {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "advanced" => Ok(Self::Advanced),
            other => Err(HubError::validation(format!(
                "unknown indexing mode: {:?} (expected basic or advanced)",
                other
            ))),
        }
    }
}

/// Lifecycle of an indexing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Running,
    Done,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// An indexing job over a snapshot of a notebook's files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingJob {
    /// Job identifier (ULID), used to match completions to jobs.
    pub job_id: Ulid,

    /// Owning notebook.
    pub notebook_id: NotebookId,

    /// File paths submitted, in membership order.
    pub files: Vec<String>,

    /// Blake3 hash over the submitted paths.
    pub fingerprint: [u8; 32],

    /// Indexing mode.
    pub mode: IndexMode,

    /// Current status.
    pub status: JobStatus,

    /// Submission timestamp (Unix millis).
    pub started_at: u64,

    /// Completion timestamp (Unix millis).
    pub finished_at: Option<u64>,

    /// Failure message, set when `status` is `Failed`.
    pub error: Option<String>,
}

impl IndexingJob {
    /// Create a running job over a snapshot of files.
    pub fn start(notebook_id: NotebookId, files: Vec<String>, mode: IndexMode) -> Self {
        Self {
            job_id: Ulid::new(),
            notebook_id,
            fingerprint: fingerprint(&files),
            files,
            mode,
            status: JobStatus::Running,
            started_at: now_millis(),
            finished_at: None,
            error: None,
        }
    }

    /// Check whether the job covers exactly this file list.
    pub fn covers(&self, files: &[String]) -> bool {
        self.fingerprint == fingerprint(files)
    }

    /// Hex form of the fingerprint.
    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint)
    }
}

/// Hash an ordered list of paths.
pub fn fingerprint(files: &[String]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for file in files {
        hasher.update(file.as_bytes());
        hasher.update(&[0]);
    }
    *hasher.finalize().as_bytes()
}

/// How far search results for a notebook can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFreshness {
    /// No indexing job has ever been recorded.
    NotIndexed,
    /// A job is running; results may be incomplete.
    Indexing,
    /// The last job completed over the current membership.
    Fresh,
    /// Membership changed since the last completed job.
    Stale,
    /// The last job failed.
    Failed,
}

impl IndexFreshness {
    /// Whether search results can be trusted as complete.
    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Fresh)
    }
}

impl std::fmt::Display for IndexFreshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotIndexed => "not indexed",
            Self::Indexing => "indexing",
            Self::Fresh => "up to date",
            Self::Stale => "stale (re-index needed)",
            Self::Failed => "indexing failed",
        };
        write!(f, "{}", s)
    }
}

/// What a search runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTarget {
    /// A single notebook's basic or advanced index.
    Notebook { id: NotebookId, mode: IndexMode },
    /// A named global collection.
    Collection(String),
}

impl SearchTarget {
    /// Target a notebook.
    pub fn notebook(id: NotebookId, mode: IndexMode) -> Self {
        Self::Notebook { id, mode }
    }

    /// Target the global collection for a mode.
    pub fn global(mode: IndexMode) -> Self {
        Self::Collection(mode.collection().to_string())
    }

    /// The targeted notebook, if any.
    pub fn notebook_id(&self) -> Option<NotebookId> {
        match self {
            Self::Notebook { id, .. } => Some(*id),
            Self::Collection(_) => None,
        }
    }
}

impl std::fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notebook { id, mode } => write!(f, "notebook {} ({})", id, mode),
            Self::Collection(name) => write!(f, "collection {}", name),
        }
    }
}

/// Query parameters shared by notebook and global search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Natural-language query (non-empty).
    pub query: String,

    /// Number of passages to retrieve.
    pub top_k: u32,

    /// Prompt template content; omitted from the request when `None`.
    pub prompt_template: Option<String>,
}

/// A (file path, page) pair linking back to source material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Source file path as reported by the backend.
    pub file_path: String,

    /// Page label, when the backend knows it.
    pub page: Option<String>,
}

impl Citation {
    /// Create a citation.
    pub fn new(file_path: impl Into<String>, page: Option<String>) -> Self {
        Self {
            file_path: file_path.into(),
            page,
        }
    }

    /// Path encoded for the download endpoint.
    pub fn encoded_path(&self) -> String {
        crate::codec::encode_file_path(&self.file_path)
    }
}

impl std::fmt::Display for Citation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.page {
            Some(page) => write!(f, "{} (p. {})", self.file_path, page),
            None => write!(f, "{}", self.file_path),
        }
    }
}

/// The synthesized answer and its primary source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainResponse {
    pub text: String,
    pub source: Citation,
}

/// A secondary passage relevant to the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub document: String,
    pub source: Citation,
}

/// Result envelope of a single search call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The synthesized answer.
    pub main_response: MainResponse,

    /// Other passages, in relevance rank order as returned.
    pub other_passages: Vec<Passage>,
}

impl SearchResult {
    /// All citations: main response first, then passages in rank order.
    pub fn citations(&self) -> impl Iterator<Item = &Citation> {
        std::iter::once(&self.main_response.source)
            .chain(self.other_passages.iter().map(|p| &p.source))
    }
}

/// A selectable prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Stable identifier (`default`, `summary`, `custom`).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Template body with `{query}` and `{context}` placeholders.
    pub content: String,

    /// Whether this is the user-editable template.
    pub is_custom: bool,
}

/// State of a search session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl SessionStatus {
    /// Idle or terminal: the session can be dropped without side effects.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// Current time in Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
