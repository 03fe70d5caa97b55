//! Core traits defining the boundaries between the orchestration layer and
//! its collaborators.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{IndexMode, Notebook, NotebookId, SearchQuery, SearchResult};

/// The remote notebook service.
///
/// Every method is one request/response round trip; implementations never
/// retry. `HttpBackend` talks to the real server, `MemoryBackend` emulates it
/// in-process.
#[async_trait]
pub trait Backend: Send + Sync {
    // Notebook operations
    async fn list_notebooks(&self) -> Result<Vec<Notebook>>;
    async fn create_notebook(&self, name: &str, description: &str) -> Result<Notebook>;
    async fn update_notebook(&self, id: NotebookId, name: &str, description: &str) -> Result<()>;
    async fn delete_notebook(&self, id: NotebookId) -> Result<()>;

    // Membership operations
    async fn list_files(&self, id: NotebookId) -> Result<Vec<String>>;
    async fn add_files(&self, id: NotebookId, paths: &[String]) -> Result<()>;
    async fn remove_files(&self, id: NotebookId, paths: &[String]) -> Result<()>;

    // Indexing
    async fn index_files(&self, id: NotebookId, paths: &[String], mode: IndexMode) -> Result<()>;

    // Search operations
    async fn search_notebook(
        &self,
        id: NotebookId,
        mode: IndexMode,
        query: &SearchQuery,
    ) -> Result<SearchResult>;

    async fn rag_search(&self, collection: &str, query: &SearchQuery) -> Result<SearchResult>;

    /// Probe the service.
    async fn health(&self) -> Result<()>;

    /// Build the retrieval URL for an encoded file path.
    fn download_url(&self, encoded_path: &str) -> String;
}

/// Obtains zero or one file path from the user.
pub trait PathPicker: Send + Sync {
    /// Ask for a path. `Ok(None)` means the user cancelled.
    fn pick(&self) -> Result<Option<String>>;
}

/// Durable key/value slots for local state that must survive restarts.
pub trait SlotStore: Send + Sync {
    /// Read a slot.
    fn load(&self, slot: &str) -> Result<Option<String>>;

    /// Write a slot, replacing any previous value.
    fn save(&self, slot: &str, value: &str) -> Result<()>;

    /// Remove a slot. Removing an empty slot is not an error.
    fn clear(&self, slot: &str) -> Result<()>;
}

/// A picker that always returns the same answer.
#[derive(Debug, Clone, Default)]
pub struct FixedPicker(pub Option<String>);

impl PathPicker for FixedPicker {
    fn pick(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}
