//! The hub: one context object owning every notebook-side component.

use std::sync::Arc;

use tracing::info;

use hub_core::{
    Backend, IndexFreshness, IndexMode, IndexingJob, Notebook, NotebookId, NotebookPatch,
    PathPicker, Result, SlotStore,
};

use crate::indexing::IndexingCoordinator;
use crate::membership::FileMembership;
use crate::prompts::PromptRegistry;
use crate::store::NotebookStore;

/// Application context.
///
/// Built once at startup. Operations that span components (delete cascade,
/// index invalidation on membership change) go through the hub so the
/// components never drift apart.
pub struct Hub<B: Backend> {
    store: Arc<NotebookStore<B>>,
    membership: FileMembership<B>,
    indexing: IndexingCoordinator<B>,
    prompts: Arc<PromptRegistry>,
}

impl<B: Backend> Hub<B> {
    /// Wire the components around one backend and one slot store.
    pub fn new(backend: Arc<B>, slots: Arc<dyn SlotStore>) -> Self {
        let store = Arc::new(NotebookStore::new(backend));
        Self {
            membership: FileMembership::new(store.clone()),
            indexing: IndexingCoordinator::new(store.clone()),
            prompts: Arc::new(PromptRegistry::new(slots)),
            store,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        self.store.backend()
    }

    pub fn store(&self) -> &Arc<NotebookStore<B>> {
        &self.store
    }

    /// Read access to membership; writes go through the hub.
    pub fn membership(&self) -> &FileMembership<B> {
        &self.membership
    }

    pub fn indexing(&self) -> &IndexingCoordinator<B> {
        &self.indexing
    }

    pub fn prompts(&self) -> &Arc<PromptRegistry> {
        &self.prompts
    }

    // Notebooks

    pub async fn refresh(&self) -> Result<Vec<Notebook>> {
        self.store.refresh().await
    }

    pub async fn create_notebook(&self, name: &str, description: &str) -> Result<Notebook> {
        self.store.create(name, description).await
    }

    pub async fn update_notebook(&self, id: NotebookId, patch: NotebookPatch) -> Result<Notebook> {
        self.store.update(id, patch).await
    }

    /// Delete a notebook and everything that refers to it.
    ///
    /// Search sessions holding the store notice on completion that their
    /// target is gone and discard the response.
    pub async fn delete_notebook(&self, id: NotebookId) -> Result<()> {
        self.store.delete(id).await?;
        self.membership.forget(id);
        self.indexing.forget(id);
        info!(notebook = %id, "Notebook state dropped");
        Ok(())
    }

    // Membership

    pub async fn list_files(&self, id: NotebookId) -> Result<Vec<String>> {
        self.membership.list_files(id).await
    }

    /// Add files; a finished index becomes stale if anything was added.
    pub async fn add_files<S: AsRef<str>>(
        &self,
        id: NotebookId,
        paths: &[S],
    ) -> Result<Vec<String>> {
        let added = self.membership.add_files(id, paths).await?;
        if !added.is_empty() {
            self.indexing.invalidate(id);
        }
        Ok(added)
    }

    /// Add the path chosen by `picker`, if any.
    pub async fn add_from_picker(
        &self,
        id: NotebookId,
        picker: &dyn PathPicker,
    ) -> Result<Vec<String>> {
        let added = self.membership.add_from_picker(id, picker).await?;
        if !added.is_empty() {
            self.indexing.invalidate(id);
        }
        Ok(added)
    }

    /// Remove files; a finished index becomes stale if anything was removed.
    pub async fn remove_files<S: AsRef<str>>(
        &self,
        id: NotebookId,
        paths: &[S],
    ) -> Result<Vec<String>> {
        let removed = self.membership.remove_files(id, paths).await?;
        if !removed.is_empty() {
            self.indexing.invalidate(id);
        }
        Ok(removed)
    }

    // Indexing

    /// Index the notebook's current membership.
    pub async fn start_indexing(&self, id: NotebookId, mode: IndexMode) -> Result<IndexingJob> {
        self.indexing.ensure_not_running(id)?;
        self.store.resolve(id).await?;
        let files = self.membership.list_files(id).await?;
        self.indexing.start(id, files, mode).await
    }

    /// Freshness of the notebook's index against its membership.
    pub async fn freshness(&self, id: NotebookId) -> Result<IndexFreshness> {
        let files = self.membership.files(id).await?;
        Ok(self.indexing.freshness(id, &files))
    }

    /// Probe the backend.
    pub async fn health(&self) -> Result<()> {
        self.store.backend().health().await
    }
}
