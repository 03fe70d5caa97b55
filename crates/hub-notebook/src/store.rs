//! Notebook store: the client's authoritative view of the notebook list.

use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use hub_core::{Backend, HubError, Notebook, NotebookId, NotebookPatch, Result};

/// Owns the local copy of the notebook list.
///
/// Every write goes to the backend first, then the list is re-fetched so the
/// local copy never drifts from edits made by other clients. Readers get
/// owned copies; the lock is never held across an `.await`.
pub struct NotebookStore<B: Backend> {
    backend: Arc<B>,
    notebooks: RwLock<Vec<Notebook>>,
}

impl<B: Backend> NotebookStore<B> {
    /// Create an empty store. Call [`refresh`](Self::refresh) to load.
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            notebooks: RwLock::new(Vec::new()),
        }
    }

    /// The backend this store writes through.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Fetch the authoritative list and replace the local copy.
    pub async fn refresh(&self) -> Result<Vec<Notebook>> {
        let fresh = self.backend.list_notebooks().await?;
        debug!(count = fresh.len(), "Notebook list refreshed");
        self.replace(fresh.clone())?;
        Ok(fresh)
    }

    /// Owned copy of the local list.
    pub fn list(&self) -> Vec<Notebook> {
        self.notebooks
            .read()
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    /// Look up a notebook in the local list.
    pub fn get(&self, id: NotebookId) -> Option<Notebook> {
        self.notebooks
            .read()
            .ok()
            .and_then(|list| list.iter().find(|n| n.id == id).cloned())
    }

    /// Check whether a notebook is in the local list.
    pub fn contains(&self, id: NotebookId) -> bool {
        self.get(id).is_some()
    }

    /// Look up a notebook, refreshing once if it is not known locally.
    pub async fn resolve(&self, id: NotebookId) -> Result<Notebook> {
        if let Some(notebook) = self.get(id) {
            return Ok(notebook);
        }
        self.refresh().await?;
        self.get(id).ok_or_else(|| HubError::not_found("notebook", id))
    }

    /// Create a notebook.
    pub async fn create(&self, name: &str, description: &str) -> Result<Notebook> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HubError::validation("notebook name must not be empty"));
        }

        let created = self.backend.create_notebook(name, description).await?;
        info!("Created notebook {} ({})", created.name, created.id);

        self.after_write(|list| {
            if !list.iter().any(|n| n.id == created.id) {
                list.push(created.clone());
            }
        })
        .await?;

        Ok(self.get(created.id).unwrap_or(created))
    }

    /// Apply a partial update and return the record as the server now has it.
    pub async fn update(&self, id: NotebookId, patch: NotebookPatch) -> Result<Notebook> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(HubError::validation("notebook name must not be empty"));
            }
        }

        let current = self.resolve(id).await?;
        let (name, description) = patch.merge(&current);

        self.backend
            .update_notebook(id, &name, &description)
            .await
            .map_err(|e| match e {
                HubError::NotFound { .. } => HubError::not_found("notebook", id),
                other => other,
            })?;
        info!("Updated notebook {}", id);

        // The PUT reply carries no record; read it back.
        self.refresh().await?;
        self.get(id).ok_or_else(|| HubError::not_found("notebook", id))
    }

    /// Delete a notebook from the server and the local list.
    ///
    /// Dependent state (membership caches, indexing jobs) is dropped by
    /// [`Hub::delete_notebook`](crate::Hub::delete_notebook).
    pub async fn delete(&self, id: NotebookId) -> Result<()> {
        self.backend.delete_notebook(id).await?;
        info!("Deleted notebook {}", id);

        self.after_write(|list| list.retain(|n| n.id != id)).await
    }

    /// Re-fetch after a successful write. If the re-fetch fails, fold the
    /// known effect of the write into the local copy instead.
    async fn after_write(&self, merge: impl FnOnce(&mut Vec<Notebook>)) -> Result<()> {
        match self.refresh().await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Refresh after write failed, merging locally: {}", e);
                let mut list = self
                    .notebooks
                    .write()
                    .map_err(|e| HubError::storage(e.to_string()))?;
                merge(&mut list);
                Ok(())
            }
        }
    }

    fn replace(&self, fresh: Vec<Notebook>) -> Result<()> {
        let mut list = self
            .notebooks
            .write()
            .map_err(|e| HubError::storage(e.to_string()))?;
        *list = fresh;
        Ok(())
    }
}
