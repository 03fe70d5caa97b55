//! File membership: which file paths belong to which notebook.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use hub_core::{normalize_paths, Backend, HubError, NotebookId, PathPicker, Result};

use crate::store::NotebookStore;

/// Tracks the ordered file list of each notebook.
///
/// The server owns membership order (insertion order). Writes check the
/// request against a fresh listing and re-fetch after success; the local
/// cache only serves reads. Writes go through [`Hub`](crate::Hub) so a
/// finished index is invalidated when membership changes.
pub struct FileMembership<B: Backend> {
    store: Arc<NotebookStore<B>>,
    cache: Mutex<HashMap<NotebookId, Vec<String>>>,
}

impl<B: Backend> FileMembership<B> {
    pub fn new(store: Arc<NotebookStore<B>>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the notebook's files from the server.
    pub async fn list_files(&self, id: NotebookId) -> Result<Vec<String>> {
        let files = self.store.backend().list_files(id).await?;
        self.put(id, files.clone())?;
        Ok(files)
    }

    /// Last known membership, without a remote call.
    pub fn cached(&self, id: NotebookId) -> Option<Vec<String>> {
        self.cache.lock().ok().and_then(|c| c.get(&id).cloned())
    }

    /// Add paths that are not already members on the server.
    ///
    /// Returns the paths actually sent. Adding only existing members is a
    /// no-op and issues no request.
    pub(crate) async fn add_files<S: AsRef<str>>(
        &self,
        id: NotebookId,
        paths: &[S],
    ) -> Result<Vec<String>> {
        let requested = normalize_paths(paths)?;
        self.store.resolve(id).await?;

        let current = self.list_files(id).await?;
        let new: Vec<String> = requested
            .into_iter()
            .filter(|p| !current.contains(p))
            .collect();

        if new.is_empty() {
            debug!(notebook = %id, "All paths already present, nothing to add");
            return Ok(new);
        }

        self.store.backend().add_files(id, &new).await?;
        info!("Added {} file(s) to notebook {}", new.len(), id);

        self.list_files(id).await?;
        Ok(new)
    }

    /// Remove paths that are members on the server; absent paths are
    /// ignored.
    ///
    /// Returns the paths actually removed.
    pub(crate) async fn remove_files<S: AsRef<str>>(
        &self,
        id: NotebookId,
        paths: &[S],
    ) -> Result<Vec<String>> {
        let requested = normalize_paths(paths)?;
        let current = self.list_files(id).await?;
        let present: Vec<String> = requested
            .into_iter()
            .filter(|p| current.contains(p))
            .collect();

        if present.is_empty() {
            debug!(notebook = %id, "No requested path is a member, nothing to remove");
            return Ok(present);
        }

        self.store.backend().remove_files(id, &present).await?;
        info!("Removed {} file(s) from notebook {}", present.len(), id);

        self.list_files(id).await?;
        Ok(present)
    }

    /// Ask the picker for a path and add it. A cancelled pick is a no-op.
    pub(crate) async fn add_from_picker(
        &self,
        id: NotebookId,
        picker: &dyn PathPicker,
    ) -> Result<Vec<String>> {
        match picker.pick()? {
            Some(path) => self.add_files(id, &[path]).await,
            None => {
                debug!(notebook = %id, "Path picker cancelled");
                Ok(Vec::new())
            }
        }
    }

    /// Drop the cached membership of a notebook.
    pub fn forget(&self, id: NotebookId) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(&id);
        }
    }

    /// Cached membership, fetched from the server on first use.
    pub async fn files(&self, id: NotebookId) -> Result<Vec<String>> {
        match self.cached(id) {
            Some(files) => Ok(files),
            None => self.list_files(id).await,
        }
    }

    fn put(&self, id: NotebookId, files: Vec<String>) -> Result<()> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|e| HubError::storage(e.to_string()))?;
        cache.insert(id, files);
        Ok(())
    }
}
