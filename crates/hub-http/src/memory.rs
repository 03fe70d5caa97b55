//! In-process emulation of the notebook service.
//!
//! Mirrors the server's observable behavior closely enough for the
//! orchestration layer to be tested without a network: duplicate names are
//! rejected with 409, duplicate file links are ignored, membership keeps
//! insertion order, and searching a notebook that was never indexed is a 404.
//!
//! Tests can also inspect the call log, inject one-shot failures, and hold
//! calls in flight with a [`Gate`] to control completion order.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use hub_core::{
    Backend, Citation, HubError, IndexMode, MainResponse, Notebook, NotebookId, Passage, Result,
    SearchQuery, SearchResult, ADVANCED_COLLECTION, BASIC_COLLECTION,
};

/// Backend operations, used to address the call log, failures and gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListNotebooks,
    CreateNotebook,
    UpdateNotebook,
    DeleteNotebook,
    ListFiles,
    AddFiles,
    RemoveFiles,
    IndexFiles,
    SearchNotebook,
    RagSearch,
    Health,
}

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub notebook_id: Option<NotebookId>,
    pub paths: Vec<String>,
    pub mode: Option<IndexMode>,
    pub collection: Option<String>,
    pub query: Option<SearchQuery>,
}

impl Call {
    fn new(op: Op) -> Self {
        Self {
            op,
            notebook_id: None,
            paths: Vec::new(),
            mode: None,
            collection: None,
            query: None,
        }
    }

    fn on(mut self, id: NotebookId) -> Self {
        self.notebook_id = Some(id);
        self
    }
}

/// Holds one call of an operation in flight until opened.
///
/// Dropping the gate releases the call as well.
#[derive(Debug)]
pub struct Gate {
    tx: oneshot::Sender<()>,
}

impl Gate {
    /// Let the held call complete.
    pub fn open(self) {
        let _ = self.tx.send(());
    }
}

#[derive(Default)]
struct ServerState {
    next_id: i64,
    notebooks: BTreeMap<i64, Notebook>,
    files: HashMap<i64, Vec<String>>,
    indexed: HashMap<(i64, IndexMode), Vec<String>>,
    collections: HashMap<String, Vec<String>>,
}

#[derive(Default)]
struct Harness {
    calls: Vec<Call>,
    failures: HashMap<Op, VecDeque<(u16, String)>>,
    gates: HashMap<Op, VecDeque<oneshot::Receiver<()>>>,
}

/// Notebook service emulated in memory.
pub struct MemoryBackend {
    state: Mutex<ServerState>,
    harness: Mutex<Harness>,
    base_url: String,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty service with both global collections present.
    pub fn new() -> Self {
        let mut state = ServerState {
            next_id: 1,
            ..Default::default()
        };
        state
            .collections
            .insert(BASIC_COLLECTION.to_string(), Vec::new());
        state
            .collections
            .insert(ADVANCED_COLLECTION.to_string(), Vec::new());

        Self {
            state: Mutex::new(state),
            harness: Mutex::new(Harness::default()),
            base_url: "http://memory.invalid".to_string(),
        }
    }

    /// Put files into a global collection.
    pub fn seed_collection(&self, name: &str, files: &[&str]) {
        if let Ok(mut state) = self.state.lock() {
            state
                .collections
                .entry(name.to_string())
                .or_default()
                .extend(files.iter().map(|f| f.to_string()));
        }
    }

    /// All calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<Call> {
        self.harness
            .lock()
            .map(|h| h.calls.clone())
            .unwrap_or_default()
    }

    /// Number of calls received for one operation.
    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    /// Make the next call of `op` fail with the given HTTP status and detail.
    pub fn fail_next(&self, op: Op, status: u16, detail: impl Into<String>) {
        if let Ok(mut harness) = self.harness.lock() {
            harness
                .failures
                .entry(op)
                .or_default()
                .push_back((status, detail.into()));
        }
    }

    /// Hold the next call of `op` until the returned gate is opened.
    ///
    /// Gates are consumed in call arrival order.
    pub fn gate(&self, op: Op) -> Gate {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut harness) = self.harness.lock() {
            harness.gates.entry(op).or_default().push_back(rx);
        }
        Gate { tx }
    }

    /// Record the call and claim any pending failure and gate for it.
    fn arrive(&self, call: Call) -> Result<(Option<HubError>, Option<oneshot::Receiver<()>>)> {
        let mut harness = self
            .harness
            .lock()
            .map_err(|e| HubError::storage(e.to_string()))?;
        let op = call.op;
        debug!(?op, notebook = ?call.notebook_id, "memory backend call");
        harness.calls.push(call);

        let failure = harness
            .failures
            .get_mut(&op)
            .and_then(|q| q.pop_front())
            .map(|(status, detail)| status_error(status, detail));
        let gate = harness.gates.get_mut(&op).and_then(|q| q.pop_front());
        Ok((failure, gate))
    }

    /// Run one emulated request: log it, compute the outcome, then wait on
    /// the gate before replying.
    async fn serve<T>(
        &self,
        call: Call,
        handler: impl FnOnce(&mut ServerState) -> Result<T>,
    ) -> Result<T> {
        let (failure, gate) = self.arrive(call)?;

        let outcome = match failure {
            Some(err) => Err(err),
            None => {
                let mut state = self
                    .state
                    .lock()
                    .map_err(|e| HubError::storage(e.to_string()))?;
                handler(&mut state)
            }
        };

        if let Some(gate) = gate {
            let _ = gate.await;
        }
        outcome
    }
}

/// Map an HTTP status the way `HttpBackend` does.
fn status_error(status: u16, detail: String) -> HubError {
    match status {
        404 => HubError::NotFound {
            resource: "remote resource",
            id: detail,
        },
        409 => HubError::conflict(detail),
        other => HubError::remote(Some(other), detail),
    }
}

fn duplicate_name(name: &str) -> HubError {
    HubError::conflict(format!("A notebook with the name '{}' already exists.", name))
}

fn answer(query: &SearchQuery, files: &[String]) -> SearchResult {
    let cite = |path: &String| Citation::new(path.clone(), Some("1".to_string()));
    let source = files
        .first()
        .map(cite)
        .unwrap_or_else(|| Citation::new(String::new(), None));
    let limit = query.top_k.saturating_sub(1) as usize;

    SearchResult {
        main_response: MainResponse {
            text: format!("Answer to: {}", query.query),
            source,
        },
        other_passages: files
            .iter()
            .skip(1)
            .take(limit)
            .map(|path| Passage {
                document: format!("Passage from {}", path),
                source: cite(path),
            })
            .collect(),
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn list_notebooks(&self) -> Result<Vec<Notebook>> {
        self.serve(Call::new(Op::ListNotebooks), |state| {
            Ok(state.notebooks.values().cloned().collect())
        })
        .await
    }

    async fn create_notebook(&self, name: &str, description: &str) -> Result<Notebook> {
        self.serve(Call::new(Op::CreateNotebook), |state| {
            if state.notebooks.values().any(|n| n.name == name) {
                return Err(duplicate_name(name));
            }
            let id = state.next_id;
            state.next_id += 1;
            let notebook = Notebook {
                id: NotebookId(id),
                name: name.to_string(),
                description: description.to_string(),
            };
            state.notebooks.insert(id, notebook.clone());
            Ok(notebook)
        })
        .await
    }

    async fn update_notebook(&self, id: NotebookId, name: &str, description: &str) -> Result<()> {
        self.serve(Call::new(Op::UpdateNotebook).on(id), |state| {
            if state
                .notebooks
                .values()
                .any(|n| n.name == name && n.id != id)
            {
                return Err(duplicate_name(name));
            }
            let notebook = state
                .notebooks
                .get_mut(&id.0)
                .ok_or_else(|| status_error(404, "Notebook not found".to_string()))?;
            notebook.name = name.to_string();
            notebook.description = description.to_string();
            Ok(())
        })
        .await
    }

    async fn delete_notebook(&self, id: NotebookId) -> Result<()> {
        self.serve(Call::new(Op::DeleteNotebook).on(id), |state| {
            state.notebooks.remove(&id.0);
            state.files.remove(&id.0);
            state.indexed.retain(|(nb, _), _| *nb != id.0);
            Ok(())
        })
        .await
    }

    async fn list_files(&self, id: NotebookId) -> Result<Vec<String>> {
        self.serve(Call::new(Op::ListFiles).on(id), |state| {
            Ok(state.files.get(&id.0).cloned().unwrap_or_default())
        })
        .await
    }

    async fn add_files(&self, id: NotebookId, paths: &[String]) -> Result<()> {
        let mut call = Call::new(Op::AddFiles).on(id);
        call.paths = paths.to_vec();
        self.serve(call, |state| {
            if !state.notebooks.contains_key(&id.0) {
                return Err(status_error(
                    400,
                    "Error adding files. Ensure file paths are valid and not already in the notebook."
                        .to_string(),
                ));
            }
            let files = state.files.entry(id.0).or_default();
            for path in paths {
                if !files.contains(path) {
                    files.push(path.clone());
                }
            }
            Ok(())
        })
        .await
    }

    async fn remove_files(&self, id: NotebookId, paths: &[String]) -> Result<()> {
        let mut call = Call::new(Op::RemoveFiles).on(id);
        call.paths = paths.to_vec();
        self.serve(call, |state| {
            if let Some(files) = state.files.get_mut(&id.0) {
                files.retain(|f| !paths.contains(f));
            }
            Ok(())
        })
        .await
    }

    async fn index_files(&self, id: NotebookId, paths: &[String], mode: IndexMode) -> Result<()> {
        let mut call = Call::new(Op::IndexFiles).on(id);
        call.paths = paths.to_vec();
        call.mode = Some(mode);
        self.serve(call, |state| {
            state.indexed.insert((id.0, mode), paths.to_vec());
            Ok(())
        })
        .await
    }

    async fn search_notebook(
        &self,
        id: NotebookId,
        mode: IndexMode,
        query: &SearchQuery,
    ) -> Result<SearchResult> {
        let mut call = Call::new(Op::SearchNotebook).on(id);
        call.mode = Some(mode);
        call.query = Some(query.clone());
        self.serve(call, |state| {
            let files = state.indexed.get(&(id.0, mode)).ok_or_else(|| {
                status_error(
                    404,
                    format!(
                        "Could not find collection for notebook {}. Have you indexed any files?",
                        id
                    ),
                )
            })?;
            Ok(answer(query, files))
        })
        .await
    }

    async fn rag_search(&self, collection: &str, query: &SearchQuery) -> Result<SearchResult> {
        let mut call = Call::new(Op::RagSearch);
        call.collection = Some(collection.to_string());
        call.query = Some(query.clone());
        self.serve(call, |state| {
            let files = state.collections.get(collection).ok_or_else(|| {
                status_error(500, format!("Collection {} does not exist.", collection))
            })?;
            Ok(answer(query, files))
        })
        .await
    }

    async fn health(&self) -> Result<()> {
        self.serve(Call::new(Op::Health), |_| Ok(())).await
    }

    fn download_url(&self, encoded_path: &str) -> String {
        format!("{}/download?encoded_path={}", self.base_url, encoded_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn query(text: &str) -> SearchQuery {
        SearchQuery {
            query: text.to_string(),
            top_k: 5,
            prompt_template: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let backend = MemoryBackend::new();
        backend.create_notebook("Thesis", "").await.unwrap();

        let err = backend.create_notebook("Thesis", "again").await.unwrap_err();
        assert!(matches!(err, HubError::Conflict { .. }));
        assert_eq!(backend.list_notebooks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_files_ignores_duplicates_and_keeps_order() {
        let backend = MemoryBackend::new();
        let nb = backend.create_notebook("Docs", "").await.unwrap();

        let first = vec!["/app/b.txt".to_string(), "/app/a.txt".to_string()];
        backend.add_files(nb.id, &first).await.unwrap();
        backend
            .add_files(nb.id, &["/app/a.txt".to_string(), "/app/c.txt".to_string()])
            .await
            .unwrap();

        assert_eq!(
            backend.list_files(nb.id).await.unwrap(),
            vec!["/app/b.txt", "/app/a.txt", "/app/c.txt"]
        );
    }

    #[tokio::test]
    async fn test_unindexed_notebook_search_is_not_found() {
        let backend = MemoryBackend::new();
        let nb = backend.create_notebook("Docs", "").await.unwrap();

        let err = backend
            .search_notebook(nb.id, IndexMode::Basic, &query("anything"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");

        backend
            .index_files(nb.id, &["/app/a.txt".to_string()], IndexMode::Basic)
            .await
            .unwrap();
        let result = backend
            .search_notebook(nb.id, IndexMode::Basic, &query("anything"))
            .await
            .unwrap();
        assert_eq!(result.main_response.text, "Answer to: anything");
        assert_eq!(result.main_response.source.file_path, "/app/a.txt");

        // Advanced index is separate
        assert!(backend
            .search_notebook(nb.id, IndexMode::Advanced, &query("anything"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let backend = MemoryBackend::new();
        backend.fail_next(Op::Health, 503, "down");

        let err = backend.health().await.unwrap_err();
        assert!(matches!(err, HubError::Remote { status: Some(503), .. }));
        backend.health().await.unwrap();
        assert_eq!(backend.count(Op::Health), 2);
    }

    #[tokio::test]
    async fn test_gate_holds_call() {
        let backend = Arc::new(MemoryBackend::new());
        let gate = backend.gate(Op::Health);

        let task = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.health().await })
        };

        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        gate.open();
        task.await.unwrap().unwrap();
    }
}
