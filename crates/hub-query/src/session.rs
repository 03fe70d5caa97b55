//! Search sessions: one logical request in flight, latest issue wins.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tracing::{debug, info, warn};

use hub_core::{
    Backend, HubError, Result, SearchConfig, SearchQuery, SearchResult, SearchTarget,
    SessionStatus,
};
use hub_notebook::{Hub, NotebookStore, PromptRegistry};

use crate::citation::{resolve_citations, ResolvedCitation};

/// Owned view of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub query: Option<String>,
    pub target: Option<SearchTarget>,
    pub result: Option<SearchResult>,
    pub error: Option<String>,
}

#[derive(Default)]
struct SessionState {
    latest_token: u64,
    view: SessionSnapshot,
}

/// A search panel's state machine: `idle -> loading -> success | error`.
///
/// Every call to [`execute`](Self::execute) takes a fresh token before the
/// request is sent. A response is applied only if its token is still the
/// latest, so a late reply to a superseded call never overwrites a newer
/// one. Superseded calls return [`HubError::StaleResponse`].
pub struct SearchSession<B: Backend> {
    store: Arc<NotebookStore<B>>,
    prompts: Arc<PromptRegistry>,
    limits: SearchConfig,
    state: Mutex<SessionState>,
}

impl<B: Backend> SearchSession<B> {
    /// Create an idle session.
    pub fn new(
        store: Arc<NotebookStore<B>>,
        prompts: Arc<PromptRegistry>,
        limits: SearchConfig,
    ) -> Self {
        Self {
            store,
            prompts,
            limits,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Create an idle session sharing the hub's store and prompt registry.
    pub fn from_hub(hub: &Hub<B>, limits: SearchConfig) -> Self {
        Self::new(hub.store().clone(), hub.prompts().clone(), limits)
    }

    /// Run a search and return its result if it is still the latest.
    pub async fn execute(
        &self,
        query: &str,
        target: SearchTarget,
        top_k: u32,
        prompt_id: &str,
    ) -> Result<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(HubError::validation("search query must not be empty"));
        }
        if top_k == 0 {
            return Err(HubError::validation("top_k must be at least 1"));
        }
        let top_k = if top_k > self.limits.max_top_k {
            warn!(
                "top_k {} exceeds the maximum, using {}",
                top_k, self.limits.max_top_k
            );
            self.limits.clamp_top_k(top_k)
        } else {
            top_k
        };

        let prompt_template = self.prompts.resolve(prompt_id)?;
        let request = SearchQuery {
            query: query.to_string(),
            top_k,
            prompt_template,
        };

        let token = {
            let mut state = self.lock()?;
            state.latest_token += 1;
            state.view.status = SessionStatus::Loading;
            state.view.query = Some(request.query.clone());
            state.view.target = Some(target.clone());
            state.view.result = None;
            state.view.error = None;
            state.latest_token
        };

        info!(token, %target, "Searching for: {:?}", request.query);
        let start = Instant::now();

        if let Some(id) = target.notebook_id() {
            if let Err(e) = self.store.resolve(id).await {
                return self.fail_unresolved(token, e);
            }
            self.ensure_latest(token)?;
        }

        let backend = self.store.backend();
        let outcome = match &target {
            SearchTarget::Notebook { id, mode } => {
                backend.search_notebook(*id, *mode, &request).await
            }
            SearchTarget::Collection(name) => backend.rag_search(name, &request).await,
        };

        let mut state = self.lock()?;
        if state.latest_token != token {
            debug!(token, latest = state.latest_token, "Discarding superseded response");
            return Err(HubError::StaleResponse { token });
        }
        if !self.target_alive(&target) {
            debug!(token, %target, "Target deleted while loading, discarding response");
            state.view = SessionSnapshot::default();
            return Err(HubError::StaleResponse { token });
        }

        match outcome {
            Ok(result) => {
                debug!(
                    token,
                    passages = result.other_passages.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Search complete"
                );
                state.view.status = SessionStatus::Success;
                state.view.result = Some(result.clone());
                Ok(result)
            }
            Err(e) => {
                warn!(token, "Search failed: {}", e);
                state.view.status = SessionStatus::Error;
                state.view.result = None;
                state.view.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Current state. A settled session whose target notebook has been
    /// deleted drops its result and reports `idle`.
    pub fn snapshot(&self) -> SessionSnapshot {
        let Ok(mut state) = self.lock() else {
            return SessionSnapshot::default();
        };
        // A loading call settles its own target check on completion
        let orphaned = state.view.status != SessionStatus::Loading
            && state
                .view
                .target
                .as_ref()
                .is_some_and(|target| !self.target_alive(target));
        if orphaned {
            state.view = SessionSnapshot::default();
        }
        state.view.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.snapshot().status
    }

    /// Return a settled session to `idle`.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.view.status == SessionStatus::Loading {
            return Err(HubError::conflict(
                "cannot reset a session while a search is loading",
            ));
        }
        state.view = SessionSnapshot::default();
        Ok(())
    }

    /// Whether the session can be dropped without side effects.
    pub fn is_discardable(&self) -> bool {
        self.status().is_settled()
    }

    /// Download links for every source in the current result.
    pub fn citations(&self) -> Vec<ResolvedCitation> {
        match self.snapshot().result {
            Some(result) => resolve_citations(self.store.backend().as_ref(), &result),
            None => Vec::new(),
        }
    }

    /// Bail out between awaits once a newer call has been issued.
    fn ensure_latest(&self, token: u64) -> Result<()> {
        let latest = self.lock()?.latest_token;
        if latest != token {
            debug!(token, latest, "Superseded before the search was sent");
            return Err(HubError::StaleResponse { token });
        }
        Ok(())
    }

    /// The target notebook could not be found; the search was never sent.
    fn fail_unresolved<T>(&self, token: u64, e: HubError) -> Result<T> {
        let mut state = self.lock()?;
        if state.latest_token != token {
            return Err(HubError::StaleResponse { token });
        }
        warn!(token, "Search target unavailable: {}", e);
        state.view.status = SessionStatus::Error;
        state.view.target = None;
        state.view.error = Some(e.to_string());
        Err(e)
    }

    fn target_alive(&self, target: &SearchTarget) -> bool {
        match target.notebook_id() {
            Some(id) => self.store.contains(id),
            None => true,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionState>> {
        self.state
            .lock()
            .map_err(|e| HubError::storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::{IndexMode, NotebookId, BASIC_COLLECTION};
    use hub_http::{MemoryBackend, Op};
    use hub_notebook::{CUSTOM_TEMPLATE_ID, DEFAULT_TEMPLATE_ID};
    use hub_store::MemorySlotStore;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        hub: Hub<MemoryBackend>,
        session: SearchSession<MemoryBackend>,
        notebook: NotebookId,
    }

    async fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let hub = Hub::new(backend.clone(), Arc::new(MemorySlotStore::new()));
        let nb = hub.create_notebook("Papers", "").await.unwrap();
        hub.add_files(nb.id, &["/papers/a.pdf", "/papers/b.pdf"])
            .await
            .unwrap();
        hub.start_indexing(nb.id, IndexMode::Basic).await.unwrap();
        let session = SearchSession::from_hub(&hub, SearchConfig::default());
        Fixture {
            backend,
            hub,
            session,
            notebook: nb.id,
        }
    }

    fn basic(id: NotebookId) -> SearchTarget {
        SearchTarget::notebook(id, IndexMode::Basic)
    }

    #[tokio::test]
    async fn test_success() {
        let f = fixture().await;
        assert_eq!(f.session.status(), SessionStatus::Idle);

        let result = f
            .session
            .execute("what is new?", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID)
            .await
            .unwrap();

        let snapshot = f.session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Success);
        assert_eq!(snapshot.result.as_ref(), Some(&result));
        assert_eq!(snapshot.query.as_deref(), Some("what is new?"));
        assert!(f.session.is_discardable());
    }

    #[tokio::test]
    async fn test_empty_query_issues_no_request() {
        let f = fixture().await;
        let before = f.backend.calls().len();

        let err = f
            .session
            .execute("", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID)
            .await
            .unwrap_err();

        assert!(matches!(err, HubError::Validation { .. }));
        assert_eq!(f.backend.calls().len(), before);
        assert_eq!(f.session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let f = fixture().await;
        let err = f
            .session
            .execute("q", basic(f.notebook), 0, DEFAULT_TEMPLATE_ID)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_top_k_clamped() {
        let f = fixture().await;
        f.session
            .execute("q", basic(f.notebook), 10_000, DEFAULT_TEMPLATE_ID)
            .await
            .unwrap();

        let call = f
            .backend
            .calls()
            .into_iter()
            .find(|c| c.op == Op::SearchNotebook)
            .unwrap();
        assert_eq!(call.query.unwrap().top_k, SearchConfig::default().max_top_k);
    }

    #[tokio::test]
    async fn test_prompt_template_resolution() {
        let f = fixture().await;

        let err = f
            .session
            .execute("q", basic(f.notebook), 5, "haiku")
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::NotFound { .. }));
        assert_eq!(f.backend.count(Op::SearchNotebook), 0);

        f.session
            .execute("q", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID)
            .await
            .unwrap();
        f.hub.prompts().save_custom("").unwrap();
        f.session
            .execute("q", basic(f.notebook), 5, CUSTOM_TEMPLATE_ID)
            .await
            .unwrap();

        let sent: Vec<_> = f
            .backend
            .calls()
            .into_iter()
            .filter(|c| c.op == Op::SearchNotebook)
            .map(|c| c.query.unwrap().prompt_template)
            .collect();
        assert!(sent[0].as_deref().unwrap().contains("{context}"));
        assert_eq!(sent[1], None);
    }

    #[tokio::test]
    async fn test_failure_clears_result() {
        let f = fixture().await;
        f.session
            .execute("q", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID)
            .await
            .unwrap();
        f.backend.fail_next(Op::SearchNotebook, 500, "LLM unavailable");

        let err = f
            .session
            .execute("again", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID)
            .await
            .unwrap_err();
        assert!(err.is_user_visible());

        let snapshot = f.session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Error);
        assert!(snapshot.result.is_none());
        assert!(snapshot.error.unwrap().contains("LLM unavailable"));
    }

    #[tokio::test]
    async fn test_late_response_is_discarded() {
        let f = fixture().await;
        let gate_a = f.backend.gate(Op::SearchNotebook);
        let gate_b = f.backend.gate(Op::SearchNotebook);

        // B's reply arrives first, A's after it
        let release = async {
            gate_b.open();
            tokio::task::yield_now().await;
            gate_a.open();
        };

        let (a, b, _) = tokio::join!(
            f.session
                .execute("first", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID),
            f.session
                .execute("second", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID),
            release
        );

        let a = a.unwrap_err();
        assert!(matches!(a, HubError::StaleResponse { .. }));
        assert!(!a.is_user_visible());

        let b = b.unwrap();
        assert_eq!(b.main_response.text, "Answer to: second");

        let snapshot = f.session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Success);
        assert_eq!(snapshot.result, Some(b));
    }

    #[tokio::test]
    async fn test_early_superseded_response_is_discarded() {
        let f = fixture().await;
        let gate_a = f.backend.gate(Op::SearchNotebook);
        let gate_b = f.backend.gate(Op::SearchNotebook);

        let release = async {
            gate_a.open();
            tokio::task::yield_now().await;
            gate_b.open();
        };

        let (a, b, _) = tokio::join!(
            f.session
                .execute("first", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID),
            f.session
                .execute("second", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID),
            release
        );

        assert!(matches!(a, Err(HubError::StaleResponse { .. })));
        assert_eq!(
            f.session.snapshot().result.unwrap().main_response.text,
            b.unwrap().main_response.text
        );
    }

    #[tokio::test]
    async fn test_previous_result_cleared_while_loading() {
        let f = fixture().await;
        f.session
            .execute("first", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID)
            .await
            .unwrap();
        let gate = f.backend.gate(Op::SearchNotebook);

        let check = async {
            tokio::task::yield_now().await;
            let snapshot = f.session.snapshot();
            assert_eq!(snapshot.status, SessionStatus::Loading);
            assert!(snapshot.result.is_none());
            assert_eq!(snapshot.query.as_deref(), Some("second"));
            gate.open();
        };

        let (outcome, _) = tokio::join!(
            f.session
                .execute("second", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID),
            check
        );
        assert_eq!(outcome.unwrap().main_response.text, "Answer to: second");
    }

    #[tokio::test]
    async fn test_issue_order_wins_over_target_lookup() {
        let f = fixture().await;
        f.backend.seed_collection(BASIC_COLLECTION, &["/library/x.pdf"]);

        // A fresh hub has not loaded the notebook list yet
        let cold = Hub::new(f.backend.clone(), Arc::new(MemorySlotStore::new()));
        let session = SearchSession::from_hub(&cold, SearchConfig::default());
        let gate = f.backend.gate(Op::ListNotebooks);
        let searches_before = f.backend.count(Op::SearchNotebook);

        let later = async {
            tokio::task::yield_now().await;
            assert_eq!(session.status(), SessionStatus::Loading);
            let b = session
                .execute(
                    "B",
                    SearchTarget::global(IndexMode::Basic),
                    5,
                    DEFAULT_TEMPLATE_ID,
                )
                .await;
            gate.open();
            b
        };

        let (a, b) = tokio::join!(
            session.execute("A", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID),
            later
        );

        assert!(matches!(a, Err(HubError::StaleResponse { .. })));
        assert_eq!(b.unwrap().main_response.text, "Answer to: B");
        assert_eq!(f.backend.count(Op::SearchNotebook), searches_before);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Success);
        assert_eq!(
            snapshot.result.unwrap().main_response.text,
            "Answer to: B"
        );
    }

    #[tokio::test]
    async fn test_unknown_notebook_is_an_error() {
        let f = fixture().await;

        let err = f
            .session
            .execute("q", basic(NotebookId(999)), 5, DEFAULT_TEMPLATE_ID)
            .await
            .unwrap_err();

        assert!(matches!(err, HubError::NotFound { .. }));
        assert_eq!(f.backend.count(Op::SearchNotebook), 0);
        let snapshot = f.session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Error);
        assert!(snapshot.error.is_some());
    }

    #[tokio::test]
    async fn test_target_deleted_while_loading() {
        let backend = Arc::new(MemoryBackend::new());
        let hub = Hub::new(backend.clone(), Arc::new(MemorySlotStore::new()));
        let mut last = None;
        for i in 1..=7 {
            last = Some(hub.create_notebook(&format!("nb {}", i), "").await.unwrap());
        }
        let target = last.unwrap().id;
        assert_eq!(target, NotebookId(7));
        hub.add_files(target, &["/app/a.txt"]).await.unwrap();
        hub.start_indexing(target, IndexMode::Basic).await.unwrap();

        let session = SearchSession::from_hub(&hub, SearchConfig::default());
        let gate = backend.gate(Op::SearchNotebook);

        let delete = async {
            tokio::task::yield_now().await;
            assert_eq!(session.status(), SessionStatus::Loading);
            hub.delete_notebook(target).await.unwrap();
            gate.open();
        };

        let (outcome, _) = tokio::join!(
            session.execute("q", basic(target), 5, DEFAULT_TEMPLATE_ID),
            delete
        );

        assert!(matches!(outcome, Err(HubError::StaleResponse { .. })));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert!(snapshot.result.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_drops_result_of_deleted_target() {
        let f = fixture().await;
        f.session
            .execute("q", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID)
            .await
            .unwrap();

        f.hub.delete_notebook(f.notebook).await.unwrap();

        let snapshot = f.session.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert!(snapshot.result.is_none());
        assert!(f.session.citations().is_empty());
    }

    #[tokio::test]
    async fn test_global_search() {
        let f = fixture().await;
        f.backend
            .seed_collection(BASIC_COLLECTION, &["/library/x.pdf", "/library/y.pdf"]);

        f.session
            .execute(
                "q",
                SearchTarget::global(IndexMode::Basic),
                5,
                DEFAULT_TEMPLATE_ID,
            )
            .await
            .unwrap();

        let call = f
            .backend
            .calls()
            .into_iter()
            .find(|c| c.op == Op::RagSearch)
            .unwrap();
        assert_eq!(call.collection.as_deref(), Some(BASIC_COLLECTION));

        let citations = f.session.citations();
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].file_path, "/library/x.pdf");
    }

    #[tokio::test]
    async fn test_reset() {
        let f = fixture().await;
        f.session
            .execute("q", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID)
            .await
            .unwrap();

        f.session.reset().unwrap();
        assert_eq!(f.session.snapshot(), SessionSnapshot::default());
    }

    #[tokio::test]
    async fn test_reset_while_loading_conflicts() {
        let f = fixture().await;
        let gate = f.backend.gate(Op::SearchNotebook);

        let check = async {
            tokio::task::yield_now().await;
            assert!(!f.session.is_discardable());
            let err = f.session.reset().unwrap_err();
            assert!(matches!(err, HubError::Conflict { .. }));
            gate.open();
        };

        let (outcome, _) = tokio::join!(
            f.session
                .execute("q", basic(f.notebook), 5, DEFAULT_TEMPLATE_ID),
            check
        );
        outcome.unwrap();
        assert!(f.session.is_discardable());
    }
}
