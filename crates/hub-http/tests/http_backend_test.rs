//! Integration tests for the HTTP backend against a mock notebook service.

use std::time::Duration;

use hub_core::{Backend, HubError, IndexMode, NotebookId, SearchQuery};
use hub_http::HttpBackend;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> HttpBackend {
    HttpBackend::new(server.uri(), Duration::from_secs(5)).expect("Failed to create backend")
}

fn search_reply() -> serde_json::Value {
    serde_json::json!({
        "main_response": {
            "response": "Paris is the capital.",
            "source": { "file_path": "/docs/france.pdf", "page_number": 3 }
        },
        "other_relevant_passages": [
            { "document": "France...", "metadata": { "file_path": "/docs/europe.pdf", "page": 11 } }
        ]
    })
}

#[tokio::test]
async fn test_create_notebook_returns_record() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notebooks"))
        .and(body_json(serde_json::json!({ "name": "Thesis", "description": "drafts" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 7, "name": "Thesis", "description": "drafts"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let notebook = backend(&server)
        .create_notebook("Thesis", "drafts")
        .await
        .unwrap();

    assert_eq!(notebook.id, NotebookId(7));
    assert_eq!(notebook.name, "Thesis");
}

#[tokio::test]
async fn test_duplicate_name_maps_to_conflict() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notebooks"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "detail": "A notebook with the name 'Thesis' already exists."
        })))
        .mount(&server)
        .await;

    let err = backend(&server)
        .create_notebook("Thesis", "")
        .await
        .unwrap_err();

    match err {
        HubError::Conflict { message } => assert!(message.contains("already exists")),
        other => panic!("expected conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn test_list_files_and_remove_with_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notebooks/3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "file_paths": ["/app/a.txt", "/app/b.txt"]
        })))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/notebooks/3/files"))
        .and(body_json(serde_json::json!({ "file_paths": ["/app/a.txt"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": "Files removed from notebook successfully"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server);
    let files = backend.list_files(NotebookId(3)).await.unwrap();
    assert_eq!(files, vec!["/app/a.txt", "/app/b.txt"]);

    backend
        .remove_files(NotebookId(3), &["/app/a.txt".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_index_sends_mode_flag() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notebooks/2/index"))
        .and(body_json(serde_json::json!({
            "file_paths": ["/app/a.txt"],
            "use_advanced_indexing": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": "Indexing completed successfully"
        })))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server)
        .index_files(NotebookId(2), &["/app/a.txt".to_string()], IndexMode::Advanced)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_notebook_search_query_parameters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notebooks/5/search"))
        .and(query_param("query", "capital of France"))
        .and(query_param("use_advanced_indexing", "false"))
        .and(query_param("top_k", "3"))
        .and(query_param("prompt_template", "Answer {query} from {context}"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_reply()))
        .expect(1)
        .mount(&server)
        .await;

    let query = SearchQuery {
        query: "capital of France".to_string(),
        top_k: 3,
        prompt_template: Some("Answer {query} from {context}".to_string()),
    };

    let result = backend(&server)
        .search_notebook(NotebookId(5), IndexMode::Basic, &query)
        .await
        .unwrap();

    assert_eq!(result.main_response.text, "Paris is the capital.");
    assert_eq!(result.main_response.source.page.as_deref(), Some("3"));
    assert_eq!(result.other_passages[0].source.page.as_deref(), Some("11"));
}

#[tokio::test]
async fn test_unindexed_notebook_search_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notebooks/9/search"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "detail": "Could not find collection for notebook 9. Have you indexed any files?"
        })))
        .mount(&server)
        .await;

    let query = SearchQuery {
        query: "q".to_string(),
        top_k: 5,
        prompt_template: None,
    };

    let err = backend(&server)
        .search_notebook(NotebookId(9), IndexMode::Basic, &query)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_rag_search_collection_parameter() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rag_search"))
        .and(query_param("collection_name", "file_embeddings_unstructured"))
        .and(query_param("top_k", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_reply()))
        .expect(1)
        .mount(&server)
        .await;

    let query = SearchQuery {
        query: "capital".to_string(),
        top_k: 5,
        prompt_template: None,
    };

    let result = backend(&server)
        .rag_search("file_embeddings_unstructured", &query)
        .await
        .unwrap();
    assert_eq!(result.citations().count(), 2);
}

#[tokio::test]
async fn test_server_error_keeps_status_and_detail() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = backend(&server).health().await.unwrap_err();
    match err {
        HubError::Remote { status, message } => {
            assert_eq!(status, Some(500));
            assert_eq!(message, "boom");
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_is_remote_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notebooks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri(), Duration::from_millis(50)).unwrap();
    let err = backend.list_notebooks().await.unwrap_err();
    assert!(matches!(err, HubError::Remote { status: None, .. }));
}
