//! Citation links back to source files.

use serde::Serialize;

use hub_core::{encode_file_path, Backend, Citation, SearchResult};

/// A citation with its retrieval link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCitation {
    /// Source path as reported by the backend.
    pub file_path: String,

    /// Page label, when known.
    pub page: Option<String>,

    /// Base64 form of `file_path`, as the download endpoint expects it.
    pub encoded_path: String,

    /// Full download URL.
    pub url: String,
}

impl ResolvedCitation {
    /// Resolve one citation against a backend's download endpoint.
    pub fn resolve<B: Backend + ?Sized>(backend: &B, citation: &Citation) -> Self {
        let encoded_path = encode_file_path(&citation.file_path);
        Self {
            url: backend.download_url(&encoded_path),
            file_path: citation.file_path.clone(),
            page: citation.page.clone(),
            encoded_path,
        }
    }
}

impl std::fmt::Display for ResolvedCitation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.page {
            Some(page) => write!(f, "{} (p. {}) <{}>", self.file_path, page, self.url),
            None => write!(f, "{} <{}>", self.file_path, self.url),
        }
    }
}

/// Resolve every citation of a result: main response first, then passages
/// in rank order.
pub fn resolve_citations<B: Backend + ?Sized>(
    backend: &B,
    result: &SearchResult,
) -> Vec<ResolvedCitation> {
    result
        .citations()
        .map(|c| ResolvedCitation::resolve(backend, c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::{decode_file_path, MainResponse, Passage};
    use hub_http::MemoryBackend;

    #[test]
    fn test_resolve_order_and_encoding() {
        let backend = MemoryBackend::new();
        let result = SearchResult {
            main_response: MainResponse {
                text: "answer".to_string(),
                source: Citation::new("/docs/rapport annuel é.pdf", Some("3".to_string())),
            },
            other_passages: vec![Passage {
                document: "more".to_string(),
                source: Citation::new("/docs/notes.txt", None),
            }],
        };

        let resolved = resolve_citations(&backend, &result);

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].file_path, "/docs/rapport annuel é.pdf");
        assert_eq!(
            decode_file_path(&resolved[0].encoded_path).unwrap(),
            "/docs/rapport annuel é.pdf"
        );
        assert!(resolved[0].url.ends_with(&resolved[0].encoded_path));
        assert_eq!(resolved[1].page, None);
    }
}
