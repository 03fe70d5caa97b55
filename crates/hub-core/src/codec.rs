//! Path handling: membership normalization and the citation path codec.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{HubError, Result};

/// Encode a file path for the download endpoint.
///
/// Standard base64 over the UTF-8 bytes; lossless for any path string.
pub fn encode_file_path(path: &str) -> String {
    STANDARD.encode(path.as_bytes())
}

/// Decode a path produced by [`encode_file_path`].
pub fn decode_file_path(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| HubError::validation(format!("invalid base64 path: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| HubError::validation(format!("encoded path is not UTF-8: {}", e)))
}

/// Normalize a path to forward-slash form.
///
/// Backslashes become slashes, repeated slashes collapse, `.` segments are
/// dropped and `..` segments are resolved lexically. A trailing slash is
/// removed; the root `/` is kept.
pub fn normalize_path(path: &str) -> Result<String> {
    let unified = path.trim().replace('\\', "/");
    if unified.is_empty() {
        return Err(HubError::validation("file path is empty"));
    }

    let absolute = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    Ok(match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    })
}

/// Normalize a batch of paths, dropping duplicates (first occurrence wins).
pub fn normalize_paths<I, S>(paths: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for path in paths {
        let normalized = normalize_path(path.as_ref())?;
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    Ok(out)
}
