//! Error types for the research hub.

use thiserror::Error;

/// Result type alias using HubError.
pub type Result<T> = std::result::Result<T, HubError>;

/// Errors that can occur while orchestrating notebooks, indexing and search.
#[derive(Error, Debug)]
pub enum HubError {
    /// A required field is missing or malformed. Raised before any remote call.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// The operation is not valid in the current state.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// A referenced resource does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Network failure, timeout, or non-2xx response.
    #[error("Remote error{}: {message}", status_suffix(.status))]
    Remote {
        status: Option<u16>,
        message: String,
    },

    /// The response belongs to a request that has since been superseded.
    #[error("Stale response for request #{token}")]
    StaleResponse { token: u64 },

    /// Attempt to modify something that is read-only.
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// Local durable storage error.
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl HubError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Create a remote error.
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Create a permission error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Whether this error should be shown to the user.
    ///
    /// Stale responses are discarded silently.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::StaleResponse { .. })
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Remote { .. } => "REMOTE_ERROR",
            Self::StaleResponse { .. } => "STALE_RESPONSE",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HubError::not_found("Notebook", 42);
        assert_eq!(err.to_string(), "Notebook not found: 42");

        let err = HubError::remote(Some(500), "boom");
        assert_eq!(err.to_string(), "Remote error (500): boom");

        let err = HubError::remote(None, "connection refused");
        assert_eq!(err.to_string(), "Remote error: connection refused");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(HubError::validation("x").error_code(), "VALIDATION_ERROR");
        assert_eq!(HubError::conflict("x").error_code(), "CONFLICT");
        assert_eq!(
            HubError::StaleResponse { token: 3 }.error_code(),
            "STALE_RESPONSE"
        );
    }

    #[test]
    fn test_stale_response_is_silent() {
        assert!(!HubError::StaleResponse { token: 1 }.is_user_visible());
        assert!(HubError::remote(Some(404), "gone").is_user_visible());
    }
}
