use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, LoaderError, StatusCode};

/// Ошибки слоя резолверов каталога.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("write failed: {reason}")]
    WriteFailed { reason: String },

    #[error("{what} is not available, please try again")]
    FetchFailed {
        what: &'static str,
        #[source]
        cause: LoaderError,
    },
}

impl CatalogError {
    pub fn invalid(
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

impl ErrorExt for CatalogError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated => StatusCode::Unauthorized,
            Self::NotFound { .. } => StatusCode::NotFound,
            Self::InvalidInput { .. } => StatusCode::InvalidValue,
            Self::WriteFailed { .. } => StatusCode::WriteFailed,
            Self::FetchFailed { cause, .. } => cause.status_code(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::WriteFailed { .. } => {
                "Adding a new record failed, check your details and try again".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_fetch_failed_inherits_source_status() {
        let err = CatalogError::FetchFailed {
            what: "Book count",
            cause: LoaderError::source_unavailable("boom"),
        };
        assert_eq!(err.status_code(), StatusCode::SourceUnavailable);
        assert_eq!(
            err.to_string(),
            "Book count is not available, please try again"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_write_failed_hides_reason_from_client() {
        let err = CatalogError::WriteFailed {
            reason: "duplicate key in index books_title".to_string(),
        };
        assert!(!err.client_message().contains("books_title"));
        assert_eq!(err.status_code().http_status(), 500);
    }

    #[test]
    fn test_invalid_input_helper() {
        let err = CatalogError::invalid("title", "too short");
        assert_eq!(err.to_string(), "invalid title: too short");
        assert_eq!(err.status_code().http_status(), 400);
    }
}
