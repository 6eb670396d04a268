use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки пакетного загрузчика.
///
/// Тип клонируемый: одна и та же ошибка раздаётся каждому ожидающему
/// вызывающему из упавшего пакета.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// Источник агрегатов не ответил на запрос пакета.
    #[error("aggregation source unavailable: {reason}")]
    SourceUnavailable { reason: String },
    /// Задача выгрузки пакета завершилась, не ответив ожидающему.
    #[error("batch dispatch was cancelled before the key resolved")]
    Cancelled,
}

impl LoaderError {
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            reason: reason.into(),
        }
    }
}

impl ErrorExt for LoaderError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::SourceUnavailable { .. } => StatusCode::SourceUnavailable,
            Self::Cancelled => StatusCode::Cancelled,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::SourceUnavailable { reason } => {
                format!("Aggregate is not available ({reason}), please try again")
            }
            Self::Cancelled => "Request cancelled".to_string(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", "loader".to_string()),
            ("status_code", self.status_code().to_string()),
        ]
    }
}
