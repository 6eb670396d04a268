use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибка ожидающего получения события из канала подписки.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecvError {
    /// Канал закрыт держателем, отписан или шина остановлена. Терминально.
    #[error("subscription channel is closed")]
    Closed,
    /// Событие не пришло за отведённое время.
    #[error("no event arrived within the specified timeout")]
    Timeout,
}

/// Ошибка неблокирующего получения события.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TryRecvError {
    #[error("no events queued")]
    Empty,
    #[error("subscription channel is closed")]
    Closed,
}

impl ErrorExt for RecvError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Closed => StatusCode::ChannelClosed,
            Self::Timeout => StatusCode::Timeout,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", "pubsub_recv".to_string()),
            ("status_code", self.status_code().to_string()),
        ]
    }
}

impl ErrorExt for TryRecvError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Empty => StatusCode::ChannelEmpty,
            Self::Closed => StatusCode::ChannelClosed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// === Преобразования ===

impl From<TryRecvError> for RecvError {
    fn from(err: TryRecvError) -> Self {
        match err {
            TryRecvError::Empty => RecvError::Timeout,
            TryRecvError::Closed => RecvError::Closed,
        }
    }
}
