use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных
/// - 3xxx: Авторизация
/// - 4xxx: Ограничения и backpressure
/// - 5xxx: Хранилище и источник агрегатов
/// - 6xxx: Каналы подписок
///
/// `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Internal = 1001,
    InvalidArgs = 1002,
    Cancelled = 1003,

    // === 2xxx: Ошибки данных ===
    NotFound = 2000,
    AlreadyExists = 2001,
    InvalidValue = 2002,

    // === 3xxx: Авторизация ===
    Unauthorized = 3000,
    PermissionDenied = 3001,

    // === 4xxx: Ограничения ===
    RateLimited = 4000,
    BackpressureDrop = 4001,

    // === 5xxx: Хранилище/источник ===
    StorageUnavailable = 5000,
    SourceUnavailable = 5001,
    WriteFailed = 5002,

    // === 6xxx: Каналы ===
    ChannelClosed = 6000,
    ChannelEmpty = 6001,
    Timeout = 6002,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Возвращает `true`, если операцию с этим кодом имеет смысл повторить.
    ///
    /// Отказ источника агрегатов не кэшируется, поэтому следующий `load`
    /// с тем же ключом честно повторит запрос.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::StorageUnavailable
                | Self::SourceUnavailable
                | Self::RateLimited
        )
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка со стороны клиента (диапазон `2xxx..4xxx` и `InvalidArgs`).
    pub fn is_client_error(&self) -> bool {
        let c = self.code();
        if (2000..=4999).contains(&c) {
            return true;
        }
        matches!(self, Self::InvalidArgs)
    }

    /// Ошибка сервера: диапазоны `1xxx` и `5xxx`.
    pub fn is_server_error(&self) -> bool {
        let c = self.code();
        matches!(c, 1000..=1999 | 5000..=5999) && !matches!(self, Self::InvalidArgs)
    }

    /// Терминальное состояние канала подписки, не требующее повтора.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ChannelClosed | Self::Cancelled)
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Internal | Self::StorageUnavailable)
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::NotFound | Self::ChannelClosed | Self::ChannelEmpty => LogLevel::Debug,
            Self::InvalidArgs
            | Self::InvalidValue
            | Self::AlreadyExists
            | Self::Unauthorized
            | Self::PermissionDenied => LogLevel::Info,
            Self::RateLimited
            | Self::BackpressureDrop
            | Self::Timeout
            | Self::SourceUnavailable => LogLevel::Warn,
            Self::Internal | Self::StorageUnavailable | Self::WriteFailed => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }

    /// HTTP-статус, соответствующий коду статуса.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Success => 200,
            Self::NotFound => 404,
            Self::AlreadyExists => 409,
            Self::InvalidArgs | Self::InvalidValue => 400,
            Self::Unauthorized => 401,
            Self::PermissionDenied => 403,
            Self::RateLimited => 429,
            Self::Timeout => 408,
            Self::StorageUnavailable | Self::SourceUnavailable => 503,
            _ => 500,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
