//! Логирование на `tracing`.
//!
//! - `config`: настройки и переопределения из окружения.
//! - `filters`: сборка `EnvFilter`.
//! - `formatter`: fmt-слой в формате json, pretty или compact.

pub mod config;
mod filters;
mod formatter;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use self::config::{LogFormat, LoggingConfig, ENV_LOG_FORMAT, ENV_LOG_LEVEL};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unknown log level '{0}'")]
    InvalidLevel(String),
    #[error("unknown log format '{0}', expected json, pretty or compact")]
    InvalidFormat(String),
    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Инициализация логирования с конфигурацией.
///
/// Порядок: переопределения из окружения, проверка, фильтр (`RUST_LOG`
/// важнее конфигурации), затем один fmt-слой.
pub fn init_logging(mut config: LoggingConfig) -> Result<(), LoggingError> {
    config.apply_env_overrides()?;
    config.validate()?;

    let env_filter = filters::build_filter_from_config(&config);
    let formatter = formatter::build_formatter_from_config(&config);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(formatter)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = %config.format,
        "Logging system initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    /// Тест проверяет, что некорректный уровень отклоняется до установки
    /// подписчика.
    #[test]
    #[serial]
    fn test_init_rejects_invalid_level() {
        std::env::remove_var(ENV_LOG_LEVEL);
        std::env::remove_var(ENV_LOG_FORMAT);
        let cfg = LoggingConfig {
            level: "loud".into(),
            ..Default::default()
        };
        assert!(matches!(init_logging(cfg), Err(LoggingError::InvalidLevel(_))));
    }

    /// Тест проверяет, что повторная инициализация сообщает об ошибке, а
    /// не паникует.
    #[test]
    #[serial]
    fn test_second_init_is_an_error() {
        std::env::remove_var(ENV_LOG_LEVEL);
        std::env::remove_var(ENV_LOG_FORMAT);
        let _ = init_logging(LoggingConfig::default());
        assert!(matches!(
            init_logging(LoggingConfig::default()),
            Err(LoggingError::AlreadyInitialized(_))
        ));
    }
}
