use std::{path::Path, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    loader::{LoaderOptions, DEFAULT_MAX_BATCH_SIZE},
    logging::{LoggingConfig, LoggingError},
    pubsub::DEFAULT_QUEUE_CAPACITY,
};

/// Файл конфигурации, который ищется в рабочем каталоге, если путь не
/// задан явно.
pub const DEFAULT_CONFIG_FILE: &str = "libris";
/// Префикс переменных окружения: `LIBRIS_LOADER__MAX_BATCH_SIZE=50`.
pub const ENV_PREFIX: &str = "LIBRIS";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    Logging(#[from] LoggingError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderSettings {
    /// Размер пакета, при котором он уходит в источник немедленно.
    pub max_batch_size: usize,
    /// Дополнительная задержка выгрузки пакета, мс.
    pub batch_delay_ms: u64,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            batch_delay_ms: 0,
        }
    }
}

impl LoaderSettings {
    pub fn options(&self) -> LoaderOptions {
        LoaderOptions {
            max_batch_size: self.max_batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BusSettings {
    /// Ёмкость очереди каждого подписчика.
    pub queue_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Настройки процесса.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub loader: LoaderSettings,
    pub bus: BusSettings,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Загружает настройки: значения по умолчанию, необязательный
    /// `libris.toml` в рабочем каталоге, затем окружение.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(None)
    }

    /// То же, что [`load`](Self::load), но с явным файлом. Явно указанный
    /// файл обязан существовать.
    pub fn load_from(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .set_default("loader.max_batch_size", DEFAULT_MAX_BATCH_SIZE as i64)?
            .set_default("loader.batch_delay_ms", 0i64)?
            .set_default("bus.queue_capacity", DEFAULT_QUEUE_CAPACITY as i64)?;

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let cfg = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.loader.max_batch_size == 0 {
            return Err(SettingsError::Invalid {
                key: "loader.max_batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.bus.queue_capacity == 0 {
            return Err(SettingsError::Invalid {
                key: "bus.queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        self.logging.validate()?;
        Ok(())
    }
}
