use std::{env, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::LoggingError;

/// Переменная окружения, переопределяющая уровень логирования.
pub const ENV_LOG_LEVEL: &str = "LIBRIS_LOG_LEVEL";
/// Переменная окружения, переопределяющая формат вывода.
pub const ENV_LOG_FORMAT: &str = "LIBRIS_LOG_FORMAT";

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(LoggingError::InvalidFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        };
        f.write_str(s)
    }
}

/// Настройки логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень: trace | debug | info | warn | error | off.
    pub level: String,
    pub format: LogFormat,
    /// Дополнительные директивы `EnvFilter`, например
    /// `libris::loader=trace`.
    pub directives: Vec<String>,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            directives: Vec::new(),
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl LoggingConfig {
    /// Применяет `LIBRIS_LOG_LEVEL` и `LIBRIS_LOG_FORMAT`, если они заданы.
    pub fn apply_env_overrides(&mut self) -> Result<(), LoggingError> {
        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            self.level = level.trim().to_ascii_lowercase();
        }
        if let Ok(format) = env::var(ENV_LOG_FORMAT) {
            self.format = format.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        let level = self.level.to_ascii_lowercase();
        if !LEVELS.contains(&level.as_str()) {
            return Err(LoggingError::InvalidLevel(self.level.clone()));
        }
        Ok(())
    }

    /// Директива для `EnvFilter`: базовый уровень и затем дополнительные
    /// директивы через запятую.
    pub fn build_filter_directive(&self) -> String {
        let mut parts = Vec::with_capacity(self.directives.len() + 1);
        parts.push(self.level.to_ascii_lowercase());
        parts.extend(
            self.directives
                .iter()
                .map(|d| d.trim())
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        );
        parts.join(",")
    }
}
