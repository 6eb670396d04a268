use std::io::{self, Stderr};

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::Layer as LayerTrait,
    registry::LookupSpan,
};

use super::{LogFormat, LoggingConfig};

/// Строит fmt-слой по конфигурации. Тип формата стирается через `Box`.
///
/// Логи пишутся в stderr: stdout остаётся за данными (например, за
/// пересылкой событий подписки).
pub fn build_formatter_from_config<S>(config: &LoggingConfig) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let writer: fn() -> Stderr = io::stderr;

    match config.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .event_format(fmt::format().json().with_current_span(true))
                .with_writer(writer)
                .with_ansi(false)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_line_number(config.with_line_numbers);
            Box::new(layer)
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .event_format(fmt::format().pretty())
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_line_number(config.with_line_numbers);
            Box::new(layer)
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .event_format(fmt::format().compact())
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_line_number(config.with_line_numbers);
            Box::new(layer)
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tracing::info;
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;

    /// Тест проверяет, что слой любого формата регистрируется и пишет без
    /// паники.
    #[rstest]
    #[case(LogFormat::Json)]
    #[case(LogFormat::Pretty)]
    #[case(LogFormat::Compact)]
    fn test_layer_for_each_format(#[case] format: LogFormat) {
        let cfg = LoggingConfig {
            format,
            with_ansi: false,
            ..Default::default()
        };
        let subscriber = Registry::default().with(build_formatter_from_config(&cfg));

        tracing::subscriber::with_default(subscriber, || {
            info!(format = %format, "formatter smoke test");
        });
    }
}
