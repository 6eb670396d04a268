use std::sync::Arc;

use tracing::trace;

use super::{AggregationSource, BatchLoader, LoaderOptions};

/// Фабрика загрузчиков с областью жизни «один запрос».
///
/// Фабрика живёт всё время работы процесса, но кэша не держит: каждый
/// вызов [`for_request`](Self::for_request) возвращает новый
/// [`BatchLoader`] с пустым кэшем. Переиспользовать загрузчик между
/// запросами нельзя, данные могли измениться.
#[derive(Clone)]
pub struct LoaderFactory {
    source: Arc<dyn AggregationSource>,
    options: LoaderOptions,
}

impl LoaderFactory {
    pub fn new(
        source: Arc<dyn AggregationSource>,
        options: LoaderOptions,
    ) -> Self {
        Self { source, options }
    }

    /// Свежий загрузчик для очередного входящего запроса.
    pub fn for_request(&self) -> BatchLoader {
        trace!("creating request-scoped batch loader");
        BatchLoader::new(self.source.clone(), self.options)
    }

    pub fn options(&self) -> LoaderOptions {
        self.options
    }
}

impl std::fmt::Debug for LoaderFactory {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoaderFactory")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
