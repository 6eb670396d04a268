use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use libris_error::LoaderError;

use super::Key;

/// Внешний источник агрегатов: «сколько дочерних записей у каждого
/// родителя из набора».
///
/// Реализация обязана выполнять запрос за один round trip независимо от
/// числа ключей. Ключи, которых нет в данных, просто отсутствуют в
/// результате; нулевое значение подставляет [`BatchLoader`].
///
/// [`BatchLoader`]: super::BatchLoader
#[async_trait]
pub trait AggregationSource: Send + Sync + 'static {
    /// Считает дочерние записи, сгруппированные по родительскому ключу.
    ///
    /// Любая ошибка относится ко всему вызову целиком.
    async fn count_by_parent(
        &self,
        keys: &[Key],
    ) -> Result<HashMap<Key, u64>, LoaderError>;
}

#[async_trait]
impl<S: AggregationSource + ?Sized> AggregationSource for Arc<S> {
    async fn count_by_parent(
        &self,
        keys: &[Key],
    ) -> Result<HashMap<Key, u64>, LoaderError> {
        (**self).count_by_parent(keys).await
    }
}
