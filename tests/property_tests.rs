//! Property-based tests для загрузчика и шины событий.
//!
//! Генерируют случайные наборы ключей и последовательности публикаций и
//! проверяют инварианты: один вызов источника на окно, корректные
//! значения для каждого вызывающего, вытеснение самых старых событий.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use libris::{AggregationSource, BatchLoader, EventBus, Key, LoaderError, LoaderOptions};
use parking_lot::Mutex;
use proptest::prelude::*;

const PROPTEST_CASES: u32 = 256;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Источник с фиксированной таблицей значений, записывающий вызовы.
struct TableSource {
    table: HashMap<Key, u64>,
    calls: Mutex<Vec<Vec<Key>>>,
}

#[async_trait]
impl AggregationSource for TableSource {
    async fn count_by_parent(
        &self,
        keys: &[Key],
    ) -> Result<HashMap<Key, u64>, LoaderError> {
        self.calls.lock().push(keys.to_vec());
        Ok(keys
            .iter()
            .filter_map(|k| self.table.get(k).map(|v| (k.clone(), *v)))
            .collect())
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: PROPTEST_CASES,
        .. ProptestConfig::default()
    })]

    /// Любой набор ключей в одном окне: один вызов источника с
    /// различными ключами в порядке первого запроса, каждый вызывающий
    /// получает значение своего ключа или 0.
    #[test]
    fn prop_single_window_single_call(
        requested in prop::collection::vec(0u8..20, 1..60),
        table in prop::collection::hash_map(0u8..20, 0u64..1000, 0..20),
    ) {
        let source = Arc::new(TableSource {
            table: table.iter().map(|(k, v)| (Key::from(u64::from(*k)), *v)).collect(),
            calls: Mutex::new(Vec::new()),
        });
        let loader = BatchLoader::new(source.clone(), LoaderOptions::default());

        let results = runtime().block_on(
            loader.load_many(requested.iter().map(|k| u64::from(*k)))
        );

        for (k, res) in requested.iter().zip(&results) {
            let expected = table.get(k).copied().unwrap_or(0);
            prop_assert_eq!(res.clone(), Ok(expected));
        }

        let calls = source.calls.lock().clone();
        prop_assert_eq!(calls.len(), 1);

        let mut seen = BTreeSet::new();
        let first_order: Vec<Key> = requested
            .iter()
            .filter(|k| seen.insert(**k))
            .map(|k| Key::from(u64::from(*k)))
            .collect();
        prop_assert_eq!(&calls[0], &first_order);
    }

    /// Размер каждого пакета не превышает `max_batch_size`, и каждый
    /// различный ключ уходит в источник ровно один раз.
    #[test]
    fn prop_batches_respect_max_size(
        requested in prop::collection::vec(0u16..200, 1..120),
        max_batch_size in 1usize..16,
    ) {
        let source = Arc::new(TableSource {
            table: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        });
        let options = LoaderOptions { max_batch_size, ..LoaderOptions::default() };
        let loader = BatchLoader::new(source.clone(), options);

        let results = runtime().block_on(
            loader.load_many(requested.iter().map(|k| u64::from(*k)))
        );
        prop_assert!(results.iter().all(|r| *r == Ok(0)));

        let calls = source.calls.lock().clone();
        prop_assert!(calls.iter().all(|c| c.len() <= max_batch_size));

        let dispatched: Vec<&Key> = calls.iter().flatten().collect();
        let distinct: BTreeSet<&Key> = dispatched.iter().copied().collect();
        prop_assert_eq!(dispatched.len(), distinct.len());
        let expected: BTreeSet<u16> = requested.iter().copied().collect();
        prop_assert_eq!(distinct.len(), expected.len());
    }

    /// После `n` публикаций в очередь ёмкостью `c` остаются последние
    /// `min(n, c)` событий по порядку, а `dropped == n - min(n, c)`.
    #[test]
    fn prop_drop_oldest(
        capacity in 1usize..32,
        published in 0u32..100,
    ) {
        let bus: EventBus<u32> = EventBus::new(capacity);
        let mut sub = bus.subscribe("t");
        for n in 0..published {
            bus.publish("t", n);
        }

        let kept = (published as usize).min(capacity);
        prop_assert_eq!(sub.len(), kept);
        prop_assert_eq!(sub.dropped(), (published as usize - kept) as u64);

        let received: Vec<u32> = std::iter::from_fn(|| sub.try_recv().ok())
            .map(|e| *e.payload)
            .collect();
        let expected: Vec<u32> = (published - kept as u32..published).collect();
        prop_assert_eq!(received, expected);
    }
}
