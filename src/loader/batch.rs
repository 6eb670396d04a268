use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    future::Future,
    mem,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use libris_error::LoaderError;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use super::{AggregationSource, Key};

/// Размер пакета, при достижении которого он уходит в источник сразу.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

type Waiter = oneshot::Sender<Result<u64, LoaderError>>;

/// Параметры коалесцирования.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Максимум различных ключей в одном запросе к источнику.
    pub max_batch_size: usize,
    /// Дополнительная задержка после закрытия окна.
    /// Нулевое значение означает выгрузку при первом опросе.
    pub batch_delay: Duration,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            batch_delay: Duration::ZERO,
        }
    }
}

/// Счётчики загрузчика за время его жизни.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Сколько раз вызывался источник.
    pub batches: u64,
    /// Сколько различных ключей ушло в источник суммарно.
    pub keys_dispatched: u64,
    /// Сколько вызовов `load` обслужено из кэша.
    pub cache_hits: u64,
    /// Сколько пакетов завершилось ошибкой источника.
    pub failures: u64,
}

/// Ключи, собранные за текущее окно, и ожидающие их вызывающие.
#[derive(Default)]
struct PendingBatch {
    /// Различные ключи в порядке первого запроса.
    keys: Vec<Key>,
    waiters: HashMap<Key, Vec<Waiter>>,
}

impl PendingBatch {
    fn push(
        &mut self,
        key: Key,
        waiter: Waiter,
    ) {
        match self.waiters.entry(key) {
            Entry::Occupied(mut e) => e.get_mut().push(waiter),
            Entry::Vacant(e) => {
                self.keys.push(e.key().clone());
                e.insert(vec![waiter]);
            }
        }
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Default)]
struct LoaderState {
    /// Разрешённые значения. Ошибки сюда не попадают никогда.
    cache: HashMap<Key, u64>,
    pending: PendingBatch,
    /// Ключи, уже отправленные в источник и ещё не получившие ответ.
    in_flight: HashMap<Key, Vec<Waiter>>,
    /// Номер текущего окна. Растёт при каждой выгрузке пакета.
    window: u64,
    /// Взведена ли отложенная выгрузка текущего окна.
    flush_armed: bool,
    stats: LoaderStats,
}

impl LoaderState {
    /// Переводит накопленный пакет в состояние «в полёте».
    fn take_pending(&mut self) -> Option<Vec<Key>> {
        if self.pending.is_empty() {
            return None;
        }
        let PendingBatch { keys, waiters } = mem::take(&mut self.pending);
        self.in_flight.extend(waiters);
        self.window += 1;
        self.flush_armed = false;
        self.stats.batches += 1;
        self.stats.keys_dispatched += keys.len() as u64;
        Some(keys)
    }
}

struct LoaderInner {
    source: Arc<dyn AggregationSource>,
    options: LoaderOptions,
    state: Mutex<LoaderState>,
}

/// Пакетный загрузчик агрегатов с кэшем на время одного запроса.
///
/// Все вызовы [`load`](Self::load), сделанные до первого ожидания любой
/// из полученных futures, собираются в один пакет. Первый опрос такой
/// future закрывает окно: пакет дедуплицируется и уходит в
/// [`AggregationSource`] одним вызовом, результат раскладывается по
/// ожидающим и кэшируется. Окно привязано к вызывающей задаче, поэтому
/// на многопоточном runtime оно не дробится. Второй повод для выгрузки
/// только достижение `max_batch_size`. Ошибка источника раздаётся всем
/// ожидающим пакета и не кэшируется.
///
/// Экземпляр создаётся на один входящий запрос (см.
/// [`LoaderFactory`](super::LoaderFactory)) и выбрасывается вместе с ним.
/// Клоны разделяют один и тот же кэш, то есть принадлежат тому же запросу.
///
/// Для выгрузки пакетов используется `tokio::spawn`, поэтому загрузчик
/// должен работать внутри runtime Tokio.
#[derive(Clone)]
pub struct BatchLoader {
    inner: Arc<LoaderInner>,
}

/// Право закрыть окно, в котором был зарегистрирован ключ.
struct FlushTrigger {
    inner: Arc<LoaderInner>,
    window: u64,
}

enum Lookup {
    Ready(u64),
    Waiting {
        rx: oneshot::Receiver<Result<u64, LoaderError>>,
        trigger: Option<FlushTrigger>,
    },
}

/// Future, возвращаемая [`BatchLoader::load`].
///
/// Ключ регистрируется в пакете в момент вызова `load`, а первый опрос
/// закрывает окно. Поэтому несколько futures, созданных подряд и
/// ожидаемых последовательно, попадают в один пакет. Future, которую
/// никто не опрашивает, окно не закрывает.
#[must_use = "futures do nothing unless awaited"]
pub struct LoadFuture {
    lookup: Lookup,
}

impl Future for LoadFuture {
    type Output = Result<u64, LoaderError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        match &mut self.lookup {
            Lookup::Ready(value) => Poll::Ready(Ok(*value)),
            Lookup::Waiting { rx, trigger } => {
                if let Some(FlushTrigger { inner, window }) = trigger.take() {
                    inner.close_window(window);
                }
                Pin::new(rx)
                    .poll(cx)
                    .map(|res| res.unwrap_or(Err(LoaderError::Cancelled)))
            }
        }
    }
}

impl BatchLoader {
    pub fn new(
        source: Arc<dyn AggregationSource>,
        options: LoaderOptions,
    ) -> Self {
        let options = LoaderOptions {
            max_batch_size: options.max_batch_size.max(1),
            ..options
        };
        Self {
            inner: Arc::new(LoaderInner {
                source,
                options,
                state: Mutex::new(LoaderState::default()),
            }),
        }
    }

    /// Запрашивает агрегат для ключа.
    ///
    /// Если значение уже есть в кэше, future готова сразу и источник не
    /// вызывается. Если ключ уже в полёте, вызывающий присоединяется к
    /// этому запросу. Иначе ключ попадает в текущий пакет.
    pub fn load(
        &self,
        key: impl Into<Key>,
    ) -> LoadFuture {
        LoadFuture {
            lookup: self.enqueue(key.into()),
        }
    }

    /// Запрашивает набор ключей одним окном. Порядок результатов
    /// соответствует порядку ключей, повторы допускаются.
    pub async fn load_many<I, K>(
        &self,
        keys: I,
    ) -> Vec<Result<u64, LoaderError>>
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        let futures: Vec<LoadFuture> = keys.into_iter().map(|k| self.load(k)).collect();
        let mut results = Vec::with_capacity(futures.len());
        for fut in futures {
            results.push(fut.await);
        }
        results
    }

    /// Значение из кэша без обращения к источнику.
    pub fn cached(
        &self,
        key: impl Into<Key>,
    ) -> Option<u64> {
        let key = key.into();
        self.inner.state.lock().cache.get(&key).copied()
    }

    pub fn stats(&self) -> LoaderStats {
        self.inner.state.lock().stats
    }

    pub fn options(&self) -> LoaderOptions {
        self.inner.options
    }

    fn enqueue(
        &self,
        key: Key,
    ) -> Lookup {
        let mut state = self.inner.state.lock();

        if let Some(&value) = state.cache.get(&key) {
            state.stats.cache_hits += 1;
            trace!(key = %key, "aggregate served from request cache");
            return Lookup::Ready(value);
        }

        let (tx, rx) = oneshot::channel();

        if let Some(waiters) = state.in_flight.get_mut(&key) {
            waiters.push(tx);
            return Lookup::Waiting { rx, trigger: None };
        }

        let window = state.window;
        state.pending.push(key, tx);

        let full = if state.pending.len() >= self.inner.options.max_batch_size {
            state.take_pending()
        } else {
            None
        };
        drop(state);

        if let Some(keys) = full {
            tokio::spawn(self.inner.clone().dispatch(keys));
            return Lookup::Waiting { rx, trigger: None };
        }

        Lookup::Waiting {
            rx,
            trigger: Some(FlushTrigger {
                inner: self.inner.clone(),
                window,
            }),
        }
    }
}

impl LoaderInner {
    /// Закрывает окно `window`, если оно ещё копится. Без задержки пакет
    /// уходит сразу, иначе взводится отложенная выгрузка.
    fn close_window(
        self: Arc<Self>,
        window: u64,
    ) {
        let mut state = self.state.lock();
        if state.window != window || state.pending.is_empty() {
            return;
        }

        if self.options.batch_delay.is_zero() {
            let keys = state.take_pending();
            drop(state);
            if let Some(keys) = keys {
                tokio::spawn(self.clone().dispatch(keys));
            }
        } else if !state.flush_armed {
            state.flush_armed = true;
            drop(state);
            tokio::spawn(self.clone().flush_after_delay(window));
        }
    }

    async fn flush_after_delay(
        self: Arc<Self>,
        window: u64,
    ) {
        tokio::time::sleep(self.options.batch_delay).await;

        let keys = {
            let mut state = self.state.lock();
            if state.window != window {
                return;
            }
            state.take_pending()
        };

        if let Some(keys) = keys {
            self.dispatch(keys).await;
        }
    }

    async fn dispatch(
        self: Arc<Self>,
        keys: Vec<Key>,
    ) {
        debug!(batch_size = keys.len(), "dispatching aggregate batch");

        let mut guard = InFlightGuard {
            inner: &self,
            keys: &keys,
            settled: false,
        };
        let result = self.source.count_by_parent(&keys).await;
        self.complete(&keys, result);
        guard.settled = true;
    }

    fn complete(
        &self,
        keys: &[Key],
        result: Result<HashMap<Key, u64>, LoaderError>,
    ) {
        let mut state = self.state.lock();
        match result {
            Ok(mut counts) => {
                for key in keys {
                    let value = counts.remove(key).unwrap_or_default();
                    state.cache.insert(key.clone(), value);
                    for waiter in state.in_flight.remove(key).unwrap_or_default() {
                        let _ = waiter.send(Ok(value));
                    }
                }
            }
            Err(err) => {
                state.stats.failures += 1;
                warn!(batch_size = keys.len(), error = %err, "aggregate batch failed");
                for key in keys {
                    for waiter in state.in_flight.remove(key).unwrap_or_default() {
                        let _ = waiter.send(Err(err.clone()));
                    }
                }
            }
        }
    }
}

/// Снимает ключи пакета из таблицы «в полёте», если выгрузка оборвалась
/// (паника источника, остановка runtime). Ожидающие получают
/// [`LoaderError::Cancelled`], а следующий `load` начнёт новый пакет.
struct InFlightGuard<'a> {
    inner: &'a LoaderInner,
    keys: &'a [Key],
    settled: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.inner.state.lock();
        for key in self.keys {
            state.in_flight.remove(key);
        }
    }
}

impl fmt::Debug for BatchLoader {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BatchLoader")
            .field("options", &self.inner.options)
            .field("cached", &state.cache.len())
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight.len())
            .field("stats", &state.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use tokio::{
        sync::Notify,
        time::{timeout, Duration},
    };

    use super::*;

    /// Источник, записывающий каждый вызов.
    #[derive(Default)]
    struct RecordingSource {
        counts: HashMap<Key, u64>,
        calls: Mutex<Vec<Vec<Key>>>,
        fail: AtomicBool,
        panic: AtomicBool,
        gate: Option<Arc<Notify>>,
    }

    impl RecordingSource {
        fn with_counts(pairs: &[(&str, u64)]) -> Self {
            Self {
                counts: pairs.iter().map(|(k, v)| (Key::from(*k), *v)).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Vec<Key>> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl AggregationSource for RecordingSource {
        async fn count_by_parent(
            &self,
            keys: &[Key],
        ) -> Result<HashMap<Key, u64>, LoaderError> {
            self.calls.lock().push(keys.to_vec());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.panic.load(Ordering::SeqCst) {
                panic!("source exploded");
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(LoaderError::source_unavailable("store offline"));
            }
            Ok(keys
                .iter()
                .filter_map(|k| self.counts.get(k).map(|v| (k.clone(), *v)))
                .collect())
        }
    }

    fn keys(list: &[&str]) -> Vec<Key> {
        list.iter().map(|k| Key::from(*k)).collect()
    }

    const WAIT: Duration = Duration::from_secs(1);

    /// Тест проверяет сценарий `[A, A, B]` при ответе `{A: 3}`.
    #[tokio::test]
    async fn test_same_window_is_coalesced_and_deduplicated() {
        let source = Arc::new(RecordingSource::with_counts(&[("A", 3)]));
        let loader = BatchLoader::new(source.clone(), LoaderOptions::default());

        let (a1, a2, b) = timeout(
            WAIT,
            async { tokio::join!(loader.load("A"), loader.load("A"), loader.load("B")) },
        )
        .await
        .expect("timed out");

        assert_eq!(a1, Ok(3));
        assert_eq!(a2, Ok(3));
        assert_eq!(b, Ok(0));
        assert_eq!(source.calls(), vec![keys(&["A", "B"])]);
        assert_eq!(loader.stats().batches, 1);
    }

    /// Тест проверяет, что futures, созданные подряд и ожидаемые
    /// последовательно, попадают в один пакет.
    #[tokio::test]
    async fn test_sequential_awaits_share_window() {
        let source = Arc::new(RecordingSource::with_counts(&[("x", 1), ("y", 2)]));
        let loader = BatchLoader::new(source.clone(), LoaderOptions::default());

        let fx = loader.load("x");
        let fy = loader.load("y");
        assert_eq!(fx.await, Ok(1));
        assert_eq!(fy.await, Ok(2));
        assert_eq!(source.calls().len(), 1);
    }

    /// Тест проверяет, что повторный запрос после разрешения пакета
    /// обслуживается из кэша без нового вызова источника.
    #[tokio::test]
    async fn test_cached_value_skips_source() {
        let source = Arc::new(RecordingSource::with_counts(&[("A", 5)]));
        let loader = BatchLoader::new(source.clone(), LoaderOptions::default());

        assert_eq!(loader.load("A").await, Ok(5));
        assert_eq!(loader.cached("A"), Some(5));
        assert_eq!(loader.load("A").await, Ok(5));

        assert_eq!(source.calls().len(), 1);
        assert_eq!(loader.stats().cache_hits, 1);
    }

    /// Тест проверяет, что ошибка источника раздаётся всем ожидающим,
    /// не кэшируется и следующий `load` повторяет запрос.
    #[tokio::test]
    async fn test_failure_is_shared_and_not_cached() {
        let source = Arc::new(RecordingSource::with_counts(&[("A", 2)]));
        source.fail.store(true, Ordering::SeqCst);
        let loader = BatchLoader::new(source.clone(), LoaderOptions::default());

        let (a1, a2, b) = tokio::join!(loader.load("A"), loader.load("A"), loader.load("B"));
        let expected = Err(LoaderError::source_unavailable("store offline"));
        assert_eq!(a1, expected);
        assert_eq!(a2, expected);
        assert_eq!(b, expected);
        assert_eq!(loader.cached("A"), None);

        source.fail.store(false, Ordering::SeqCst);
        assert_eq!(loader.load("A").await, Ok(2));
        assert_eq!(source.calls(), vec![keys(&["A", "B"]), keys(&["A"])]);
        assert_eq!(loader.stats().failures, 1);
    }

    /// Тест проверяет, что ключ, уже находящийся в полёте, не
    /// отправляется в источник второй раз.
    #[tokio::test]
    async fn test_in_flight_key_is_joined() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(RecordingSource {
            counts: [(Key::from("A"), 7)].into_iter().collect(),
            gate: Some(gate.clone()),
            ..RecordingSource::default()
        });
        let loader = BatchLoader::new(source.clone(), LoaderOptions::default());

        let first = tokio::spawn(loader.load("A"));
        while source.calls().is_empty() {
            tokio::task::yield_now().await;
        }
        let second = loader.load("A");
        gate.notify_one();

        let first = timeout(WAIT, first).await.expect("timed out");
        assert_eq!(first.expect("task panicked"), Ok(7));
        assert_eq!(timeout(WAIT, second).await.expect("timed out"), Ok(7));
        assert_eq!(source.calls().len(), 1);
    }

    /// Тест проверяет, что переполненное окно уходит в источник сразу, а
    /// остаток уходит отдельным пакетом.
    #[tokio::test]
    async fn test_max_batch_size_splits_window() {
        let source = Arc::new(RecordingSource::default());
        let options = LoaderOptions {
            max_batch_size: 2,
            ..LoaderOptions::default()
        };
        let loader = BatchLoader::new(source.clone(), options);

        let results = loader.load_many(["a", "b", "c", "a"]).await;
        assert_eq!(results, vec![Ok(0), Ok(0), Ok(0), Ok(0)]);

        let mut calls = source.calls();
        calls.sort();
        assert_eq!(calls, vec![keys(&["a", "b"]), keys(&["c"])]);
    }

    /// Тест проверяет, что задержка окна собирает ключи, пришедшие уже
    /// после первого опроса.
    #[tokio::test(start_paused = true)]
    async fn test_batch_delay_extends_window() {
        let source = Arc::new(RecordingSource::with_counts(&[("a", 1), ("b", 2)]));
        let options = LoaderOptions {
            batch_delay: Duration::from_millis(20),
            ..LoaderOptions::default()
        };
        let loader = BatchLoader::new(source.clone(), options);

        let fa = tokio::spawn(loader.load("a"));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(source.calls().is_empty());
        let fb = loader.load("b");

        assert_eq!(fa.await.expect("task panicked"), Ok(1));
        assert_eq!(fb.await, Ok(2));
        assert_eq!(source.calls(), vec![keys(&["a", "b"])]);
    }

    /// Тест проверяет, что окно остаётся открытым, пока ни одна future
    /// не опрошена, даже если другие задачи успевают поработать.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_window_waits_for_first_poll() {
        let source = Arc::new(RecordingSource::default());
        let loader = BatchLoader::new(source.clone(), LoaderOptions::default());

        let first = loader.load("a");
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(source.calls().is_empty());
        let second = loader.load("b");

        assert_eq!(timeout(WAIT, first).await.expect("timed out"), Ok(0));
        assert_eq!(timeout(WAIT, second).await.expect("timed out"), Ok(0));
        assert_eq!(source.calls(), vec![keys(&["a", "b"])]);
    }

    /// Тест проверяет, что на многопоточном runtime длинная серия
    /// `load` из одной задачи уходит в источник одним вызовом.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_burst_is_one_batch_on_multi_thread() {
        const BURST: u64 = 5000;

        for _ in 0..20 {
            let source = Arc::new(RecordingSource::default());
            let options = LoaderOptions {
                max_batch_size: BURST as usize,
                ..LoaderOptions::default()
            };
            let loader = BatchLoader::new(source.clone(), options);

            let futures: Vec<LoadFuture> = (0..BURST).map(|i| loader.load(i)).collect();
            for fut in futures {
                assert_eq!(timeout(WAIT, fut).await.expect("timed out"), Ok(0));
            }

            let calls = source.calls();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].len(), BURST as usize);
        }
    }

    /// Тест проверяет, что паника источника отдаёт ожидающим `Cancelled`
    /// и не оставляет ключ навсегда «в полёте».
    #[tokio::test]
    async fn test_aborted_dispatch_cancels_waiters() {
        let source = Arc::new(RecordingSource::with_counts(&[("A", 4)]));
        source.panic.store(true, Ordering::SeqCst);
        let loader = BatchLoader::new(source.clone(), LoaderOptions::default());

        let res = timeout(WAIT, loader.load("A")).await.expect("timed out");
        assert_eq!(res, Err(LoaderError::Cancelled));

        source.panic.store(false, Ordering::SeqCst);
        let res = timeout(WAIT, loader.load("A")).await.expect("timed out");
        assert_eq!(res, Ok(4));
        assert_eq!(source.calls().len(), 2);
    }

    /// Тест проверяет, что разные экземпляры не делят кэш.
    #[tokio::test]
    async fn test_instances_do_not_share_cache() {
        let source = Arc::new(RecordingSource::with_counts(&[("A", 1)]));
        let first = BatchLoader::new(source.clone(), LoaderOptions::default());
        let second = BatchLoader::new(source.clone(), LoaderOptions::default());

        assert_eq!(first.load("A").await, Ok(1));
        assert_eq!(second.cached("A"), None);
        assert_eq!(second.load("A").await, Ok(1));
        assert_eq!(source.calls().len(), 2);
    }

    /// Тест проверяет, что нулевой размер пакета приводится к единице.
    #[test]
    fn test_zero_max_batch_size_is_clamped() {
        let source: Arc<dyn AggregationSource> = Arc::new(RecordingSource::default());
        let options = LoaderOptions {
            max_batch_size: 0,
            ..LoaderOptions::default()
        };
        let loader = BatchLoader::new(source, options);
        assert_eq!(loader.options().max_batch_size, 1);
    }
}
