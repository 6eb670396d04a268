use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use libris_error::{RecvError, TryRecvError};
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{broker::BusInner, EventEnvelope};

/// Идентификатор подписчика, уникальный в пределах одной шины.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl SubscriberId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Результат постановки события в очередь подписчика.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Queued,
    /// Очередь была полна: самое старое событие выброшено.
    DroppedOldest,
    /// Подписчик уже закрыт, событие не принято.
    Closed,
}

struct QueueState<P> {
    events: VecDeque<EventEnvelope<P>>,
    closed: bool,
}

/// Ограниченная FIFO-очередь одного подписчика.
pub(crate) struct SubscriberQueue<P> {
    state: Mutex<QueueState<P>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl<P> SubscriberQueue<P> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Кладёт событие в хвост. Никогда не ждёт потребителя: при
    /// переполнении выбрасывает голову очереди.
    pub(crate) fn push(
        &self,
        envelope: EventEnvelope<P>,
    ) -> PushOutcome {
        let mut state = self.state.lock();
        if state.closed {
            return PushOutcome::Closed;
        }
        let outcome = if state.events.len() >= self.capacity {
            state.events.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            PushOutcome::DroppedOldest
        } else {
            PushOutcome::Queued
        };
        state.events.push_back(envelope);
        drop(state);

        self.notify.notify_one();
        outcome
    }

    pub(crate) fn pop(&self) -> Result<EventEnvelope<P>, TryRecvError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TryRecvError::Closed);
        }
        state.events.pop_front().ok_or(TryRecvError::Empty)
    }

    /// Закрывает очередь и освобождает её буфер. Возвращает `false`, если
    /// очередь уже была закрыта.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        state.events = VecDeque::new();
        drop(state);

        self.notify.notify_one();
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Канал подписки на одну тему.
///
/// Выдаёт события в порядке публикации, приостанавливаясь, пока очередь
/// пуста. Событий, опубликованных до подписки, канал не получает.
///
/// Отписка происходит при `Drop`, при [`close`](Self::close), через
/// [`ChannelCloser`] или через [`EventBus::unsubscribe`]. После этого
/// очередь освобождается, а ожидающий `recv` завершается
/// [`RecvError::Closed`].
///
/// [`EventBus::unsubscribe`]: super::EventBus::unsubscribe
pub struct SubscriptionChannel<P> {
    id: SubscriberId,
    topic: Arc<str>,
    queue: Arc<SubscriberQueue<P>>,
    bus: Weak<BusInner<P>>,
}

impl<P> SubscriptionChannel<P> {
    pub(crate) fn new(
        id: SubscriberId,
        topic: Arc<str>,
        queue: Arc<SubscriberQueue<P>>,
        bus: Weak<BusInner<P>>,
    ) -> Self {
        Self {
            id,
            topic,
            queue,
            bus,
        }
    }

    /// Асинхронно ожидает следующее событие.
    ///
    /// # Возвращает
    /// - `Ok(EventEnvelope)`: очередное событие темы
    /// - `Err(RecvError::Closed)`: канал закрыт, событий больше не будет
    pub async fn recv(&mut self) -> Result<EventEnvelope<P>, RecvError> {
        loop {
            match self.queue.pop() {
                Ok(envelope) => return Ok(envelope),
                Err(TryRecvError::Closed) => return Err(RecvError::Closed),
                Err(TryRecvError::Empty) => self.queue.notify.notified().await,
            }
        }
    }

    /// Пытается получить событие без ожидания.
    pub fn try_recv(&mut self) -> Result<EventEnvelope<P>, TryRecvError> {
        self.queue.pop()
    }

    /// Ожидает событие не дольше `duration`.
    pub async fn recv_timeout(
        &mut self,
        duration: Duration,
    ) -> Result<EventEnvelope<P>, RecvError> {
        match tokio::time::timeout(duration, self.recv()).await {
            Ok(res) => res,
            Err(_) => Err(RecvError::Timeout),
        }
    }

    /// Сколько событий выброшено из-за переполнения очереди.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Количество событий, ожидающих получения.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn topic(&self) -> &Arc<str> {
        &self.topic
    }

    /// Ручка, позволяющая закрыть канал из другой задачи, например из
    /// обработчика разрыва транспорта.
    pub fn closer(&self) -> ChannelCloser<P> {
        ChannelCloser {
            id: self.id,
            topic: self.topic.clone(),
            queue: self.queue.clone(),
            bus: self.bus.clone(),
        }
    }

    /// Явно закрыть канал. Аналогично `drop(self)`.
    pub fn close(self) {}
}

impl<P> Drop for SubscriptionChannel<P> {
    fn drop(&mut self) {
        detach(&self.bus, &self.topic, self.id, &self.queue);
    }
}

impl<P> fmt::Debug for SubscriptionChannel<P> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SubscriptionChannel")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("queued", &self.queue.len())
            .field("dropped", &self.queue.dropped())
            .field("closed", &self.queue.is_closed())
            .finish()
    }
}

/// Клонируемая ручка закрытия канала подписки.
pub struct ChannelCloser<P> {
    id: SubscriberId,
    topic: Arc<str>,
    queue: Arc<SubscriberQueue<P>>,
    bus: Weak<BusInner<P>>,
}

impl<P> ChannelCloser<P> {
    /// Закрывает канал: ожидающий `recv` сразу получает `Closed`, шина
    /// перестаёт доставлять события этому подписчику.
    pub fn close(&self) {
        detach(&self.bus, &self.topic, self.id, &self.queue);
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

impl<P> Clone for ChannelCloser<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            topic: self.topic.clone(),
            queue: self.queue.clone(),
            bus: self.bus.clone(),
        }
    }
}

fn detach<P>(
    bus: &Weak<BusInner<P>>,
    topic: &str,
    id: SubscriberId,
    queue: &SubscriberQueue<P>,
) {
    queue.close();
    if let Some(bus) = bus.upgrade() {
        bus.deregister(topic, id);
    }
}
