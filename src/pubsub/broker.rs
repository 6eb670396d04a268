use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::{
    intern_topic,
    subscriber::{PushOutcome, SubscriberQueue},
    EventEnvelope, SubscriberId, SubscriptionChannel,
};

/// Ёмкость очереди подписчика по умолчанию.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Счётчики шины событий.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventBusStats {
    /// Все вызовы `publish`.
    pub published: u64,
    /// Постановки события в очереди подписчиков.
    pub delivered: u64,
    /// События, вытесненные из переполненных очередей.
    pub dropped: u64,
    /// Публикации в тему без подписчиков.
    pub discarded: u64,
}

struct Subscriber<P> {
    id: SubscriberId,
    queue: Arc<SubscriberQueue<P>>,
}

/// Запись реестра. Запись темы, в которую уже доставлялись события, не
/// удаляется при уходе последнего подписчика, чтобы номера
/// последовательности не начинались заново. Запись без подписчиков и без
/// доставок удаляется сразу, поэтому подписки на случайные имена тем не
/// раздувают реестр.
struct TopicEntry<P> {
    last_sequence: u64,
    subscribers: Vec<Subscriber<P>>,
}

impl<P> TopicEntry<P> {
    fn new() -> Self {
        Self {
            last_sequence: 0,
            subscribers: Vec::new(),
        }
    }

    fn is_idle(&self) -> bool {
        self.subscribers.is_empty() && self.last_sequence == 0
    }
}

pub(crate) struct BusInner<P> {
    topics: DashMap<Arc<str>, TopicEntry<P>>,
    queue_capacity: usize,
    next_id: AtomicU64,
    closed: AtomicBool,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    discarded: AtomicU64,
}

impl<P> BusInner<P> {
    /// Убирает подписчика из реестра. Возвращает `true`, если он там был.
    pub(crate) fn deregister(
        &self,
        topic: &str,
        id: SubscriberId,
    ) -> bool {
        let Some(mut entry) = self.topics.get_mut(topic) else {
            return false;
        };
        let before = entry.subscribers.len();
        entry.subscribers.retain(|s| s.id != id);
        let removed = entry.subscribers.len() != before;
        if removed {
            debug!(topic = %entry.key(), subscriber = %id, "unsubscribed");
        }
        drop(entry);
        self.prune(topic);
        removed
    }

    /// Удаляет запись темы, если у неё нет ни подписчиков, ни истории.
    fn prune(
        &self,
        topic: &str,
    ) {
        if self.topics.remove_if(topic, |_, e| e.is_idle()).is_some() {
            trace!(topic, "idle topic entry removed");
        }
    }
}

/// Внутрипроцессная шина событий с разветвлением по темам.
///
/// Каждый подписчик получает собственную ограниченную очередь. Публикация
/// никогда не ждёт потребителей: если очередь подписчика заполнена,
/// из неё вытесняется самое старое событие, а счётчик `dropped` этого
/// подписчика растёт. Медленный подписчик не влияет на остальных.
///
/// Шина дёшево клонируется, все клоны разделяют один реестр.
pub struct EventBus<P> {
    inner: Arc<BusInner<P>>,
}

impl<P> EventBus<P> {
    /// Создаёт шину с заданной ёмкостью очереди каждого подписчика
    /// (не меньше 1).
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: DashMap::new(),
                queue_capacity: queue_capacity.max(1),
                next_id: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        }
    }

    /// Публикует событие всем текущим подписчикам темы.
    ///
    /// Полезная нагрузка оборачивается в `Arc` один раз и разделяется
    /// между подписчиками. Без подписчиков событие просто отбрасывается.
    ///
    /// # Возвращает
    /// Число подписчиков, в очереди которых попало событие.
    pub fn publish(
        &self,
        topic: &str,
        payload: P,
    ) -> usize {
        let inner = &self.inner;
        inner.published.fetch_add(1, Ordering::Relaxed);

        let Some(mut entry) = inner.topics.get_mut(topic) else {
            inner.discarded.fetch_add(1, Ordering::Relaxed);
            trace!(topic, "no subscribers, event discarded");
            return 0;
        };
        if entry.subscribers.is_empty() {
            drop(entry);
            inner.discarded.fetch_add(1, Ordering::Relaxed);
            trace!(topic, "no subscribers, event discarded");
            return 0;
        }

        entry.last_sequence += 1;
        let envelope = EventEnvelope::new(entry.key().clone(), entry.last_sequence, Arc::new(payload));

        let mut delivered = 0;
        let mut stale = false;
        for sub in &entry.subscribers {
            match sub.queue.push(envelope.clone()) {
                PushOutcome::Queued => delivered += 1,
                PushOutcome::DroppedOldest => {
                    delivered += 1;
                    inner.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        topic,
                        subscriber = %sub.id,
                        sequence = envelope.sequence,
                        "subscriber queue full, oldest event dropped"
                    );
                }
                PushOutcome::Closed => stale = true,
            }
        }
        if stale {
            entry.subscribers.retain(|s| !s.queue.is_closed());
        }
        drop(entry);

        inner.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        trace!(topic, sequence = envelope.sequence, delivered, "event published");
        delivered
    }

    /// Подписывается на тему.
    ///
    /// Канал получит только события, опубликованные после этого вызова.
    /// На закрытой шине возвращается уже закрытый канал.
    pub fn subscribe(
        &self,
        topic: &str,
    ) -> SubscriptionChannel<P> {
        let topic = intern_topic(topic);
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let queue = Arc::new(SubscriberQueue::new(self.inner.queue_capacity));

        let rejected = {
            let mut entry = self
                .inner
                .topics
                .entry(topic.clone())
                .or_insert_with(TopicEntry::new);
            // Проверка под блокировкой записи не даёт подписке проскочить
            // мимо конкурентного `close`.
            if self.inner.closed.load(Ordering::Acquire) {
                queue.close();
                true
            } else {
                entry.subscribers.push(Subscriber {
                    id,
                    queue: queue.clone(),
                });
                false
            }
        };
        if rejected {
            self.inner.prune(&topic);
        }

        debug!(topic = %topic, subscriber = %id, "subscribed");
        SubscriptionChannel::new(id, topic, queue, Arc::downgrade(&self.inner))
    }

    /// Отписывает канал. Очередь освобождается, ошибок при последующих
    /// публикациях в тему нет.
    ///
    /// Возвращает `true`, если подписчик был зарегистрирован на этой шине.
    pub fn unsubscribe(
        &self,
        channel: SubscriptionChannel<P>,
    ) -> bool {
        let removed = self.inner.deregister(channel.topic(), channel.id());
        drop(channel);
        removed
    }

    /// Закрывает все каналы темы. Возвращает число закрытых каналов.
    pub fn unsubscribe_all(
        &self,
        topic: &str,
    ) -> usize {
        let Some(mut entry) = self.inner.topics.get_mut(topic) else {
            return 0;
        };
        let subscribers = std::mem::take(&mut entry.subscribers);
        drop(entry);
        self.inner.prune(topic);

        for sub in &subscribers {
            sub.queue.close();
        }
        debug!(topic, closed = subscribers.len(), "all subscribers removed");
        subscribers.len()
    }

    /// Закрывает шину: все каналы завершаются, новые подписки
    /// возвращаются закрытыми, публикации отбрасываются.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut closed = 0usize;
        for mut entry in self.inner.topics.iter_mut() {
            for sub in entry.subscribers.drain(..) {
                sub.queue.close();
                closed += 1;
            }
        }
        self.inner.topics.retain(|_, e| !e.is_idle());
        debug!(closed, "event bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Число активных подписчиков темы.
    pub fn subscriber_count(
        &self,
        topic: &str,
    ) -> usize {
        self.inner
            .topics
            .get(topic)
            .map(|e| e.subscribers.len())
            .unwrap_or(0)
    }

    /// Темы, на которые есть хотя бы одна активная подписка.
    pub fn topics(&self) -> Vec<Arc<str>> {
        let mut topics: Vec<Arc<str>> = self
            .inner
            .topics
            .iter()
            .filter(|e| !e.subscribers.is_empty())
            .map(|e| e.key().clone())
            .collect();
        topics.sort();
        topics
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.queue_capacity
    }

    pub fn stats(&self) -> EventBusStats {
        let inner = &self.inner;
        EventBusStats {
            published: inner.published.load(Ordering::Relaxed),
            delivered: inner.delivered.load(Ordering::Relaxed),
            dropped: inner.dropped.load(Ordering::Relaxed),
            discarded: inner.discarded.load(Ordering::Relaxed),
        }
    }
}

impl<P> Clone for EventBus<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl<P> fmt::Debug for EventBus<P> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("queue_capacity", &self.inner.queue_capacity)
            .field("topics", &self.inner.topics.len())
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}
