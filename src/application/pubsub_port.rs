//! Интерфейс (порт) публикации событий и подписки на них.
//!
//! - `publish`: опубликовать событие в тему.
//! - `subscribe`: подписаться на тему.
//! - `unsubscribe_all`: закрыть все подписки темы.

use crate::pubsub::{EventBus, SubscriptionChannel};

pub trait PubSubPort<P>: Send + Sync {
    /// Опубликовать событие. Возвращает число получивших его подписчиков.
    fn publish(
        &self,
        topic: &str,
        payload: P,
    ) -> usize;
    /// Подписаться на тему.
    fn subscribe(
        &self,
        topic: &str,
    ) -> SubscriptionChannel<P>;
    /// Закрыть все подписки темы.
    fn unsubscribe_all(
        &self,
        topic: &str,
    ) -> usize;
}

impl<P: Send + Sync> PubSubPort<P> for EventBus<P> {
    fn publish(
        &self,
        topic: &str,
        payload: P,
    ) -> usize {
        EventBus::publish(self, topic, payload)
    }

    fn subscribe(
        &self,
        topic: &str,
    ) -> SubscriptionChannel<P> {
        EventBus::subscribe(self, topic)
    }

    fn unsubscribe_all(
        &self,
        topic: &str,
    ) -> usize {
        EventBus::unsubscribe_all(self, topic)
    }
}
