use std::sync::Arc;

use serde::Serialize;

/// Событие, доставленное подписчику.
///
/// `sequence` монотонно растёт в пределах темы и нужен для отладки и
/// проверки порядка. Полезная нагрузка разделяется между всеми
/// подписчиками через `Arc`, копии не создаются.
#[derive(Debug)]
pub struct EventEnvelope<P> {
    pub topic: Arc<str>,
    pub sequence: u64,
    pub payload: Arc<P>,
}

impl<P> EventEnvelope<P> {
    pub fn new(
        topic: Arc<str>,
        sequence: u64,
        payload: Arc<P>,
    ) -> Self {
        Self {
            topic,
            sequence,
            payload,
        }
    }

    /// Представление для сериализации в транспорт.
    pub fn frame(&self) -> EnvelopeFrame<'_, P> {
        EnvelopeFrame {
            topic: &self.topic,
            sequence: self.sequence,
            payload: &self.payload,
        }
    }
}

// Ручная реализация: derive потребовал бы `P: Clone`.
impl<P> Clone for EventEnvelope<P> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            sequence: self.sequence,
            payload: self.payload.clone(),
        }
    }
}

/// Заимствующее представление конверта для `serde`.
#[derive(Debug, Serialize)]
pub struct EnvelopeFrame<'a, P> {
    pub topic: &'a str,
    pub sequence: u64,
    pub payload: &'a P,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, PartialEq)]
    struct Added {
        title: String,
    }

    /// Тест проверяет, что клон делит полезную нагрузку.
    #[test]
    fn test_clone_shares_payload() {
        let env = EventEnvelope::new(
            Arc::from("book_added"),
            1,
            Arc::new(Added {
                title: "X".into(),
            }),
        );
        let copy = env.clone();
        assert!(Arc::ptr_eq(&env.payload, &copy.payload));
        assert_eq!(copy.sequence, 1);
    }

    /// Тест проверяет JSON-представление конверта.
    #[test]
    fn test_frame_serialization() {
        let env = EventEnvelope::new(
            Arc::from("book_added"),
            7,
            Arc::new(Added {
                title: "X".into(),
            }),
        );
        let json = serde_json::to_value(env.frame()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "topic": "book_added",
                "sequence": 7,
                "payload": { "title": "X" }
            })
        );
    }
}
