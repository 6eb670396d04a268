use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Weak,
};

use dashmap::{mapref::entry::Entry, DashMap};
use once_cell::sync::Lazy;

/// Размер пула, ниже которого мёртвые записи не вычищаются.
const MIN_SWEEP_LEN: usize = 64;

/// Пул имён тем. Имя темы копируется в каждый конверт события, поэтому
/// все подписки и публикации одной темы делят одну аллокацию. Пул держит
/// только слабые ссылки: имя живёт, пока им пользуется хоть один
/// подписчик или запись реестра шины.
static TOPIC_INTERN: Lazy<DashMap<Box<str>, Weak<str>>> = Lazy::new(DashMap::new);

/// Размер пула, при котором пройдёт следующая чистка.
static SWEEP_AT: AtomicUsize = AtomicUsize::new(MIN_SWEEP_LEN);

/// Возвращает общий `Arc<str>` для темы.
pub(crate) fn intern_topic<S: AsRef<str>>(topic: S) -> Arc<str> {
    let key = topic.as_ref();
    if let Some(existing) = TOPIC_INTERN.get(key).and_then(|w| w.upgrade()) {
        return existing;
    }

    let interned = match TOPIC_INTERN.entry(Box::from(key)) {
        Entry::Occupied(mut e) => match e.get().upgrade() {
            Some(live) => live,
            None => {
                let fresh: Arc<str> = Arc::from(key);
                e.insert(Arc::downgrade(&fresh));
                fresh
            }
        },
        Entry::Vacant(e) => {
            let fresh: Arc<str> = Arc::from(key);
            e.insert(Arc::downgrade(&fresh));
            fresh
        }
    };

    if TOPIC_INTERN.len() >= SWEEP_AT.load(Ordering::Relaxed) {
        sweep();
    }
    interned
}

/// Убирает имена, которыми больше никто не пользуется. Следующая чистка
/// назначается на удвоенный размер живого пула.
fn sweep() {
    TOPIC_INTERN.retain(|_, name| name.strong_count() > 0);
    let live = TOPIC_INTERN.len();
    SWEEP_AT.store((live * 2).max(MIN_SWEEP_LEN), Ordering::Relaxed);
}
