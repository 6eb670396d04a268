use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
};

use async_trait::async_trait;
use libris_error::{CatalogError, LoaderError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::{Author, AuthorId, Book, User};
use crate::{
    application::CatalogPort,
    loader::{AggregationSource, Key},
};

#[derive(Default)]
struct CatalogData {
    authors: Vec<Author>,
    books: Vec<Book>,
    users: Vec<User>,
}

/// Потокобезопасное хранилище каталога в памяти.
///
/// Служит и хранилищем для резолверов ([`CatalogPort`]), и источником
/// агрегатов для пакетного загрузчика ([`AggregationSource`]). Каждое
/// обращение к источнику агрегатов считается одним round trip.
#[derive(Default)]
pub struct InMemoryCatalog {
    data: RwLock<CatalogData>,
    round_trips: AtomicU64,
    count_requests: Mutex<Vec<Vec<Key>>>,
    fail_counts: AtomicU32,
    fail_writes: AtomicU32,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Создаёт хранилище с готовыми данными, без проверок уникальности.
    pub fn with_data(
        authors: Vec<Author>,
        books: Vec<Book>,
    ) -> Self {
        let catalog = Self::new();
        {
            let mut data = catalog.data.write();
            data.authors = authors;
            data.books = books;
        }
        catalog
    }

    /// Сколько раз источник агрегатов был вызван.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }

    /// Наборы ключей каждого вызова источника агрегатов, по порядку.
    pub fn count_requests(&self) -> Vec<Vec<Key>> {
        self.count_requests.lock().clone()
    }

    /// Следующие `n` вызовов источника агрегатов завершатся ошибкой.
    pub fn fail_next_counts(
        &self,
        n: u32,
    ) {
        self.fail_counts.store(n, Ordering::Relaxed);
    }

    /// Следующие `n` записей завершатся ошибкой.
    pub fn fail_next_writes(
        &self,
        n: u32,
    ) {
        self.fail_writes.store(n, Ordering::Relaxed);
    }

    fn check_write(&self) -> Result<(), CatalogError> {
        if take_one(&self.fail_writes) {
            warn!("simulated catalog write failure");
            return Err(CatalogError::WriteFailed {
                reason: "storage rejected the write".to_string(),
            });
        }
        Ok(())
    }
}

/// Уменьшает счётчик, если он больше нуля. Возвращает `true`, если
/// уменьшил.
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl CatalogPort for InMemoryCatalog {
    async fn count_authors(&self) -> Result<usize, CatalogError> {
        Ok(self.data.read().authors.len())
    }

    async fn count_books(&self) -> Result<usize, CatalogError> {
        Ok(self.data.read().books.len())
    }

    async fn list_authors(&self) -> Result<Vec<Author>, CatalogError> {
        Ok(self.data.read().authors.clone())
    }

    async fn find_author(
        &self,
        id: AuthorId,
    ) -> Result<Option<Author>, CatalogError> {
        Ok(self.data.read().authors.iter().find(|a| a.id == id).cloned())
    }

    async fn find_author_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Author>, CatalogError> {
        Ok(self
            .data
            .read()
            .authors
            .iter()
            .find(|a| a.name == name)
            .cloned())
    }

    async fn list_books(
        &self,
        author: Option<AuthorId>,
        genre: Option<&str>,
    ) -> Result<Vec<Book>, CatalogError> {
        let data = self.data.read();
        Ok(data
            .books
            .iter()
            .filter(|b| author.map_or(true, |id| b.author == id))
            .filter(|b| genre.map_or(true, |g| b.has_genre(g)))
            .cloned()
            .collect())
    }

    async fn insert_author(
        &self,
        author: Author,
    ) -> Result<Author, CatalogError> {
        self.check_write()?;
        let mut data = self.data.write();
        if data.authors.iter().any(|a| a.name == author.name) {
            return Err(CatalogError::invalid("author", "name must be unique"));
        }
        data.authors.push(author.clone());
        debug!(author = %author.name, "author stored");
        Ok(author)
    }

    async fn insert_book(
        &self,
        book: Book,
    ) -> Result<Book, CatalogError> {
        self.check_write()?;
        let mut data = self.data.write();
        if !data.authors.iter().any(|a| a.id == book.author) {
            return Err(CatalogError::NotFound {
                entity: "author",
                key: book.author.to_string(),
            });
        }
        if data.books.iter().any(|b| b.title == book.title) {
            return Err(CatalogError::invalid("title", "must be unique"));
        }
        data.books.push(book.clone());
        debug!(title = %book.title, "book stored");
        Ok(book)
    }

    async fn set_author_born(
        &self,
        name: &str,
        born: i32,
    ) -> Result<Option<Author>, CatalogError> {
        self.check_write()?;
        let mut data = self.data.write();
        Ok(data
            .authors
            .iter_mut()
            .find(|a| a.name == name)
            .map(|a| {
                a.born = Some(born);
                a.clone()
            }))
    }

    async fn insert_user(
        &self,
        user: User,
    ) -> Result<User, CatalogError> {
        self.check_write()?;
        let mut data = self.data.write();
        if data.users.iter().any(|u| u.username == user.username) {
            return Err(CatalogError::invalid("username", "must be unique"));
        }
        data.users.push(user.clone());
        Ok(user)
    }

    async fn find_user(
        &self,
        username: &str,
    ) -> Result<Option<User>, CatalogError> {
        Ok(self
            .data
            .read()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }
}

#[async_trait]
impl AggregationSource for InMemoryCatalog {
    async fn count_by_parent(
        &self,
        keys: &[Key],
    ) -> Result<HashMap<Key, u64>, LoaderError> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        self.count_requests.lock().push(keys.to_vec());

        if take_one(&self.fail_counts) {
            return Err(LoaderError::source_unavailable("catalog is unreachable"));
        }

        let wanted: HashSet<&str> = keys.iter().map(Key::as_str).collect();
        let mut counts: HashMap<Key, u64> = HashMap::with_capacity(keys.len());
        let data = self.data.read();
        for book in &data.books {
            let key = Key::from(book.author);
            if wanted.contains(key.as_str()) {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}
