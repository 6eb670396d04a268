//! Интерфейс (порт) хранилища каталога.
//!
//! Резолверы обращаются к данным только через этот трейт:
//! - чтение авторов, книг и пользователей;
//! - запись новых авторов, книг и пользователей;
//! - изменение года рождения автора.
//!
//! Подсчёт книг по авторам сюда не входит: он идёт через
//! [`AggregationSource`](crate::loader::AggregationSource) и пакетный
//! загрузчик.

use async_trait::async_trait;
use libris_error::CatalogError;

use crate::catalog::{Author, AuthorId, Book, User};

#[async_trait]
pub trait CatalogPort: Send + Sync + 'static {
    /// Общее число авторов.
    async fn count_authors(&self) -> Result<usize, CatalogError>;
    /// Общее число книг.
    async fn count_books(&self) -> Result<usize, CatalogError>;
    /// Все авторы в порядке добавления.
    async fn list_authors(&self) -> Result<Vec<Author>, CatalogError>;
    async fn find_author(
        &self,
        id: AuthorId,
    ) -> Result<Option<Author>, CatalogError>;
    async fn find_author_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Author>, CatalogError>;
    /// Книги с необязательными фильтрами по автору и жанру.
    async fn list_books(
        &self,
        author: Option<AuthorId>,
        genre: Option<&str>,
    ) -> Result<Vec<Book>, CatalogError>;
    /// Сохраняет автора. Имя автора должно быть уникальным.
    async fn insert_author(
        &self,
        author: Author,
    ) -> Result<Author, CatalogError>;
    /// Сохраняет книгу. Название должно быть уникальным, автор должен существовать.
    async fn insert_book(
        &self,
        book: Book,
    ) -> Result<Book, CatalogError>;
    /// Меняет год рождения автора. `None`, если автора нет.
    async fn set_author_born(
        &self,
        name: &str,
        born: i32,
    ) -> Result<Option<Author>, CatalogError>;
    async fn insert_user(
        &self,
        user: User,
    ) -> Result<User, CatalogError>;
    async fn find_user(
        &self,
        username: &str,
    ) -> Result<Option<User>, CatalogError>;
}
