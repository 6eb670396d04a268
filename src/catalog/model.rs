use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::loader::Key;

/// Идентификатор автора.
pub type AuthorId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    /// Год рождения, если известен.
    pub born: Option<i32>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            born: None,
        }
    }

    pub fn born(
        mut self,
        year: i32,
    ) -> Self {
        self.born = Some(year);
        self
    }

    /// Ключ автора для пакетного загрузчика.
    pub fn key(&self) -> Key {
        Key::from(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub published: i32,
    pub author: AuthorId,
    pub genres: Vec<String>,
}

impl Book {
    pub fn has_genre(
        &self,
        genre: &str,
    ) -> bool {
        self.genres.iter().any(|g| g == genre)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub favorite_genre: String,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        favorite_genre: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            favorite_genre: favorite_genre.into(),
        }
    }
}

/// Входные данные мутации добавления книги. Автор задаётся именем.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub published: i32,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Фильтр выборки книг.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookFilter {
    /// Имя автора.
    pub author: Option<String>,
    pub genre: Option<String>,
}

impl BookFilter {
    pub fn by_author(name: impl Into<String>) -> Self {
        Self {
            author: Some(name.into()),
            genre: None,
        }
    }

    pub fn by_genre(genre: impl Into<String>) -> Self {
        Self {
            author: None,
            genre: Some(genre.into()),
        }
    }
}

/// Книга в том виде, в каком её отдаёт резолвер: вместо id автора его
/// имя.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookView {
    pub id: Uuid,
    pub title: String,
    pub published: i32,
    pub author: String,
    pub genres: Vec<String>,
}

impl BookView {
    pub fn new(
        book: Book,
        author: &Author,
    ) -> Self {
        Self {
            id: book.id,
            title: book.title,
            published: book.published,
            author: author.name.clone(),
            genres: book.genres,
        }
    }
}

/// Автор вместе с числом его книг.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorWithCount {
    #[serde(flatten)]
    pub author: Author,
    pub book_count: u64,
}

/// События каталога, публикуемые в шину.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogEvent {
    BookAdded { book: BookView },
    AuthorAdded { author: Author },
}

impl CatalogEvent {
    pub const BOOK_ADDED: &'static str = "book_added";
    pub const AUTHOR_ADDED: &'static str = "author_added";

    /// Тема, в которую публикуется событие.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::BookAdded { .. } => Self::BOOK_ADDED,
            Self::AuthorAdded { .. } => Self::AUTHOR_ADDED,
        }
    }
}
