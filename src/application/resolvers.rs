use std::{collections::HashMap, sync::Arc};

use libris_error::CatalogError;
use tracing::{debug, info};
use uuid::Uuid;

use super::{CatalogPort, PubSubPort, RequestContext};
use crate::{
    catalog::{
        Author, AuthorId, AuthorWithCount, Book, BookFilter, BookView, CatalogEvent, NewBook, User,
    },
    loader::{AggregationSource, LoaderFactory, LoaderOptions},
    pubsub::SubscriptionChannel,
};

/// Минимальная длина названия книги.
pub const MIN_TITLE_LEN: usize = 5;
/// Минимальная длина имени автора.
pub const MIN_AUTHOR_NAME_LEN: usize = 4;
/// Минимальная длина имени пользователя.
pub const MIN_USERNAME_LEN: usize = 3;

/// Слой резолверов: точка сборки хранилища, пакетных загрузчиков и
/// шины событий.
///
/// Запросы на чтение идут в хранилище напрямую, кроме числа книг автора:
/// оно всегда берётся через загрузчик текущего запроса. Мутации публикуют
/// события только после успешной записи.
pub struct Resolvers<C> {
    catalog: Arc<C>,
    events: Arc<dyn PubSubPort<CatalogEvent>>,
    loaders: LoaderFactory,
}

impl<C> Resolvers<C>
where
    C: CatalogPort + AggregationSource,
{
    pub fn new(
        catalog: Arc<C>,
        events: Arc<dyn PubSubPort<CatalogEvent>>,
        options: LoaderOptions,
    ) -> Self {
        let source: Arc<dyn AggregationSource> = catalog.clone();
        Self {
            catalog,
            events,
            loaders: LoaderFactory::new(source, options),
        }
    }

    /// Контекст нового входящего запроса со свежим загрузчиком.
    pub fn request_context(
        &self,
        current_user: Option<User>,
    ) -> RequestContext {
        RequestContext::new(current_user, self.loaders.for_request())
    }

    pub fn catalog(&self) -> &Arc<C> {
        &self.catalog
    }

    ////////////////////////////////////////////////////////////////////////////
    // Запросы
    ////////////////////////////////////////////////////////////////////////////

    pub async fn author_count(&self) -> Result<usize, CatalogError> {
        self.catalog.count_authors().await
    }

    pub async fn book_count(&self) -> Result<usize, CatalogError> {
        self.catalog.count_books().await
    }

    pub async fn all_authors(&self) -> Result<Vec<Author>, CatalogError> {
        self.catalog.list_authors().await
    }

    /// Книги с именем автора вместо id. Неизвестный автор в фильтре даёт
    /// пустой список.
    pub async fn all_books(
        &self,
        filter: &BookFilter,
    ) -> Result<Vec<BookView>, CatalogError> {
        let author_id = match &filter.author {
            Some(name) => match self.catalog.find_author_by_name(name).await? {
                Some(author) => Some(author.id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let books = self
            .catalog
            .list_books(author_id, filter.genre.as_deref())
            .await?;
        self.with_author_names(books).await
    }

    /// Число книг автора через загрузчик запроса.
    pub async fn author_book_count(
        &self,
        ctx: &RequestContext,
        author: &Author,
    ) -> Result<u64, CatalogError> {
        ctx.loader()
            .load(author.key())
            .await
            .map_err(|cause| CatalogError::FetchFailed {
                what: "Book count",
                cause,
            })
    }

    /// Все авторы с числом книг. Счётчики запрашиваются в одном окне,
    /// поэтому источник получает один пакетный запрос.
    pub async fn authors_with_book_counts(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<AuthorWithCount>, CatalogError> {
        let authors = self.catalog.list_authors().await?;
        let pending: Vec<_> = authors
            .iter()
            .map(|author| ctx.loader().load(author.key()))
            .collect();

        let mut result = Vec::with_capacity(authors.len());
        for (author, count) in authors.into_iter().zip(pending) {
            let book_count = count.await.map_err(|cause| CatalogError::FetchFailed {
                what: "Book count",
                cause,
            })?;
            result.push(AuthorWithCount { author, book_count });
        }
        Ok(result)
    }

    pub fn me(
        &self,
        ctx: &RequestContext,
    ) -> Option<User> {
        ctx.current_user().cloned()
    }

    /// Книги любимого жанра текущего пользователя.
    pub async fn recommendations(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<BookView>, CatalogError> {
        let user = ctx.require_user()?;
        self.all_books(&BookFilter::by_genre(user.favorite_genre.clone()))
            .await
    }

    /// Пользователь по имени, например для построения контекста запроса.
    pub async fn find_user(
        &self,
        username: &str,
    ) -> Result<Option<User>, CatalogError> {
        self.catalog.find_user(username).await
    }

    ////////////////////////////////////////////////////////////////////////////
    // Мутации
    ////////////////////////////////////////////////////////////////////////////

    /// Добавляет книгу. Автор ищется по имени и создаётся, если его нет.
    ///
    /// Событие `author_added` публикуется после сохранения нового автора,
    /// `book_added` после сохранения книги. Неудачная запись ничего не
    /// публикует.
    pub async fn add_book(
        &self,
        ctx: &RequestContext,
        input: NewBook,
    ) -> Result<BookView, CatalogError> {
        let user = ctx.require_user()?;
        validate_len("title", &input.title, MIN_TITLE_LEN)?;

        let author = match self.catalog.find_author_by_name(&input.author).await? {
            Some(author) => author,
            None => {
                validate_len("author", &input.author, MIN_AUTHOR_NAME_LEN)?;
                let author = self
                    .catalog
                    .insert_author(Author::new(input.author.clone()))
                    .await?;
                self.emit(CatalogEvent::AuthorAdded {
                    author: author.clone(),
                });
                author
            }
        };

        let book = self
            .catalog
            .insert_book(Book {
                id: Uuid::new_v4(),
                title: input.title,
                published: input.published,
                author: author.id,
                genres: input.genres,
            })
            .await?;

        let view = BookView::new(book, &author);
        info!(user = %user.username, title = %view.title, author = %view.author, "book added");
        self.emit(CatalogEvent::BookAdded { book: view.clone() });
        Ok(view)
    }

    /// Меняет год рождения автора. `Ok(None)`, если автора нет.
    pub async fn edit_author(
        &self,
        ctx: &RequestContext,
        name: &str,
        born: i32,
    ) -> Result<Option<Author>, CatalogError> {
        ctx.require_user()?;
        let updated = self.catalog.set_author_born(name, born).await?;
        if updated.is_none() {
            debug!(author = name, "edit skipped, author not found");
        }
        Ok(updated)
    }

    pub async fn create_user(
        &self,
        username: &str,
        favorite_genre: &str,
    ) -> Result<User, CatalogError> {
        validate_len("username", username, MIN_USERNAME_LEN)?;
        self.catalog
            .insert_user(User::new(username, favorite_genre))
            .await
    }

    ////////////////////////////////////////////////////////////////////////////
    // Подписки
    ////////////////////////////////////////////////////////////////////////////

    pub fn subscribe_book_added(&self) -> SubscriptionChannel<CatalogEvent> {
        self.events.subscribe(CatalogEvent::BOOK_ADDED)
    }

    pub fn subscribe_author_added(&self) -> SubscriptionChannel<CatalogEvent> {
        self.events.subscribe(CatalogEvent::AUTHOR_ADDED)
    }

    fn emit(
        &self,
        event: CatalogEvent,
    ) {
        let topic = event.topic();
        let delivered = self.events.publish(topic, event);
        debug!(topic, delivered, "catalog event published");
    }

    async fn with_author_names(
        &self,
        books: Vec<Book>,
    ) -> Result<Vec<BookView>, CatalogError> {
        let authors: HashMap<AuthorId, Author> = self
            .catalog
            .list_authors()
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        books
            .into_iter()
            .map(|book| match authors.get(&book.author) {
                Some(author) => Ok(BookView::new(book, author)),
                None => Err(CatalogError::NotFound {
                    entity: "author",
                    key: book.author.to_string(),
                }),
            })
            .collect()
    }
}

fn validate_len(
    field: &'static str,
    value: &str,
    min: usize,
) -> Result<(), CatalogError> {
    if value.trim().chars().count() < min {
        return Err(CatalogError::invalid(
            field,
            format!("must be at least {min} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_len_counts_chars() {
        assert!(validate_len("author", "Лев Т", 4).is_ok());
        assert!(validate_len("title", "   ab   ", 5).is_err());
        let err = validate_len("title", "abc", 5).unwrap_err();
        assert_eq!(
            err,
            CatalogError::invalid("title", "must be at least 5 characters")
        );
    }
}
