//! Демонстрационный процесс libris.
//!
//! Загружает настройки, заполняет каталог в памяти, подключает пересылку
//! событий `book_added` в stdout, считает книги всех авторов через один
//! загрузчик запроса и добавляет новую книгу.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use libris::{
    forward_subscription, init_logging, Author, Book, CatalogEvent, EventBus, InMemoryCatalog,
    NewBook, Resolvers, Settings,
};
use tokio::sync::Notify;
use tracing::info;
use uuid::Uuid;

const GENRES: [&str; 4] = ["refactoring", "agile", "patterns", "design"];

/// Время, которое даётся пересылке на запись последних событий.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "libris")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Batched book counts and catalog event fan-out demo", long_about = None)]
struct Cli {
    /// Путь к файлу конфигурации (TOML)
    #[arg(short, long, env = "LIBRIS_CONFIG", help = "Путь к файлу конфигурации")]
    config: Option<PathBuf>,
    /// Число авторов в начальных данных
    #[arg(long, default_value_t = 5, help = "Сколько авторов создать")]
    authors: usize,
    /// Число книг у каждого автора
    #[arg(long, default_value_t = 3, help = "Сколько книг создать каждому автору")]
    books: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from(cli.config.as_deref()).context("failed to load settings")?;
    init_logging(settings.logging.clone()).context("failed to initialize logging")?;

    let catalog = Arc::new(seed_catalog(cli.authors, cli.books));
    let bus: EventBus<CatalogEvent> = EventBus::new(settings.bus.queue_capacity);
    let resolvers = Resolvers::new(
        catalog.clone(),
        Arc::new(bus.clone()),
        settings.loader.options(),
    );

    let shutdown = Arc::new(Notify::new());
    let forwarder = tokio::spawn(forward_subscription(
        resolvers.subscribe_book_added(),
        tokio::io::stdout(),
        shutdown.clone(),
    ));

    let user = resolvers
        .create_user("librarian", GENRES[0])
        .await
        .context("failed to create user")?;
    let ctx = resolvers.request_context(Some(user));

    let author_count = resolvers.author_count().await?;
    let book_count = resolvers.book_count().await?;
    info!(authors = author_count, books = book_count, "catalog seeded");

    let counts = resolvers
        .authors_with_book_counts(&ctx)
        .await
        .context("failed to resolve book counts")?;
    for entry in &counts {
        info!(author = %entry.author.name, books = entry.book_count, "book count");
    }
    info!(
        authors = counts.len(),
        round_trips = catalog.round_trips(),
        loader = ?ctx.loader().stats(),
        "book counts resolved"
    );

    let added = resolvers
        .add_book(
            &ctx,
            NewBook {
                title: "Refactoring to Patterns".to_string(),
                author: "Joshua Kerievsky".to_string(),
                published: 2004,
                genres: vec!["refactoring".to_string(), "patterns".to_string()],
            },
        )
        .await
        .context("failed to add book")?;
    info!(title = %added.title, author = %added.author, "book added");

    let recommended = resolvers.recommendations(&ctx).await?;
    info!(count = recommended.len(), genre = GENRES[0], "recommendations");
    drop(ctx);

    tokio::time::sleep(SHUTDOWN_GRACE).await;
    shutdown.notify_one();
    let forwarded = forwarder.await.context("forwarder task failed")?;

    info!(forwarded = ?forwarded, bus = ?bus.stats(), "shutting down");
    Ok(())
}

fn seed_catalog(
    authors: usize,
    books_per_author: usize,
) -> InMemoryCatalog {
    let authors: Vec<Author> = (1..=authors)
        .map(|n| Author::new(format!("Author {n:02}")).born(1940 + n as i32))
        .collect();

    let books = authors
        .iter()
        .flat_map(|author| {
            (1..=books_per_author).map(move |n| Book {
                id: Uuid::new_v4(),
                title: format!("{} volume {n}", author.name),
                published: 1990 + n as i32,
                author: author.id,
                genres: vec![GENRES[n % GENRES.len()].to_string()],
            })
        })
        .collect();

    InMemoryCatalog::with_data(authors, books)
}
