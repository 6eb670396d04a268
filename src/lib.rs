/// Ports, request context and the resolver layer.
pub mod application;
/// Catalog domain: authors, books, users, in-memory store.
pub mod catalog;
/// Process settings loading.
pub mod config;
/// Request-scoped batched aggregate loading.
pub mod loader;
/// Logging setup (filters, formats).
pub mod logging;
/// In-process event bus with per-subscriber bounded queues.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Resolver layer and its ports.
pub use application::{CatalogPort, PubSubPort, RequestContext, Resolvers};
/// Catalog model and storage.
pub use catalog::{
    Author, AuthorId, AuthorWithCount, Book, BookFilter, BookView, CatalogEvent, InMemoryCatalog,
    NewBook, User,
};
/// Settings.
pub use self::config::{BusSettings, LoaderSettings, Settings, SettingsError};
/// Error types shared across the workspace.
pub use libris_error::{CatalogError, ErrorExt, LoaderError, RecvError, StatusCode, TryRecvError};
/// Batch loader API.
pub use loader::{AggregationSource, BatchLoader, Key, LoaderFactory, LoaderOptions, LoaderStats};
/// Logging.
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};
/// Event bus API.
pub use pubsub::{
    forward_subscription, ChannelCloser, EventBus, EventBusStats, EventEnvelope, ForwardEnd,
    ForwardStats, SubscriberId, SubscriptionChannel,
};
