pub mod catalog_port;
pub mod context;
pub mod pubsub_port;
pub mod resolvers;

pub use catalog_port::CatalogPort;
pub use context::RequestContext;
pub use pubsub_port::PubSubPort;
pub use resolvers::*;
