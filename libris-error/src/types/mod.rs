pub mod catalog;
pub mod loader;
pub mod pubsub;

// Публичный экспорт всех типов ошибок из вложенных модулей.
pub use catalog::*;
pub use loader::*;
pub use pubsub::*;
