//! Предметная область каталога книг.
//!
//! - `model`: авторы, книги, пользователи и события каталога.
//! - `store`: хранилище в памяти, оно же источник агрегатов.

pub mod model;
pub mod store;

pub use model::*;
pub use store::*;
