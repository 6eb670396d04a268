//! Пакетная загрузка агрегатов в рамках одного запроса.
//!
//! - `key`: канонический ключ родительской сущности.
//! - `source`: контракт внешнего источника агрегатов.
//! - `batch`: коалесцирующий загрузчик с кэшем на время запроса.
//! - `factory`: создание свежего загрузчика на каждый запрос.

pub mod batch;
pub mod factory;
pub mod key;
pub mod source;

pub use batch::*;
pub use factory::*;
pub use key::*;
pub use source::*;
