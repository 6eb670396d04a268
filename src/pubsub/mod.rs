//! Внутрипроцессная шина событий с подписками по темам.
//!
//! - `broker`: реестр тем, публикация и статистика шины.
//! - `intern` (приватный): пул имён тем.
//! - `message`: конверт события с номером последовательности.
//! - `subscriber`: канал подписки с ограниченной очередью.
//! - `forward`: пересылка событий подписки в транспорт.

pub mod broker;
pub mod forward;
mod intern;
pub mod message;
pub mod subscriber;

pub use broker::*;
pub use forward::*;
pub(crate) use intern::intern_topic;
pub use message::*;
pub use subscriber::*;
