use std::{borrow::Borrow, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Идентификатор родительской сущности (например, автора) в
/// каноническом строковом виде.
///
/// Два ключа равны тогда и только тогда, когда равны их канонические
/// строки. Канонической строкой считается `Display`-представление
/// исходного идентификатора: для [`Uuid`] это нижний регистр с дефисами,
/// для чисел десятичная запись, строки берутся как есть.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Arc<str>);

impl Key {
    /// Строит ключ из любого значения с `Display`-представлением.
    pub fn canonical<T: fmt::Display + ?Sized>(id: &T) -> Self {
        Self(Arc::from(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<Arc<str>> for Key {
    fn from(s: Arc<str>) -> Self {
        Self(s)
    }
}

impl From<&Key> for Key {
    fn from(k: &Key) -> Self {
        k.clone()
    }
}

impl From<Uuid> for Key {
    fn from(id: Uuid) -> Self {
        Self::canonical(&id)
    }
}

impl From<&Uuid> for Key {
    fn from(id: &Uuid) -> Self {
        Self::canonical(id)
    }
}

impl From<u64> for Key {
    fn from(id: u64) -> Self {
        Self::canonical(&id)
    }
}

impl From<i64> for Key {
    fn from(id: i64) -> Self {
        Self::canonical(&id)
    }
}
