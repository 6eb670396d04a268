use libris_error::CatalogError;

use crate::{catalog::User, loader::BatchLoader};

/// Контекст одного входящего запроса.
///
/// Держит текущего пользователя (если он аутентифицирован) и свой
/// [`BatchLoader`]. Загрузчик живёт ровно столько же, сколько контекст,
/// поэтому кэш агрегатов не переживает запрос.
#[derive(Debug)]
pub struct RequestContext {
    current_user: Option<User>,
    loader: BatchLoader,
}

impl RequestContext {
    pub fn new(
        current_user: Option<User>,
        loader: BatchLoader,
    ) -> Self {
        Self {
            current_user,
            loader,
        }
    }

    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    /// Текущий пользователь или [`CatalogError::NotAuthenticated`].
    pub fn require_user(&self) -> Result<&User, CatalogError> {
        self.current_user
            .as_ref()
            .ok_or(CatalogError::NotAuthenticated)
    }

    pub fn loader(&self) -> &BatchLoader {
        &self.loader
    }
}
