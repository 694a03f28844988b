use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected or failed the query
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store is configured in a way that can never succeed
    #[error("Invalid store configuration: {0}")]
    Configuration(String),

    /// The store could not be reached
    #[error("Template store unavailable: {0}")]
    Unavailable(String),

    /// Internal error (lock poisoning, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether retrying can never help.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
