use std::path::PathBuf;

use thiserror::Error;

/// Errors from the user store. Driver errors are passed through untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encode user document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("username already taken: {0}")]
    UsernameTaken(String),

    #[error("no user id left after {last}")]
    IdsExhausted { last: i64 },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the write was rejected because an active user already holds the username.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::UsernameTaken(_) => true,
            Self::Database(e) => e
                .as_database_error()
                .map(|d| d.is_unique_violation())
                .unwrap_or(false),
            _ => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
