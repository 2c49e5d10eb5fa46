//! User persistence behind one interface, with two backends:
//! an embedded SQLite database and a single JSON document file.
//!
//! [`initialize`] picks the backend once at startup and hands back an
//! `Arc<dyn UserStore>` that callers carry explicitly.

mod error;
mod json_file;
mod sqlite;
mod types;


use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::StoreConfig;

pub use error::{StoreError, StoreResult};
pub use json_file::JsonUserStore;
pub use sqlite::SqliteUserStore;
pub use types::{CreatedUser, User, UserProfile};

/// Concrete storage mechanism behind a [`UserStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Json,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => f.write_str("sqlite"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("unknown store backend: {other}"),
        }
    }
}

/// Operations every backend implements with identical semantics.
///
/// Lookups only ever see active users and report absence as `Ok(None)`.
#[async_trait]
pub trait UserStore: Send + Sync {
    fn backend(&self) -> Backend;

    /// True if at least one user record exists.
    async fn has_users(&self) -> StoreResult<bool>;

    /// Insert an active user with no recorded login.
    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<CreatedUser>;

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn get_user_by_id(&self, id: i64) -> StoreResult<Option<UserProfile>>;

    /// Stamp `last_login` with the current time. Unknown ids are ignored.
    async fn update_last_login(&self, id: i64) -> StoreResult<()>;
}

/// Select and open the user store.
///
/// A SQLite preference falls back to the JSON file when the database cannot be
/// opened or migrated. Only a failure to prepare the JSON file is returned.
pub async fn initialize(config: &StoreConfig) -> StoreResult<Arc<dyn UserStore>> {
    if config.backend == Backend::Sqlite {
        match SqliteUserStore::connect(&config.sqlite_path).await {
            Ok(store) => {
                info!(path = %config.sqlite_path.display(), "using sqlite user store");
                return Ok(Arc::new(store));
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config.sqlite_path.display(),
                    "sqlite unavailable, falling back to json user store"
                );
            }
        }
    }

    let store = JsonUserStore::open(&config.json_path).await?;
    info!(path = %store.path().display(), "using json user store");
    Ok(Arc::new(store))
}
