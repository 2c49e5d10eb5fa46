use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use super::{Backend, CreatedUser, StoreError, StoreResult, User, UserProfile, UserStore};

/// Relational backend over an embedded SQLite file.
#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    /// Open (creating if missing) the database file and apply the schema.
    pub async fn connect(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!(path = %path.display(), "sqlite schema ready");

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn has_users(&self) -> StoreResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<CreatedUser> {
        let created = sqlx::query_as::<_, CreatedUser>(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES (?, ?)
            RETURNING id, username
            "#,
        )
        .bind(username)
        .bind(password_hash)
        // fetch_all steps the statement to completion so the insert is
        // committed before we return; fetch_one leaves it pending.
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .next()
        .ok_or(sqlx::Error::RowNotFound)?;
        debug!(user_id = created.id, "user row inserted");
        Ok(created)
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, created_at, last_login, is_active
            FROM users
            WHERE username = ? AND is_active = 1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user_by_id(&self, id: i64) -> StoreResult<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, username, created_at, last_login
            FROM users
            WHERE id = ? AND is_active = 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn update_last_login(&self, id: i64) -> StoreResult<()> {
        // MAX keeps last_login from moving backwards if the clock does.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET last_login = MAX(strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), COALESCE(last_login, ''))
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        debug!(user_id = id, rows = result.rows_affected(), "last_login updated");
        Ok(())
    }
}
