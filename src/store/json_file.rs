use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::{fs, sync::Mutex};
use tracing::{debug, warn};

use super::{Backend, CreatedUser, StoreError, StoreResult, User, UserProfile, UserStore};

/// On-disk layout: `{ "users": [ ... ] }`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct UserDocument {
    #[serde(default)]
    users: Vec<User>,
}

/// Document backend: every user lives in one pretty-printed JSON file.
///
/// Reads load the whole file; mutations load, modify and rewrite it through a
/// temp file plus rename. Mutations from this process are serialized by
/// `write_lock`. Nothing coordinates separate processes sharing the file, so a
/// single writer is assumed.
pub struct JsonUserStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonUserStore {
    /// Build a store over `path` without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Build a store and make sure its file exists, writing an empty
    /// document if it does not. Existing files are left as they are.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let store = Self::new(path);
        store.ensure_file().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_file(&self) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        let exists = fs::try_exists(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        if !exists {
            self.save(&UserDocument::default()).await?;
            debug!(path = %self.path.display(), "created empty user document");
        }
        Ok(())
    }

    /// Unreadable or malformed files degrade to an empty collection.
    async fn load(&self) -> UserDocument {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "could not read user document");
                return UserDocument::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "malformed user document, treating as empty");
                UserDocument::default()
            }
        }
    }

    async fn save(&self, doc: &UserDocument) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl UserStore for JsonUserStore {
    fn backend(&self) -> Backend {
        Backend::Json
    }

    async fn has_users(&self) -> StoreResult<bool> {
        Ok(!self.load().await.users.is_empty())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<CreatedUser> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await;

        if doc.users.iter().any(|u| u.is_active && u.username == username) {
            return Err(StoreError::UsernameTaken(username.to_string()));
        }

        let last = doc.users.iter().map(|u| u.id).max().unwrap_or(0);
        let id = last.checked_add(1).ok_or(StoreError::IdsExhausted { last })?;
        doc.users.push(User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
            is_active: true,
        });
        self.save(&doc).await?;
        debug!(user_id = id, "user appended to document");

        Ok(CreatedUser {
            id,
            username: username.to_string(),
        })
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let doc = self.load().await;
        Ok(doc
            .users
            .into_iter()
            .find(|u| u.is_active && u.username == username))
    }

    async fn get_user_by_id(&self, id: i64) -> StoreResult<Option<UserProfile>> {
        let doc = self.load().await;
        Ok(doc
            .users
            .iter()
            .find(|u| u.is_active && u.id == id)
            .map(UserProfile::from))
    }

    async fn update_last_login(&self, id: i64) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await;

        let Some(user) = doc.users.iter_mut().find(|u| u.id == id) else {
            debug!(user_id = id, "last_login update for unknown user ignored");
            return Ok(());
        };
        let now = OffsetDateTime::now_utc();
        user.last_login = Some(user.last_login.map_or(now, |prev| prev.max(now)));

        self.save(&doc).await
    }
}
