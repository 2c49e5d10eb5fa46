//! Credentials for accounts kept in the user store.
//!
//! The store only ever sees the PHC string produced here; verifying it and
//! recording the login are done on top of the store operations.

use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::{debug, warn};

use crate::store::{User, UserStore};

/// Argon2id PHC string for `plain`, ready for `UserStore::create_user`.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|e| anyhow::anyhow!("argon2 hash: {e}"))
}

/// Check `plain` against a stored hash. An unparseable hash never matches.
fn matches(user: &User, plain: &str) -> bool {
    match PasswordHash::new(&user.password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(user_id = user.id, error = %e, "stored password hash is not a PHC string");
            false
        }
    }
}

/// Look up an active user, verify the password and stamp `last_login`.
///
/// Returns `None` for an unknown user or a wrong password; only store
/// failures are errors.
pub async fn authenticate(
    store: &dyn UserStore,
    username: &str,
    plain: &str,
) -> anyhow::Result<Option<User>> {
    let Some(user) = store
        .get_user_by_username(username)
        .await
        .context("look up user")?
    else {
        debug!(username, "no active user");
        return Ok(None);
    };

    if !matches(&user, plain) {
        return Ok(None);
    }

    store
        .update_last_login(user.id)
        .await
        .context("record login")?;
    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonUserStore;
    use tempfile::TempDir;

    async fn store_with(username: &str, stored_hash: &str) -> (TempDir, JsonUserStore, i64) {
        let dir = TempDir::new().unwrap();
        let store = JsonUserStore::open(dir.path().join("auth.json")).await.unwrap();
        let id = store.create_user(username, stored_hash).await.unwrap().id;
        (dir, store, id)
    }

    #[tokio::test]
    async fn correct_password_records_login() {
        let hash = hash_password("Secur3P@ssw0rd!").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        let (_dir, store, id) = store_with("alice", &hash).await;

        let user = authenticate(&store, "alice", "Secur3P@ssw0rd!").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        let profile = store.get_user_by_id(id).await.unwrap().unwrap();
        assert!(profile.last_login.is_some());
    }

    #[tokio::test]
    async fn wrong_password_leaves_last_login_alone() {
        let hash = hash_password("correct-horse-battery-staple").unwrap();
        let (_dir, store, id) = store_with("bob", &hash).await;

        assert!(authenticate(&store, "bob", "wrong-password").await.unwrap().is_none());
        assert!(authenticate(&store, "nobody", "correct-horse-battery-staple").await.unwrap().is_none());
        let profile = store.get_user_by_id(id).await.unwrap().unwrap();
        assert_eq!(profile.last_login, None);
    }

    #[tokio::test]
    async fn unparseable_stored_hash_is_a_mismatch() {
        let (_dir, store, _id) = store_with("carol", "not-a-valid-hash").await;
        assert!(authenticate(&store, "carol", "anything").await.unwrap().is_none());
    }
}
