use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record as persisted by either backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,                      // assigned by the store, never reused
    pub username: String,             // unique among active users
    pub password_hash: String,        // opaque, precomputed by the caller
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,   // set once at creation
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(default = "active_by_default", deserialize_with = "flag")]
    pub is_active: bool,              // soft-delete marker
}

/// Result of a successful insert. The hash is never echoed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct CreatedUser {
    pub id: i64,
    pub username: String,
}

/// Restricted projection returned by lookup by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
}

impl From<&User> for UserProfile {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            created_at: u.created_at,
            last_login: u.last_login,
        }
    }
}

fn active_by_default() -> bool {
    true
}

// Older documents store the flag as 1/0.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn reads_integer_and_missing_active_flags() {
        let raw = r#"[
            {"id": 1, "username": "a", "password_hash": "h", "created_at": "2024-05-01T10:00:00.000Z", "last_login": null, "is_active": 1},
            {"id": 2, "username": "b", "password_hash": "h", "created_at": "2024-05-01T10:00:00Z", "is_active": 0},
            {"id": 3, "username": "c", "password_hash": "h", "created_at": "2024-05-01T10:00:00Z"}
        ]"#;
        let users: Vec<User> = serde_json::from_str(raw).expect("parse users");
        assert!(users[0].is_active);
        assert!(!users[1].is_active);
        assert!(users[2].is_active);
        assert_eq!(users[1].last_login, None);
        assert_eq!(users[0].created_at, datetime!(2024-05-01 10:00:00 UTC));
    }

    #[test]
    fn profile_serialization_has_no_hash() {
        let user = User {
            id: 7,
            username: "alice".into(),
            password_hash: "secret-hash".into(),
            created_at: datetime!(2024-05-01 10:00:00 UTC),
            last_login: None,
            is_active: true,
        };
        let json = serde_json::to_value(UserProfile::from(&user)).unwrap();
        let obj = json.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["created_at", "id", "last_login", "username"]);
        assert_eq!(obj["created_at"], "2024-05-01T10:00:00Z");
    }
}
