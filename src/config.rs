use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::store::Backend;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Where users are persisted and which backend is preferred.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: Backend,
    pub sqlite_path: PathBuf,
    pub json_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub store: StoreConfig,
    pub jwt: JwtConfig,
}

impl StoreConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = match std::env::var("STORE_BACKEND") {
            Ok(v) => v.parse().context("parse STORE_BACKEND")?,
            Err(_) => Backend::Sqlite,
        };
        Ok(Self {
            backend,
            sqlite_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/auth.db".into())
                .into(),
            json_path: std::env::var("USER_STORE_PATH")
                .unwrap_or_else(|_| "data/auth.json".into())
                .into(),
        })
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = format!(
            "{}:{}",
            std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
        )
        .parse()
        .context("parse APP_HOST/APP_PORT")?;
        let store = StoreConfig::from_env()?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "userstore".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "userstore-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };
        Ok(Self {
            listen_addr,
            store,
            jwt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse() {
        assert_eq!("sqlite".parse::<Backend>().unwrap(), Backend::Sqlite);
        assert_eq!(" JSON ".parse::<Backend>().unwrap(), Backend::Json);
        assert!("postgres".parse::<Backend>().is_err());
    }
}
