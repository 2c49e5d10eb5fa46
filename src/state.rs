use crate::config::AppConfig;
use crate::store::{self, UserStore};
use anyhow::Context;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let store = store::initialize(&config.store)
            .await
            .context("initialize user store")?;
        Ok(Self { store, config })
    }

    /// State backed by a JSON store under `dir`, for handler tests.
    #[cfg(test)]
    pub fn fake(dir: &std::path::Path) -> Self {
        use crate::config::{JwtConfig, StoreConfig};
        use crate::store::{Backend, JsonUserStore};

        let json_path = dir.join("auth.json");
        let config = Arc::new(AppConfig {
            listen_addr: ([127, 0, 0, 1], 0).into(),
            store: StoreConfig {
                backend: Backend::Json,
                sqlite_path: dir.join("auth.db"),
                json_path: json_path.clone(),
            },
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
        });

        let store = Arc::new(JsonUserStore::new(json_path)) as Arc<dyn UserStore>;
        Self { store, config }
    }
}
