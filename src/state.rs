use std::sync::Arc;

use crate::config::AppConfig;
use crate::notify::{CodeDispatcher, LogCodeSender};
use crate::posts::ContentRepo;
use crate::storage::{MemoryStorage, S3Storage, StorageClient};
use crate::store::{MemoryStore, PgStore};
use crate::tokens::TokenBlacklist;
use crate::users::UserRepo;
use crate::verification::CodeRepo;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub codes: Arc<dyn CodeRepo>,
    pub blacklist: Arc<dyn TokenBlacklist>,
    pub content: Arc<dyn ContentRepo>,
    pub storage: Arc<dyn StorageClient>,
    pub dispatcher: CodeDispatcher,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let storage: Arc<dyn StorageClient> = match &config.minio {
            Some(minio) => Arc::new(S3Storage::connect(minio).await?),
            None => {
                tracing::warn!("MINIO_ENDPOINT not set; keeping uploads in memory");
                Arc::new(MemoryStorage::default())
            }
        };
        let dispatcher = CodeDispatcher::new(Arc::new(LogCodeSender));

        match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await?;
                sqlx::migrate!("./migrations").run(&db).await?;
                let store = Arc::new(PgStore::new(db));
                Ok(Self::from_parts(config, store, storage, dispatcher))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; running on the in-memory store");
                let store = Arc::new(MemoryStore::new());
                Ok(Self::from_parts(config, store, storage, dispatcher))
            }
        }
    }

    /// One backend serving every repository.
    pub fn from_parts<S>(
        config: Arc<AppConfig>,
        store: Arc<S>,
        storage: Arc<dyn StorageClient>,
        dispatcher: CodeDispatcher,
    ) -> Self
    where
        S: UserRepo + CodeRepo + TokenBlacklist + ContentRepo + 'static,
    {
        Self {
            config,
            users: store.clone(),
            codes: store.clone(),
            blacklist: store.clone(),
            content: store,
            storage,
            dispatcher,
        }
    }

    /// In-memory state for tests; the store is returned for inspection.
    #[cfg(test)]
    pub fn fake() -> (Self, Arc<MemoryStore>) {
        use crate::config::{CodeConfig, JwtConfig};

        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            codes: CodeConfig::default(),
            minio: None,
        });
        let store = Arc::new(MemoryStore::new());
        let state = Self::from_parts(
            config,
            store.clone(),
            Arc::new(MemoryStorage::default()),
            CodeDispatcher::new(Arc::new(LogCodeSender)),
        );
        (state, store)
    }
}
