//! SurrealDB connection management.

use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use tracing::{debug, info};

/// Root credentials presented after connecting.
#[derive(Debug, Clone)]
pub struct RootCredentials {
    pub username: String,
    pub password: String,
}

/// Where the vault's data lives.
///
/// `endpoint` selects the engine by scheme: `ws://host:port` for a
/// SurrealDB server, `mem://` for an embedded in-memory store.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    /// Embedded engines have no users; leave this empty for `mem://`.
    pub credentials: Option<RootCredentials>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000".into(),
            namespace: "orgvault".into(),
            database: "main".into(),
            credentials: None,
        }
    }
}

/// An open, namespace-selected SurrealDB handle.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Any>,
}

impl DbManager {
    pub async fn connect(config: &DbConfig) -> Result<Self, surrealdb::Error> {
        info!(
            endpoint = %config.endpoint,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = any::connect(config.endpoint.as_str()).await?;

        match &config.credentials {
            Some(creds) => {
                db.signin(Root {
                    username: creds.username.clone(),
                    password: creds.password.clone(),
                })
                .await?;
            }
            None => debug!("No root credentials configured; skipping sign-in"),
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        info!("Connected to SurrealDB");
        Ok(Self { db })
    }

    pub fn client(&self) -> &Surreal<Any> {
        &self.db
    }
}
