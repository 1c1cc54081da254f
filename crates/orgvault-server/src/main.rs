//! OrgVault Server — application entry point.

mod config;

use anyhow::Context;
use clap::Parser;
use orgvault_auth::{AuthConfig, AuthService};
use orgvault_core::error::VaultError;
use orgvault_core::models::user::{CreateUser, Role};
use orgvault_core::repository::UserRepository;
use orgvault_db::repository::SurrealUserRepository;
use orgvault_db::{DbManager, run_migrations};
use surrealdb::{Connection, Surreal};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{AdminBootstrap, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("orgvault=info".parse()?))
        .json()
        .init();

    info!("Starting OrgVault server...");

    let config = ServerConfig::parse();
    let auth = config.auth_config();

    let manager = DbManager::connect(&config.db_config())
        .await
        .context("connecting to SurrealDB")?;
    let db = manager.client();

    run_migrations(db).await.context("running migrations")?;

    if let Some(admin) = config.admin() {
        ensure_admin(db, &auth, &admin).await?;
    }

    info!("OrgVault server ready");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("OrgVault server stopped.");
    Ok(())
}

/// Register the bootstrap admin if needed and give it the admin role.
async fn ensure_admin<C: Connection>(
    db: &Surreal<C>,
    auth: &AuthConfig,
    admin: &AdminBootstrap,
) -> anyhow::Result<()> {
    let user_repo = || match &auth.pepper {
        Some(pepper) => SurrealUserRepository::with_pepper(db.clone(), pepper.clone()),
        None => SurrealUserRepository::new(db.clone()),
    };
    let users = user_repo();

    let user = match users.get_by_email(&admin.email).await {
        Ok(user) => user,
        Err(VaultError::NotFound { .. }) => {
            AuthService::new(user_repo(), auth.clone())
                .register(CreateUser {
                    first_name: "OrgVault".into(),
                    last_name: "Admin".into(),
                    email: admin.email.clone(),
                    password: admin.password.clone(),
                })
                .await?
        }
        Err(e) => return Err(e.into()),
    };

    if user.role != Role::Admin {
        users.set_role(user.id, Role::Admin).await?;
        info!(user_id = %user.id, "Bootstrap admin promoted");
    }
    Ok(())
}
