use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{migrate::Migrator, postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::config::AppConfig;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn connect(url: &str) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    Ok(db)
}

/// Connects to the primary database, or to the fallback when the primary is
/// unreachable at startup.
pub async fn connect_with_fallback(config: &AppConfig) -> anyhow::Result<PgPool> {
    match connect(&config.database_url).await {
        Ok(db) => {
            info!("connected to primary database");
            Ok(db)
        }
        Err(e) => {
            let Some(fallback) = config.database_fallback_url.as_deref() else {
                return Err(e.context("connect to database"));
            };
            warn!(error = %e, "primary database unreachable; trying fallback");
            let db = connect(fallback)
                .await
                .context("connect to fallback database")?;
            info!("connected to fallback database");
            Ok(db)
        }
    }
}

#[async_trait]
pub trait DbHealth: Send + Sync {
    async fn ping(&self) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PgHealth {
    db: PgPool,
}

impl PgHealth {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DbHealth for PgHealth {
    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.db)
            .await
            .context("database ping")?;
        Ok(())
    }
}
