use async_trait::async_trait;
use sqlx::PgPool;
use tower_sessions_sqlx_store::PostgresStore;

use super::ClearSessions;

// `PostgresStore` defaults.
const SCHEMA: &str = "tower_sessions";
const TABLE: &str = "session";

/// Postgres-backed sessions: the `PostgresStore` handed to the session layer
/// plus the pool used to wipe its table.
#[derive(Clone, Debug)]
pub struct PgSessions {
    db: PgPool,
    store: PostgresStore,
}

impl PgSessions {
    /// Creates the `tower_sessions.session` table if it is missing.
    pub async fn connect(db: PgPool) -> anyhow::Result<Self> {
        let store = PostgresStore::new(db.clone());
        store.migrate().await?;
        Ok(Self { db, store })
    }

    pub fn store(&self) -> PostgresStore {
        self.store.clone()
    }
}

#[async_trait]
impl ClearSessions for PgSessions {
    async fn clear_all(&self) -> anyhow::Result<u64> {
        let sql = format!(r#"DELETE FROM "{SCHEMA}"."{TABLE}""#);
        let res = sqlx::query(&sql).execute(&self.db).await?;
        Ok(res.rows_affected())
    }
}
