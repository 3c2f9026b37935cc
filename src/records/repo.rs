use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Action, Analysis, NewAction, NewAnalysis};

/// Per-user action and analysis documents.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_action(&self, new: NewAction) -> anyhow::Result<Action>;
    /// Newest first, at most `limit` rows, only `user_id`'s records.
    async fn list_actions(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<Action>>;
    async fn insert_analysis(&self, new: NewAnalysis) -> anyhow::Result<Analysis>;
    async fn list_analyses(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<Analysis>>;
}

#[derive(Clone)]
pub struct PgRecordStore {
    db: PgPool,
}

impl PgRecordStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_action(&self, new: NewAction) -> anyhow::Result<Action> {
        let row = sqlx::query_as::<_, Action>(
            r#"
            INSERT INTO actions (id, user_id, action_type, description, metadata)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, action_type, description, metadata, timestamp
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.action_type)
        .bind(&new.description)
        .bind(&new.metadata)
        .fetch_one(&self.db)
        .await
        .context("insert action")?;
        Ok(row)
    }

    async fn list_actions(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<Action>> {
        let rows = sqlx::query_as::<_, Action>(
            r#"
            SELECT id, user_id, action_type, description, metadata, timestamp
            FROM actions
            WHERE user_id = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("list actions")?;
        Ok(rows)
    }

    async fn insert_analysis(&self, new: NewAnalysis) -> anyhow::Result<Analysis> {
        let row = sqlx::query_as::<_, Analysis>(
            r#"
            INSERT INTO analyses (id, user_id, analysis_type, results, metrics)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, analysis_type, results, metrics, timestamp
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.analysis_type)
        .bind(&new.results)
        .bind(&new.metrics)
        .fetch_one(&self.db)
        .await
        .context("insert analysis")?;
        Ok(row)
    }

    async fn list_analyses(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<Analysis>> {
        let rows = sqlx::query_as::<_, Analysis>(
            r#"
            SELECT id, user_id, analysis_type, results, metrics, timestamp
            FROM analyses
            WHERE user_id = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("list analyses")?;
        Ok(rows)
    }
}
