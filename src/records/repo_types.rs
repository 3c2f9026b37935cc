use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Action {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action_type: String,
    pub description: String,
    pub metadata: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Analysis {
    pub id: Uuid,
    pub user_id: Uuid,
    pub analysis_type: String,
    pub results: serde_json::Value,
    pub metrics: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewAction {
    pub user_id: Uuid,
    pub action_type: String,
    pub description: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub user_id: Uuid,
    pub analysis_type: String,
    pub results: serde_json::Value,
    pub metrics: serde_json::Value,
}
