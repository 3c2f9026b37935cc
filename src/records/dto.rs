use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /api/actions`.
#[derive(Debug, Deserialize)]
pub struct CreateActionRequest {
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Body of `POST /api/analyses`.
#[derive(Debug, Deserialize)]
pub struct CreateAnalysisRequest {
    #[serde(default)]
    pub analysis_type: String,
    #[serde(default)]
    pub results: Option<serde_json::Value>,
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: Uuid,
    pub message: &'static str,
}
