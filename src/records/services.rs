use tracing::{error, info};
use uuid::Uuid;

use super::{
    repo::RecordStore,
    repo_types::{Action, Analysis, NewAction, NewAnalysis},
};

pub const DEFAULT_ACTION_LIMIT: i64 = 10;
pub const DEFAULT_ANALYSIS_LIMIT: i64 = 5;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("{0}")]
    Invalid(&'static str),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Missing limit falls back to `default`; anything else is clamped to `1..=MAX_LIMIT`.
pub fn clamp_limit(requested: Option<i64>, default: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, MAX_LIMIT)
}

fn object_or_empty(value: Option<serde_json::Value>, field: &'static str) -> Result<serde_json::Value, RecordError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(serde_json::json!({})),
        Some(v @ serde_json::Value::Object(_)) => Ok(v),
        Some(_) => Err(RecordError::Invalid(field)),
    }
}

pub async fn record_action(
    store: &dyn RecordStore,
    user_id: Uuid,
    action_type: &str,
    description: Option<String>,
    metadata: Option<serde_json::Value>,
) -> Result<Uuid, RecordError> {
    let action_type = action_type.trim();
    if action_type.is_empty() {
        return Err(RecordError::Invalid("action_type is required"));
    }
    let metadata = object_or_empty(metadata, "metadata must be a JSON object")?;

    let action = store
        .insert_action(NewAction {
            user_id,
            action_type: action_type.to_string(),
            description: description.unwrap_or_default(),
            metadata,
        })
        .await
        .map_err(|e| {
            error!(error = %e, %user_id, "insert action failed");
            RecordError::Backend(e)
        })?;

    info!(%user_id, action_id = %action.id, action_type = %action.action_type, "action recorded");
    Ok(action.id)
}

pub async fn list_actions(
    store: &dyn RecordStore,
    user_id: Uuid,
    limit: Option<i64>,
) -> anyhow::Result<Vec<Action>> {
    store
        .list_actions(user_id, clamp_limit(limit, DEFAULT_ACTION_LIMIT))
        .await
}

pub async fn record_analysis(
    store: &dyn RecordStore,
    user_id: Uuid,
    analysis_type: &str,
    results: Option<serde_json::Value>,
    metrics: Option<serde_json::Value>,
) -> Result<Uuid, RecordError> {
    let analysis_type = analysis_type.trim();
    if analysis_type.is_empty() {
        return Err(RecordError::Invalid("analysis_type is required"));
    }
    let results = object_or_empty(results, "results must be a JSON object")?;
    let metrics = object_or_empty(metrics, "metrics must be a JSON object")?;

    let analysis = store
        .insert_analysis(NewAnalysis {
            user_id,
            analysis_type: analysis_type.to_string(),
            results,
            metrics,
        })
        .await
        .map_err(|e| {
            error!(error = %e, %user_id, "insert analysis failed");
            RecordError::Backend(e)
        })?;

    info!(%user_id, analysis_id = %analysis.id, "analysis recorded");
    Ok(analysis.id)
}

pub async fn list_analyses(
    store: &dyn RecordStore,
    user_id: Uuid,
    limit: Option<i64>,
) -> anyhow::Result<Vec<Analysis>> {
    store
        .list_analyses(user_id, clamp_limit(limit, DEFAULT_ANALYSIS_LIMIT))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryRecords;
    use serde_json::json;

    #[test]
    fn limit_defaults_and_bounds() {
        assert_eq!(clamp_limit(None, DEFAULT_ACTION_LIMIT), 10);
        assert_eq!(clamp_limit(None, DEFAULT_ANALYSIS_LIMIT), 5);
        assert_eq!(clamp_limit(Some(0), 10), 1);
        assert_eq!(clamp_limit(Some(-4), 10), 1);
        assert_eq!(clamp_limit(Some(1000), 10), MAX_LIMIT);
        assert_eq!(clamp_limit(Some(42), 10), 42);
    }

    #[tokio::test]
    async fn listing_never_crosses_users() {
        let store = MemoryRecords::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for i in 0..3 {
            record_action(&store, a, "squat", Some(format!("a{i}")), None).await.unwrap();
            record_action(&store, b, "lunge", Some(format!("b{i}")), None).await.unwrap();
        }

        for limit in [None, Some(1), Some(2), Some(50), Some(0), Some(i64::MAX)] {
            let got = list_actions(&store, a, limit).await.unwrap();
            assert!(!got.is_empty());
            assert!(got.iter().all(|r| r.user_id == a));
        }
    }

    #[tokio::test]
    async fn actions_come_back_newest_first() {
        let store = MemoryRecords::default();
        let user = Uuid::new_v4();
        let first = record_action(&store, user, "squat", None, None).await.unwrap();
        let second = record_action(&store, user, "squat", None, None).await.unwrap();

        let got = list_actions(&store, user, None).await.unwrap();
        assert_eq!(got[0].id, second);
        assert_eq!(got[1].id, first);

        let one = list_actions(&store, user, Some(1)).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].id, second);
    }

    #[tokio::test]
    async fn analysis_defaults_to_five() {
        let store = MemoryRecords::default();
        let user = Uuid::new_v4();
        for _ in 0..7 {
            record_analysis(&store, user, "form", Some(json!({"score": 0.9})), None)
                .await
                .unwrap();
        }
        assert_eq!(list_analyses(&store, user, None).await.unwrap().len(), 5);
        assert_eq!(list_analyses(&store, user, Some(7)).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let store = MemoryRecords::default();
        let user = Uuid::new_v4();
        assert!(matches!(
            record_action(&store, user, "  ", None, None).await,
            Err(RecordError::Invalid(_))
        ));
        assert!(matches!(
            record_action(&store, user, "squat", None, Some(json!([1, 2]))).await,
            Err(RecordError::Invalid(_))
        ));
        assert!(matches!(
            record_analysis(&store, user, "form", None, Some(json!("fast"))).await,
            Err(RecordError::Invalid(_))
        ));
        assert!(list_actions(&store, user, None).await.unwrap().is_empty());
    }
}
