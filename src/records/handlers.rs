use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::{instrument, warn};

use super::{
    dto::{CreateActionRequest, CreateAnalysisRequest, CreatedResponse, ListQuery},
    repo_types::{Action, Analysis},
    services::{self, RecordError},
};
use crate::{auth::policy::CurrentUser, error::ApiError, state::AppState};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/actions", get(list_actions).post(create_action))
        .route("/api/analyses", get(list_analyses).post(create_analysis))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("No data provided".into()));
    }
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "rejected request body");
        ApiError::BadRequest("Invalid JSON body".into())
    })
}

fn parse_query(query: Result<Query<ListQuery>, QueryRejection>) -> Result<ListQuery, ApiError> {
    query.map(|Query(q)| q).map_err(|e| {
        warn!(error = %e, "rejected query string");
        ApiError::BadRequest("Invalid limit".into())
    })
}

impl From<RecordError> for ApiError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::Invalid(msg) => ApiError::BadRequest(msg.into()),
            RecordError::Backend(e) => ApiError::Internal(e),
        }
    }
}

#[instrument(skip(state, user, query), fields(user_id = %user.id))]
pub async fn list_actions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Action>>, ApiError> {
    let q = parse_query(query)?;
    let rows = services::list_actions(state.records.as_ref(), user.id, q.limit).await?;
    Ok(Json(rows))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn create_action(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let req: CreateActionRequest = parse_body(&body)?;
    let id = services::record_action(
        state.records.as_ref(),
        user.id,
        &req.action_type,
        req.description,
        req.metadata,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id,
            message: "Action recorded successfully",
        }),
    ))
}

#[instrument(skip(state, user, query), fields(user_id = %user.id))]
pub async fn list_analyses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Analysis>>, ApiError> {
    let q = parse_query(query)?;
    let rows = services::list_analyses(state.records.as_ref(), user.id, q.limit).await?;
    Ok(Json(rows))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn create_analysis(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let req: CreateAnalysisRequest = parse_body(&body)?;
    let id = services::record_analysis(
        state.records.as_ref(),
        user.id,
        &req.analysis_type,
        req.results,
        req.metrics,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            id,
            message: "Analysis recorded successfully",
        }),
    ))
}
