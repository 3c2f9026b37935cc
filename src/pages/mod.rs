pub mod views;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tower_sessions::Session;
use tracing::{error, instrument};

use crate::{
    auth::policy::{protect, CurrentUser, Guard, ResponseFormat, SessionPolicy, TokenPolicy},
    config::DashboardAuth,
    records::services::{self, DEFAULT_ACTION_LIMIT, DEFAULT_ANALYSIS_LIMIT},
    session,
    state::AppState,
};

/// `/dashboard` and `/settings`, behind whichever policy the config selects.
pub fn router(state: &AppState) -> Router<AppState> {
    let routes = Router::new()
        .route("/dashboard", get(dashboard))
        .route("/settings", get(settings));

    let guard = match state.config.dashboard_auth {
        DashboardAuth::Session => Guard::new(state.clone(), SessionPolicy, ResponseFormat::Html),
        DashboardAuth::Token => Guard::new(state.clone(), TokenPolicy, ResponseFormat::Html),
    };
    protect(routes, guard)
}

#[instrument(skip(state, session, user), fields(user_id = %user.id))]
async fn dashboard(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
) -> Response {
    let actions =
        services::list_actions(state.records.as_ref(), user.id, Some(DEFAULT_ACTION_LIMIT)).await;
    let analyses =
        services::list_analyses(state.records.as_ref(), user.id, Some(DEFAULT_ANALYSIS_LIMIT))
            .await;

    match (actions, analyses) {
        (Ok(actions), Ok(analyses)) => {
            let flashes = session::take_flashes(&session).await;
            Html(views::dashboard_page(&flashes, &user, &actions, &analyses)).into_response()
        }
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "dashboard load failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(views::error_page("Could not load your dashboard. Please try again.")),
            )
                .into_response()
        }
    }
}

#[instrument(skip(session, user), fields(user_id = %user.id))]
async fn settings(session: Session, CurrentUser(user): CurrentUser) -> Html<String> {
    let flashes = session::take_flashes(&session).await;
    Html(views::settings_page(&flashes, &user))
}
