//! Admission policies for protected routes.
//!
//! A route group is wrapped in exactly one [`Guard`], which pairs an
//! [`AccessPolicy`] with the [`ResponseFormat`] used when the caller is turned
//! away. On success the resolved user travels to the handler as [`CurrentUser`].

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{Html, IntoResponse, Redirect, Response},
    Router,
};
use tower_sessions::Session;
use tracing::{error, warn};

use super::{
    cookies::{expired_token_cookie, token_from_headers},
    jwt::{JwtKeys, TokenError},
    repo_types::User,
};
use crate::{
    error::ApiError,
    pages::views,
    session::{self, FlashLevel},
    state::AppState,
};

/// How a rejected caller is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Redirect to `/login` with a flash message.
    Html,
    /// `401 {"error": ...}`.
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthFailure {
    #[error("Please log in to access this page.")]
    NotLoggedIn,
    #[error("Authentication required")]
    MissingToken,
    #[error("Invalid or expired token")]
    InvalidToken(#[source] TokenError),
    #[error("User not found")]
    UnknownUser,
    #[error("Authentication failed")]
    Backend(#[source] anyhow::Error),
}

#[async_trait]
pub trait AccessPolicy: Send + Sync + 'static {
    async fn authenticate(&self, state: &AppState, parts: &Parts) -> Result<User, AuthFailure>;
}

/// Admits callers whose server-side session holds a `user_id`.
pub struct SessionPolicy;

#[async_trait]
impl AccessPolicy for SessionPolicy {
    async fn authenticate(&self, state: &AppState, parts: &Parts) -> Result<User, AuthFailure> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or_else(|| AuthFailure::Backend(anyhow::anyhow!("session layer missing")))?;

        let user_id = session::user_id(session)
            .await
            .map_err(AuthFailure::Backend)?
            .ok_or(AuthFailure::NotLoggedIn)?;

        state
            .users
            .find_by_id(user_id)
            .await
            .map_err(AuthFailure::Backend)?
            .ok_or(AuthFailure::UnknownUser)
    }
}

/// Admits callers presenting a valid bearer token (cookie, then header).
pub struct TokenPolicy;

#[async_trait]
impl AccessPolicy for TokenPolicy {
    async fn authenticate(&self, state: &AppState, parts: &Parts) -> Result<User, AuthFailure> {
        let token = token_from_headers(&parts.headers).ok_or(AuthFailure::MissingToken)?;

        let keys = JwtKeys::from_ref(state);
        let user_id = keys.validate(&token).map_err(|e| {
            warn!(error = %e, "token rejected");
            AuthFailure::InvalidToken(e)
        })?;

        state
            .users
            .find_by_id(user_id)
            .await
            .map_err(AuthFailure::Backend)?
            .ok_or(AuthFailure::UnknownUser)
    }
}

#[derive(Clone)]
pub struct Guard {
    state: AppState,
    policy: Arc<dyn AccessPolicy>,
    format: ResponseFormat,
}

impl Guard {
    pub fn new(state: AppState, policy: impl AccessPolicy, format: ResponseFormat) -> Self {
        Self {
            state,
            policy: Arc::new(policy),
            format,
        }
    }

    async fn reject(&self, failure: AuthFailure, parts: &Parts) -> Response {
        match self.format {
            ResponseFormat::Json => match failure {
                AuthFailure::Backend(e) => ApiError::Internal(e).into_response(),
                other => ApiError::Unauthorized(other.to_string()).into_response(),
            },
            ResponseFormat::Html => {
                if let AuthFailure::Backend(e) = &failure {
                    error!(error = %e, "authentication backend failure");
                }
                self.reject_html(failure, parts).await
            }
        }
    }

    async fn reject_html(&self, failure: AuthFailure, parts: &Parts) -> Response {
        let Some(session) = parts.extensions.get::<Session>() else {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(views::error_page("Something went wrong. Please try again.")),
            )
                .into_response();
        };

        let outcome = async {
            match &failure {
                AuthFailure::NotLoggedIn => {
                    let wanted = parts
                        .uri
                        .path_and_query()
                        .map(|pq| pq.as_str())
                        .unwrap_or("/");
                    session::remember_next(session, wanted).await?;
                    session::flash(session, FlashLevel::Warning, failure.to_string()).await?;
                }
                AuthFailure::UnknownUser => {
                    session::sign_out(session).await?;
                    session::flash(
                        session,
                        FlashLevel::Error,
                        "Your account could not be found. Please log in again.",
                    )
                    .await?;
                }
                AuthFailure::MissingToken | AuthFailure::InvalidToken(_) => {
                    session::flash(
                        session,
                        FlashLevel::Error,
                        "Your session has expired. Please log in again.",
                    )
                    .await?;
                }
                AuthFailure::Backend(_) => {
                    session::flash(
                        session,
                        FlashLevel::Error,
                        "Something went wrong. Please log in again.",
                    )
                    .await?;
                }
            }
            Ok::<_, anyhow::Error>(())
        }
        .await;
        if let Err(e) = outcome {
            error!(error = %e, "session write during rejection failed");
        }

        let mut resp = Redirect::to("/login").into_response();
        if matches!(failure, AuthFailure::InvalidToken(_) | AuthFailure::UnknownUser) {
            if let Ok(v) = expired_token_cookie(self.state.config.session.secure_cookies).parse() {
                resp.headers_mut().append(axum::http::header::SET_COOKIE, v);
            }
        }
        resp
    }
}

async fn enforce(State(guard): State<Guard>, req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    match guard.policy.authenticate(&guard.state, &parts).await {
        Ok(user) => {
            parts.extensions.insert(CurrentUser(user));
            next.run(Request::from_parts(parts, body)).await
        }
        Err(failure) => guard.reject(failure, &parts).await,
    }
}

/// Wraps every route of `router` in `guard`.
pub fn protect(router: Router<AppState>, guard: Guard) -> Router<AppState> {
    router.route_layer(from_fn_with_state(guard, enforce))
}

/// The user admitted by the route's [`Guard`].
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CurrentUser>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "route is not behind an access guard",
        ))
    }
}
