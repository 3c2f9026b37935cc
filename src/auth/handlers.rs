use axum::{
    extract::{FromRef, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use time::Duration as TimeDuration;
use tower_sessions::Session;
use tracing::{error, info, instrument};

use crate::{
    auth::{
        cookies::{expired_token_cookie, token_cookie, token_from_headers},
        dto::{LoginForm, PublicUser, SignupForm},
        jwt::JwtKeys,
        policy::CurrentUser,
        repo_types::User,
        services::{self, LoginError, SignupError},
    },
    pages::views,
    session::{self, FlashLevel},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/login", get(login_form).post(login))
        .route("/signup", get(signup_form).post(signup))
        .route("/logout", get(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/api/user", get(get_me))
}

/// Logs the user into the session, issues the token cookie and redirects to
/// the remembered destination.
async fn establish(state: &AppState, session: &Session, user: &User) -> anyhow::Result<Response> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.issue(user.id)?;
    let lifetime = TimeDuration::minutes(state.config.session.ttl_minutes);
    session::sign_in(session, user, lifetime).await?;

    let next = session::take_next(session)
        .await?
        .unwrap_or_else(|| "/dashboard".into());
    let cookie = token_cookie(
        &token,
        TimeDuration::try_from(keys.ttl)?,
        state.config.session.secure_cookies,
    );

    let mut resp = Redirect::to(&next).into_response();
    resp.headers_mut()
        .append(header::SET_COOKIE, HeaderValue::from_str(&cookie)?);
    Ok(resp)
}

fn server_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(views::error_page(message)),
    )
        .into_response()
}

#[instrument(skip(state, session, headers))]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Response {
    let by_session = matches!(session::user_id(&session).await, Ok(Some(_)));
    let by_token = token_from_headers(&headers)
        .map(|t| JwtKeys::from_ref(&state).validate(&t).is_ok())
        .unwrap_or(false);
    if by_session || by_token {
        return Redirect::to("/dashboard").into_response();
    }

    let flashes = session::take_flashes(&session).await;
    Html(views::index_page(&flashes)).into_response()
}

#[instrument(skip(session))]
pub async fn login_form(session: Session) -> Html<String> {
    let flashes = session::take_flashes(&session).await;
    Html(views::login_page(&flashes, None, ""))
}

#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let identifier = form.email.trim().to_string();
    let user = match services::login(state.users.as_ref(), form).await {
        Ok(u) => u,
        Err(e) => {
            if let LoginError::Backend(inner) = &e {
                error!(error = %inner, "login failed");
            }
            let flashes = session::take_flashes(&session).await;
            return (
                e.status(),
                Html(views::login_page(&flashes, Some(&e.to_string()), &identifier)),
            )
                .into_response();
        }
    };

    match establish(&state, &session, &user).await {
        Ok(resp) => resp,
        Err(e) => {
            error!(error = %e, user_id = %user.id, "establishing login failed");
            server_error("An error occurred during login. Please try again.")
        }
    }
}

#[instrument(skip(session))]
pub async fn signup_form(session: Session) -> Html<String> {
    let flashes = session::take_flashes(&session).await;
    Html(views::signup_page(&flashes, None, "", ""))
}

#[instrument(skip(state, session, form))]
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<SignupForm>,
) -> Response {
    let username = form.username.trim().to_string();
    let email = form.email.trim().to_string();
    let user = match services::register(state.users.as_ref(), form).await {
        Ok(u) => u,
        Err(e) => {
            if let SignupError::Backend(inner) = &e {
                error!(error = %inner, "signup failed");
            }
            let flashes = session::take_flashes(&session).await;
            return (
                e.status(),
                Html(views::signup_page(
                    &flashes,
                    Some(&e.to_string()),
                    &username,
                    &email,
                )),
            )
                .into_response();
        }
    };

    // The user exists from here on; if the rest fails they can still log in.
    if let Err(e) = state.users.update_last_login(user.id).await {
        error!(error = %e, user_id = %user.id, "update_last_login failed");
    }
    match establish(&state, &session, &user).await {
        Ok(resp) => {
            if let Err(e) =
                session::flash(&session, FlashLevel::Success, "Account created successfully!").await
            {
                error!(error = %e, "flash failed");
            }
            resp
        }
        Err(e) => {
            error!(error = %e, user_id = %user.id, "establishing signup session failed");
            server_error("Your account was created but we could not log you in. Please log in.")
        }
    }
}

#[instrument(skip(state, session))]
pub async fn logout(State(state): State<AppState>, session: Session) -> Response {
    let who = session::user_id(&session).await.ok().flatten();
    if let Err(e) = session::sign_out(&session).await {
        error!(error = %e, "session flush failed");
    }
    if let Err(e) = session::flash(&session, FlashLevel::Info, "You have been logged out.").await {
        error!(error = %e, "flash failed");
    }
    if let Some(user_id) = who {
        info!(%user_id, "user logged out");
    }

    let mut resp = Redirect::to("/login").into_response();
    if let Ok(v) = HeaderValue::from_str(&expired_token_cookie(state.config.session.secure_cookies)) {
        resp.headers_mut().append(header::SET_COOKIE, v);
    }
    resp
}

#[instrument(skip(user), fields(user_id = %user.id))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(user))
}
