use axum::http::StatusCode;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};

use crate::auth::{
    dto::{LoginForm, SignupForm},
    password::{hash_password_blocking, verify_password_blocking, MIN_PASSWORD_LEN},
    repo::UserStore,
    repo_types::{NewUser, User, UserStoreError},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[derive(Debug, thiserror::Error)]
pub enum SignupError {
    #[error("All fields are required")]
    MissingFields,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Username cannot contain @")]
    InvalidUsername,
    #[error("Password must be at least 6 characters long")]
    PasswordTooShort,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Username already taken")]
    DuplicateUsername,
    #[error("An error occurred during signup. Please try again.")]
    Backend(#[source] anyhow::Error),
}

impl SignupError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::DuplicateEmail | Self::DuplicateUsername => StatusCode::CONFLICT,
            Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<UserStoreError> for SignupError {
    fn from(e: UserStoreError) -> Self {
        match e {
            UserStoreError::DuplicateEmail => Self::DuplicateEmail,
            UserStoreError::DuplicateUsername => Self::DuplicateUsername,
            UserStoreError::Backend(e) => Self::Backend(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Please enter both email and password")]
    MissingFields,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("An error occurred during login. Please try again.")]
    Backend(#[source] anyhow::Error),
}

impl LoginError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingFields => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Validates the form, rejects taken email/username and stores the new user.
pub async fn register(users: &dyn UserStore, form: SignupForm) -> Result<User, SignupError> {
    let username = form.username.trim().to_string();
    let email = form.email.trim().to_lowercase();

    if username.is_empty() || email.is_empty() || form.password.is_empty() {
        return Err(SignupError::MissingFields);
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(SignupError::InvalidEmail);
    }
    // Login reads any identifier with `@` as an email.
    if username.contains('@') {
        return Err(SignupError::InvalidUsername);
    }
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(SignupError::PasswordTooShort);
    }
    if form.password != form.confirm_password {
        return Err(SignupError::PasswordMismatch);
    }

    if users
        .find_by_email(&email)
        .await
        .map_err(SignupError::Backend)?
        .is_some()
    {
        warn!(email = %email, "email already registered");
        return Err(SignupError::DuplicateEmail);
    }
    if users
        .find_by_username(&username)
        .await
        .map_err(SignupError::Backend)?
        .is_some()
    {
        warn!(username = %username, "username already taken");
        return Err(SignupError::DuplicateUsername);
    }

    let password_hash = hash_password_blocking(form.password).await.map_err(|e| {
        error!(error = %e, "hash_password failed");
        SignupError::Backend(e)
    })?;

    let user = users
        .create(NewUser {
            username,
            email,
            password_hash,
        })
        .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Checks credentials and stamps `last_login`. The identifier is matched
/// against email when it contains `@`, otherwise against username.
pub async fn login(users: &dyn UserStore, form: LoginForm) -> Result<User, LoginError> {
    let identifier = form.email.trim();
    if identifier.is_empty() || form.password.is_empty() {
        return Err(LoginError::MissingFields);
    }

    let lookup = if identifier.contains('@') {
        users.find_by_email(&identifier.to_lowercase()).await
    } else {
        users.find_by_username(identifier).await
    };
    let found = lookup.map_err(|e| {
        error!(error = %e, "user lookup failed");
        LoginError::Backend(e)
    })?;

    let Some(user) = found else {
        warn!(identifier = %identifier, "login unknown user");
        return Err(LoginError::InvalidCredentials);
    };

    let ok = verify_password_blocking(form.password, user.password_hash.clone())
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user.id, "verify_password failed");
            LoginError::Backend(e)
        })?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(LoginError::InvalidCredentials);
    }

    // A stale last_login is not worth failing the login over.
    if let Err(e) = users.update_last_login(user.id).await {
        error!(error = %e, user_id = %user.id, "update_last_login failed");
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(user)
}
