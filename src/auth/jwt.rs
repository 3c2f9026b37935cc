use std::time::Duration;

use anyhow::Context;
use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::{config::JwtConfig, state::AppState};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

/// Signing and verification keys for the bearer token.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::new(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            ttl: Duration::from_secs(
                u64::try_from(cfg.ttl_minutes)
                    .unwrap_or(0)
                    .saturating_mul(60),
            ),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, user_id: Uuid, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = TimeDuration::try_from(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .context("token lifetime out of range")?;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    pub fn validate(&self, token: &str) -> Result<Uuid, TokenError> {
        self.validate_at(token, OffsetDateTime::now_utc())
    }

    /// Expiry is checked against `now` here rather than inside `jsonwebtoken`,
    /// with no leeway: a token is dead at `exp` exactly.
    pub fn validate_at(&self, token: &str, now: OffsetDateTime) -> Result<Uuid, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            }
        })?;

        if now.unix_timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }

        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::Malformed)?;
        debug!(user_id = %user_id, "jwt verified");
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            ttl_minutes: 60 * 24,
        })
    }

    #[test]
    fn issue_then_validate_returns_same_user() {
        let keys = make_keys("dev-secret");
        let user_id = Uuid::new_v4();
        let token = keys.issue(user_id).expect("issue");
        assert_eq!(keys.validate(&token), Ok(user_id));
    }

    #[test]
    fn validate_fails_once_clock_reaches_expiry() {
        let keys = make_keys("dev-secret");
        let issued = OffsetDateTime::now_utc();
        let token = keys.issue_at(Uuid::new_v4(), issued).expect("issue");

        let just_before = issued + TimeDuration::hours(24) - TimeDuration::seconds(1);
        assert!(keys.validate_at(&token, just_before).is_ok());

        let at_expiry = issued + TimeDuration::hours(24);
        assert_eq!(keys.validate_at(&token, at_expiry), Err(TokenError::Expired));
        assert_eq!(
            keys.validate_at(&token, at_expiry + TimeDuration::days(3)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn oversized_lifetime_is_an_error() {
        let keys = JwtKeys::new(&JwtConfig {
            secret: "dev-secret".into(),
            ttl_minutes: i64::MAX,
        });
        assert!(keys.issue(Uuid::new_v4()).is_err());
    }

    #[test]
    fn validate_rejects_other_secret() {
        let token = make_keys("one").issue(Uuid::new_v4()).expect("issue");
        assert_eq!(make_keys("two").validate(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn validate_rejects_garbage() {
        let keys = make_keys("dev-secret");
        assert_eq!(keys.validate("not-a-jwt"), Err(TokenError::Malformed));
        assert_eq!(keys.validate(""), Err(TokenError::Malformed));
    }

    #[test]
    fn validate_rejects_non_uuid_subject() {
        let keys = make_keys("dev-secret");
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: "admin".into(),
            iat: now,
            exp: now + 3600,
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).expect("encode");
        assert_eq!(keys.validate(&token), Err(TokenError::Malformed));
    }
}
