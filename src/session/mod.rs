//! Server-side session state: who is logged in, where to go after login,
//! and pending flash messages.

use anyhow::Context;
use async_trait::async_trait;
use axum::{extract::Request, middleware::Next, response::Response};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::OnceCell;
use tower_sessions::{cookie::SameSite, Expiry, Session, SessionManagerLayer, SessionStore};
use tracing::{error, info};
use uuid::Uuid;

use crate::{auth::repo_types::User, config::SessionConfig};

pub mod store;

pub const SESSION_COOKIE: &str = "session";
pub const USER_ID_KEY: &str = "user_id";
pub const USERNAME_KEY: &str = "username";
pub const NEXT_KEY: &str = "next";
const DEADLINE_KEY: &str = "expires_at";
const FLASHES_KEY: &str = "_flashes";

pub fn layer<S>(store: S, cfg: &SessionConfig) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(cfg.secure_cookies)
        .with_expiry(Expiry::OnInactivity(Duration::minutes(cfg.ttl_minutes)))
}

/// Puts the session into the logged-in state under a fresh id. The session
/// dies `lifetime` from now no matter how often it is used afterwards.
pub async fn sign_in(session: &Session, user: &User, lifetime: Duration) -> anyhow::Result<()> {
    let deadline = OffsetDateTime::now_utc()
        .checked_add(lifetime)
        .context("session lifetime out of range")?;
    // Whole seconds, so the value read back by `pin_deadline` is identical.
    let deadline = OffsetDateTime::from_unix_timestamp(deadline.unix_timestamp())?;

    session.cycle_id().await?;
    session.insert(USER_ID_KEY, user.id).await?;
    session.insert(USERNAME_KEY, &user.username).await?;
    session.insert(DEADLINE_KEY, deadline.unix_timestamp()).await?;
    session.set_expiry(Some(Expiry::AtDateTime(deadline)));
    Ok(())
}

/// Re-applies the deadline written by [`sign_in`], replacing the layer's
/// inactivity expiry for this request.
pub async fn pin_deadline(session: &Session) -> anyhow::Result<()> {
    if let Some(ts) = session.get::<i64>(DEADLINE_KEY).await? {
        let deadline = OffsetDateTime::from_unix_timestamp(ts)?;
        session.set_expiry(Some(Expiry::AtDateTime(deadline)));
    }
    Ok(())
}

/// Middleware running [`pin_deadline`] inside the session layer.
pub async fn hold_deadline(session: Session, req: Request, next: Next) -> Response {
    if let Err(e) = pin_deadline(&session).await {
        error!(error = %e, "session deadline unreadable");
    }
    next.run(req).await
}

pub async fn sign_out(session: &Session) -> anyhow::Result<()> {
    session.flush().await?;
    Ok(())
}

pub async fn user_id(session: &Session) -> anyhow::Result<Option<Uuid>> {
    Ok(session.get::<Uuid>(USER_ID_KEY).await?)
}

pub async fn remember_next(session: &Session, path: &str) -> anyhow::Result<()> {
    session.insert(NEXT_KEY, path).await?;
    Ok(())
}

/// Pops the post-login destination. Only same-site paths are honoured.
pub async fn take_next(session: &Session) -> anyhow::Result<Option<String>> {
    let next = session.remove::<String>(NEXT_KEY).await?;
    Ok(next.filter(|n| n.starts_with('/') && !n.starts_with("//")))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

pub async fn flash(
    session: &Session,
    level: FlashLevel,
    message: impl Into<String>,
) -> anyhow::Result<()> {
    let mut pending = session
        .get::<Vec<Flash>>(FLASHES_KEY)
        .await?
        .unwrap_or_default();
    pending.push(Flash {
        level,
        message: message.into(),
    });
    session.insert(FLASHES_KEY, pending).await?;
    Ok(())
}

/// Drains pending flashes; a broken session just yields none.
pub async fn take_flashes(session: &Session) -> Vec<Flash> {
    session
        .remove::<Vec<Flash>>(FLASHES_KEY)
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Stores that can drop every session at once.
#[async_trait]
pub trait ClearSessions: Send + Sync {
    async fn clear_all(&self) -> anyhow::Result<u64>;
}

/// Invalidates all sessions the first time it runs in a process.
pub struct StartupReset {
    cleared: OnceCell<u64>,
}

pub static STARTUP_RESET: StartupReset = StartupReset::new();

impl StartupReset {
    pub const fn new() -> Self {
        Self {
            cleared: OnceCell::const_new(),
        }
    }

    /// Returns how many sessions the first run removed. Later calls do not
    /// touch the store. A failed run is retried on the next call.
    pub async fn run(&self, store: &dyn ClearSessions) -> anyhow::Result<u64> {
        let removed = self
            .cleared
            .get_or_try_init(|| async {
                let removed = store.clear_all().await?;
                info!(removed, "sessions cleared on startup");
                Ok::<_, anyhow::Error>(removed)
            })
            .await?;
        Ok(*removed)
    }

    pub fn has_run(&self) -> bool {
        self.cleared.initialized()
    }
}

impl Default for StartupReset {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    };

    #[derive(Default)]
    struct CountingStore {
        calls: AtomicU64,
    }

    #[async_trait]
    impl ClearSessions for CountingStore {
        async fn clear_all(&self) -> anyhow::Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ClearSessions for BrokenStore {
        async fn clear_all(&self) -> anyhow::Result<u64> {
            anyhow::bail!("database down")
        }
    }

    #[tokio::test]
    async fn startup_reset_clears_once() {
        let reset = StartupReset::new();
        let store = CountingStore::default();
        assert!(!reset.has_run());

        assert_eq!(reset.run(&store).await.unwrap(), 7);
        assert_eq!(reset.run(&store).await.unwrap(), 7);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert!(reset.has_run());
    }

    #[tokio::test]
    async fn concurrent_first_calls_clear_once() {
        let reset = Arc::new(StartupReset::new());
        let store = Arc::new(CountingStore::default());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let reset = reset.clone();
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                reset.run(store.as_ref()).await.unwrap()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), 7);
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_reset_can_be_retried() {
        let reset = StartupReset::new();
        assert!(reset.run(&BrokenStore).await.is_err());
        assert!(!reset.has_run());

        let store = CountingStore::default();
        assert_eq!(reset.run(&store).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn flashes_drain_in_order() {
        let session = Session::new(
            None,
            Arc::new(tower_sessions::MemoryStore::default()),
            None,
        );
        flash(&session, FlashLevel::Warning, "one").await.unwrap();
        flash(&session, FlashLevel::Error, "two").await.unwrap();

        let got = take_flashes(&session).await;
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].message, "one");
        assert_eq!(got[1].level, FlashLevel::Error);
        assert!(take_flashes(&session).await.is_empty());
    }

    #[tokio::test]
    async fn signed_in_session_keeps_its_deadline() {
        let store = Arc::new(tower_sessions::MemoryStore::default());
        let inactivity = Expiry::OnInactivity(Duration::minutes(30));
        let alice = crate::testing::user("alice", "a@x.com");

        let first = Session::new(None, store.clone(), Some(inactivity.clone()));
        sign_in(&first, &alice, Duration::hours(24)).await.unwrap();
        first.save().await.unwrap();
        let deadline = first.expiry_date();
        let id = first.id().unwrap();
        assert!(deadline > OffsetDateTime::now_utc() + Duration::hours(23));

        // A later request starts from the layer's sliding expiry.
        let later = Session::new(Some(id), store, Some(inactivity));
        assert_ne!(later.expiry_date(), deadline);
        pin_deadline(&later).await.unwrap();
        assert_eq!(later.expiry_date(), deadline);
        assert_eq!(user_id(&later).await.unwrap(), Some(alice.id));
    }

    #[tokio::test]
    async fn anonymous_session_has_no_deadline() {
        let session = Session::new(
            None,
            Arc::new(tower_sessions::MemoryStore::default()),
            Some(Expiry::OnInactivity(Duration::minutes(30))),
        );
        pin_deadline(&session).await.unwrap();
        assert!(matches!(session.expiry(), Some(Expiry::OnInactivity(_))));
    }

    #[tokio::test]
    async fn next_rejects_offsite_targets() {
        let session = Session::new(
            None,
            Arc::new(tower_sessions::MemoryStore::default()),
            None,
        );
        remember_next(&session, "//evil.example/").await.unwrap();
        assert_eq!(take_next(&session).await.unwrap(), None);

        remember_next(&session, "/settings?tab=1").await.unwrap();
        assert_eq!(
            take_next(&session).await.unwrap().as_deref(),
            Some("/settings?tab=1")
        );
        assert_eq!(take_next(&session).await.unwrap(), None);
    }
}
