use std::time::Duration;

mod app;
mod auth;
mod config;
mod db;
mod error;
mod health;
mod pages;
mod records;
mod session;
mod state;
#[cfg(test)]
mod testing;

use tower_sessions::ExpiredDeletion;

use crate::{
    config::AppConfig,
    session::{store::PgSessions, STARTUP_RESET},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "action_analyzer=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = std::sync::Arc::new(AppConfig::from_env()?);
    let db = db::connect_with_fallback(&config).await?;

    if let Err(e) = db::MIGRATOR.run(&db).await {
        tracing::warn!(error = %e, "migration failed; continuing");
    }

    let sessions = PgSessions::connect(db.clone()).await?;
    STARTUP_RESET.run(&sessions).await?;
    tokio::spawn(
        sessions
            .store()
            .continuously_delete_expired(Duration::from_secs(60 * 10)),
    );

    tracing::info!(dashboard_auth = ?config.dashboard_auth, "starting");
    let state = AppState::from_pool(db, config);
    app::serve(app::build_app(state, sessions.store())).await
}
