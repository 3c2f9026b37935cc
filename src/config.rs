use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub ttl_minutes: i64,
    pub secure_cookies: bool,
}

/// Which admission policy guards the HTML pages (`/dashboard`, `/settings`).
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DashboardAuth {
    Session,
    Token,
}

impl DashboardAuth {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(Self::Session),
            "token" => Ok(Self::Token),
            other => anyhow::bail!("DASHBOARD_AUTH must be `session` or `token`, got `{other}`"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_fallback_url: Option<String>,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
    pub dashboard_auth: DashboardAuth,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let database_fallback_url = std::env::var("DATABASE_FALLBACK_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            ttl_minutes: ttl_minutes("JWT_TTL_MINUTES", std::env::var("JWT_TTL_MINUTES").ok())?,
        };
        let session = SessionConfig {
            ttl_minutes: ttl_minutes(
                "SESSION_TTL_MINUTES",
                std::env::var("SESSION_TTL_MINUTES").ok(),
            )?,
            secure_cookies: std::env::var("COOKIE_SECURE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        };
        let dashboard_auth = match std::env::var("DASHBOARD_AUTH") {
            Ok(v) => DashboardAuth::parse(&v)?,
            Err(_) => DashboardAuth::Session,
        };
        Ok(Self {
            database_url,
            database_fallback_url,
            jwt,
            session,
            dashboard_auth,
        })
    }
}

const DEFAULT_TTL_MINUTES: i64 = 60 * 24;
/// One year.
const MAX_TTL_MINUTES: i64 = 60 * 24 * 366;

fn ttl_minutes(key: &str, raw: Option<String>) -> anyhow::Result<i64> {
    let Some(raw) = raw.filter(|v| !v.trim().is_empty()) else {
        return Ok(DEFAULT_TTL_MINUTES);
    };
    let minutes: i64 = raw
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{key} must be a whole number of minutes, got `{raw}`"))?;
    if !(1..=MAX_TTL_MINUTES).contains(&minutes) {
        anyhow::bail!("{key} must be between 1 and {MAX_TTL_MINUTES}, got {minutes}");
    }
    Ok(minutes)
}
