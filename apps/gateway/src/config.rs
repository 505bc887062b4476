use std::time::Duration;

/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HS256 secret used to verify bearer tokens.
    pub jwt_secret: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// PostgreSQL connection string. `None` runs on in-memory stores.
    pub database_url: Option<String>,
    /// A socket that sends nothing for this long is closed.
    pub heartbeat_timeout: Duration,
    /// Notifications older than this many days are purged.
    pub retention_days: i64,
    /// How many notifications `notifications_init` carries.
    pub notifications_init_limit: usize,
}

impl Config {
    /// Defaults for everything except the secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            port: 5000,
            database_url: None,
            heartbeat_timeout: Duration::from_secs(60),
            retention_days: parlay_common::notification::RETENTION_DAYS,
            notifications_init_limit: 20,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        let defaults = Self::new(required_var("JWT_SECRET"));
        Self {
            port: parsed_var("PORT").unwrap_or(defaults.port),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            heartbeat_timeout: parsed_var("HEARTBEAT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_timeout),
            retention_days: parsed_var("NOTIFICATION_RETENTION_DAYS")
                .unwrap_or(defaults.retention_days),
            notifications_init_limit: parsed_var("NOTIFICATIONS_INIT_LIMIT")
                .unwrap_or(defaults.notifications_init_limit),
            ..defaults
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
