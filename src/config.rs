use std::time::Duration;

const DEFAULT_SERVER: &str = "http://localhost:5000";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_url: String,
    pub sentry_dsn: Option<String>,
    pub environment: String,
    pub connect_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_raw_values(
            std::env::var("ARCHIVIST_SERVER").ok().as_deref(),
            std::env::var("SENTRY_DSN").ok().as_deref(),
            std::env::var("ENVIRONMENT").ok().as_deref(),
            std::env::var("ARCHIVIST_CONNECT_TIMEOUT_SECS").ok().as_deref(),
        )
    }

    /// Build a Config from raw string values (as they would come from env vars).
    /// Used directly in tests to avoid mutating process-global environment.
    pub fn from_raw_values(
        server_url: Option<&str>,
        sentry_dsn: Option<&str>,
        environment: Option<&str>,
        connect_timeout_secs: Option<&str>,
    ) -> Self {
        let server_url = server_url
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SERVER)
            .trim_end_matches('/')
            .to_string();

        let sentry_dsn = sentry_dsn.filter(|s| !s.is_empty()).map(String::from);

        let environment = environment
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| "local".to_string());

        let connect_timeout = Duration::from_secs(
            connect_timeout_secs
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        );

        Config {
            server_url,
            sentry_dsn,
            environment,
            connect_timeout,
        }
    }

    pub fn with_server_url(mut self, url: &str) -> Self {
        self.server_url = url.trim_end_matches('/').to_string();
        self
    }
}
