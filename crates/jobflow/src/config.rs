use std::time::Duration;

// Runtime configuration, loaded from the environment (and `.env` when present).
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub worker_id: String,
    pub queue: String,
    pub workers: usize,
    pub admin_addr: Option<String>,
    pub migrate_on_startup: bool,
    pub auth_url: Option<String>,
    pub http_timeout: Duration,
    pub visibility_secs: i64,
    pub scheduler_enabled: bool,
    pub purge_interval: Duration,
    pub cron_file: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let worker_id = env_or_fallback("JOBFLOW_WORKER_ID", "WORKER_ID")
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "worker-1".to_string());

        let queue =
            env_or_fallback("JOBFLOW_QUEUE", "QUEUE").unwrap_or_else(|| "AsyncJobs".to_string());

        let workers = env_parse::<usize>("JOBFLOW_WORKERS").unwrap_or(5).clamp(1, 64);

        let admin_addr = env_or_fallback("JOBFLOW_ADMIN_ADDR", "ADMIN_ADDR")
            .and_then(|s| normalize_optional_addr(&s));

        let migrate_on_startup = env_bool("JOBFLOW_MIGRATE_ON_STARTUP").unwrap_or(false);

        let auth_url = env_or_fallback("JOBFLOW_AUTH_URL", "AUTH_URL");

        let http_timeout =
            Duration::from_secs(env_parse::<u64>("JOBFLOW_HTTP_TIMEOUT_SECS").unwrap_or(30).max(1));

        let visibility_secs = env_parse::<i64>("JOBFLOW_VISIBILITY_SECS")
            .unwrap_or(30)
            .clamp(1, crate::queue::MAX_VISIBILITY_TIMEOUT_SECS);

        let scheduler_enabled = env_bool("JOBFLOW_SCHEDULER_ENABLED").unwrap_or(true);

        let purge_interval = Duration::from_secs(
            env_parse::<u64>("JOBFLOW_PURGE_INTERVAL_SECS")
                .unwrap_or(3600)
                .max(1),
        );

        let cron_file = env_or_fallback("JOBFLOW_CRON_FILE", "CRON_FILE");

        Ok(Self {
            database_url,
            worker_id,
            queue,
            workers,
            admin_addr,
            migrate_on_startup,
            auth_url,
            http_timeout,
            visibility_secs,
            scheduler_enabled,
            purge_interval,
            cron_file,
        })
    }

    /// The worker cannot run steps without somewhere to authenticate.
    pub fn require_auth_url(&self) -> anyhow::Result<&str> {
        self.auth_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("JOBFLOW_AUTH_URL is missing"))
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
