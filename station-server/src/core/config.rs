use crate::drafts::stores::PosConnectionType;
use crate::outbox::RetryConfig;

/// Station server configuration
///
/// # Environment variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | WORK_DIR | /var/lib/station | Working directory (database, logs) |
/// | HTTP_PORT | 3000 | HTTP API port |
/// | STORE_ID | 1 | Store (tenant) identifier |
/// | STORE_NAME | Station | Store display name |
/// | REMOTE_SYNC_URL | (unset) | Back-office base URL; sync worker is idle without it |
/// | POS_CONNECTION_TYPE | standalone | standalone \| commander \| passport |
/// | ENVIRONMENT | development | development \| staging \| production |
/// | SYNC_RETRY_BASE_MS | 1000 | Backoff base delay |
/// | SYNC_RETRY_MAX_DELAY_MS | 300000 | Backoff cap |
/// | SYNC_MAX_ATTEMPTS | 5 | Default per-item attempt ceiling |
/// | SYNC_BATCH_SIZE | 50 | Default dispatch batch size |
#[derive(Debug, Clone)]
pub struct Config {
    pub work_dir: String,
    pub http_port: u16,
    pub store_id: i64,
    pub store_name: String,
    pub remote_sync_url: Option<String>,
    pub pos_connection_type: PosConnectionType,
    pub environment: String,

    pub sync_retry_base_ms: u64,
    pub sync_retry_max_delay_ms: u64,
    pub sync_max_attempts: i64,
    pub sync_batch_size: usize,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset
    pub fn from_env() -> Self {
        let pos_connection_type = match std::env::var("POS_CONNECTION_TYPE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "commander" => PosConnectionType::Commander,
            "passport" => PosConnectionType::Passport,
            _ => PosConnectionType::Standalone,
        };

        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/station".into()),
            http_port: env_parse("HTTP_PORT", 3000),
            store_id: env_parse("STORE_ID", 1),
            store_name: std::env::var("STORE_NAME").unwrap_or_else(|_| "Station".into()),
            remote_sync_url: std::env::var("REMOTE_SYNC_URL").ok(),
            pos_connection_type,
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            sync_retry_base_ms: env_parse("SYNC_RETRY_BASE_MS", 1000),
            sync_retry_max_delay_ms: env_parse("SYNC_RETRY_MAX_DELAY_MS", 300_000),
            sync_max_attempts: env_parse("SYNC_MAX_ATTEMPTS", 5),
            sync_batch_size: env_parse("SYNC_BATCH_SIZE", 50),
        }
    }

    pub fn db_path(&self) -> String {
        format!("{}/station.db", self.work_dir)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            base_delay_ms: self.sync_retry_base_ms,
            max_delay_ms: self.sync_retry_max_delay_ms,
            max_attempts: self.sync_max_attempts,
            default_batch_size: self.sync_batch_size,
            ..RetryConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_env();
        assert!(config.http_port > 0);
        assert!(config.sync_max_attempts >= 1);
        assert_eq!(config.retry_config().max_attempts, config.sync_max_attempts);
    }
}
