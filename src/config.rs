//! Configuration management

use anyhow::{Context, Result};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Seconds between scheduler ticks
    pub scheduler_interval_secs: u64,

    /// Hard per-run row cap; rows beyond it are dropped from the run
    pub max_rows_per_run: usize,

    /// Total jobs one tick may run
    pub max_jobs_per_tick: usize,

    /// Jobs one tenant may get per tick
    pub max_jobs_per_tenant: usize,

    /// Pending jobs scanned per tick
    pub scan_limit: i64,

    /// Minutes before a pending/processing job counts as stuck
    pub stale_after_minutes: i64,

    /// Expose manual scheduler control subjects (local/dev only)
    pub scheduler_control: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let nats_url =
            std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let scheduler_interval_secs = env_parse("UPKEEP_SCHEDULER_INTERVAL_SECS", 30u64)?;
        let max_rows_per_run = env_parse("UPKEEP_MAX_ROWS_PER_RUN", 100usize)?;
        let max_jobs_per_tick = env_parse("UPKEEP_MAX_JOBS_PER_TICK", 5usize)?;
        let max_jobs_per_tenant = env_parse("UPKEEP_MAX_JOBS_PER_TENANT", 2usize)?;
        let scan_limit = env_parse("UPKEEP_SCAN_LIMIT", 20i64)?;
        let stale_after_minutes = env_parse("UPKEEP_STALE_AFTER_MINUTES", 15i64)?;

        let scheduler_control = std::env::var("UPKEEP_SCHEDULER_CONTROL")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if max_rows_per_run == 0 {
            anyhow::bail!("UPKEEP_MAX_ROWS_PER_RUN must be at least 1");
        }
        if max_jobs_per_tick == 0 || max_jobs_per_tenant == 0 {
            anyhow::bail!("scheduler job caps must be at least 1");
        }

        Ok(Self {
            nats_url,
            database_url,
            scheduler_interval_secs,
            max_rows_per_run,
            max_jobs_per_tick,
            max_jobs_per_tenant,
            scan_limit,
            stale_after_minutes,
            scheduler_control,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_falls_back_to_default() {
        std::env::remove_var("UPKEEP_TEST_UNSET");
        let value: u64 = env_parse("UPKEEP_TEST_UNSET", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_env_parse_reads_value() {
        std::env::set_var("UPKEEP_TEST_SET", "7");
        let value: u64 = env_parse("UPKEEP_TEST_SET", 42).unwrap();
        assert_eq!(value, 7);

        // Cleanup
        std::env::remove_var("UPKEEP_TEST_SET");
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("UPKEEP_TEST_BAD", "not-a-number");
        let result: Result<u64> = env_parse("UPKEEP_TEST_BAD", 42);
        assert!(result.is_err());

        // Cleanup
        std::env::remove_var("UPKEEP_TEST_BAD");
    }
}
