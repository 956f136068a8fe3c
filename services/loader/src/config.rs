use anyhow::{Context, Result};

/// Largest fact batch PostgreSQL accepts: 65535 bind parameters, 9 per row.
pub const MAX_BATCH_SIZE: usize = 65_535 / 9;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: Option<String>,
    pub sample_size: usize,
    pub sample_seed: u64,
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: None,
            sample_size: 500,
            sample_seed: 1,
            batch_size: 1000,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_url: std::env::var("DB_URL").ok(),
            sample_size: env_or("SAMPLE_SIZE", defaults.sample_size),
            sample_seed: env_or("SAMPLE_SEED", defaults.sample_seed),
            batch_size: env_or("INSERT_BATCH_SIZE", defaults.batch_size).clamp(1, MAX_BATCH_SIZE),
        }
    }

    pub fn require_db_url(&self) -> Result<&str> {
        self.db_url.as_deref().context("DB_URL env var missing")
    }
}
