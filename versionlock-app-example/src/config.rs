use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::anyhow;
use envconfig::Envconfig;
use envconfig_derive::Envconfig;
use versionlock::{Backoff, RetryPolicy};

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "REDIS_URL", default = "redis://127.0.0.1:6379/")]
    pub redis_url: String,

    #[envconfig(from = "RECORD_ID", default = "product:917:stock")]
    pub record_id: String,

    #[envconfig(from = "INITIAL_STOCK", default = "50")]
    pub initial_stock: i64,

    #[envconfig(from = "CLIENT_1_CHANGE", default = "-5")]
    pub client_1_change: i64,

    #[envconfig(from = "CLIENT_2_CHANGE", default = "-10")]
    pub client_2_change: i64,

    #[envconfig(from = "MAX_ATTEMPTS", default = "3")]
    pub max_attempts: u32,

    #[envconfig(from = "RETRY_DELAY_MS", default = "10")]
    pub retry_delay_ms: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: tracing::Level,
}

impl Config {
    pub fn retry_policy(&self) -> anyhow::Result<RetryPolicy> {
        let max_attempts = NonZeroU32::new(self.max_attempts)
            .ok_or_else(|| anyhow!("MAX_ATTEMPTS must be at least 1"))?;

        Ok(RetryPolicy::new(
            max_attempts,
            Backoff::Fixed(Duration::from_millis(self.retry_delay_ms)),
        ))
    }
}
