// Process configuration, read once at startup from the environment
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub bind_addr: String,
    pub queue_capacity: usize,
    pub worker_count: usize,
    /// Time budget for a single test case execution
    pub execution_timeout: Duration,
    /// Pause before each evaluation starts
    pub evaluation_delay: Duration,
    pub languages_config: PathBuf,
    pub default_competition: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
            queue_capacity: 100,
            worker_count: 1,
            execution_timeout: Duration::from_millis(10_000),
            evaluation_delay: Duration::from_millis(2_000),
            languages_config: PathBuf::from("config/languages.json"),
            default_competition: "comp1".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let queue_capacity = parse_or(&lookup, "QUEUE_CAPACITY", defaults.queue_capacity)?;
        if queue_capacity == 0 {
            anyhow::bail!("QUEUE_CAPACITY must be at least 1");
        }

        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            queue_capacity,
            worker_count: parse_or(&lookup, "WORKER_COUNT", defaults.worker_count)?.max(1),
            execution_timeout: Duration::from_millis(parse_or(
                &lookup,
                "EXECUTION_TIMEOUT_MS",
                defaults.execution_timeout.as_millis() as u64,
            )?),
            evaluation_delay: Duration::from_millis(parse_or(
                &lookup,
                "EVALUATION_DELAY_MS",
                defaults.evaluation_delay.as_millis() as u64,
            )?),
            languages_config: lookup("LANGUAGES_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.languages_config),
            default_competition: lookup("DEFAULT_COMPETITION")
                .unwrap_or(defaults.default_competition),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
