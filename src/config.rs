use anyhow::{bail, Context, Result};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub exam: ExamConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Bound on pool acquire and on every statement.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ExamConfig {
    pub cooldown: chrono::Duration,
    pub passing_threshold: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = var_or("HOST", "0.0.0.0")?;
        let port = var_or("PORT", "8081")?;

        let url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let max_connections = var_or("DATABASE_MAX_CONNECTIONS", "10")?;
        let timeout_ms: u64 = var_or("DATASTORE_TIMEOUT_MS", "5000")?;

        let cooldown = cooldown_from_secs(var_or("EXAM_COOLDOWN_SECS", "3600")?)?;
        let passing_threshold = check_threshold(var_or("EXAM_PASSING_THRESHOLD", "60")?)?;

        Ok(Config {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url,
                max_connections,
                timeout: Duration::from_millis(timeout_ms),
            },
            exam: ExamConfig {
                cooldown,
                passing_threshold,
            },
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

fn var_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .with_context(|| format!("Failed to parse {key}={raw:?}"))
}

fn cooldown_from_secs(secs: i64) -> Result<chrono::Duration> {
    chrono::Duration::try_seconds(secs.max(0))
        .with_context(|| format!("EXAM_COOLDOWN_SECS={secs} is out of range"))
}

fn check_threshold(value: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&value) {
        bail!("EXAM_PASSING_THRESHOLD must be within 0..=100, got {value}");
    }
    Ok(value)
}
