use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;

use crate::config::DatabaseConfig;

pub type Db = Pool<Postgres>;

pub async fn connect(cfg: &DatabaseConfig) -> Result<Db> {
    let statement_timeout = cfg.timeout.as_millis().to_string();
    let options = PgConnectOptions::from_str(&cfg.url)
        .context("invalid DATABASE_URL")?
        .options([("statement_timeout", statement_timeout.as_str())]);

    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(cfg.timeout)
        .connect_with(options)
        .await
        .context("failed to connect to postgres")?;
    Ok(pool)
}
