//! Two separate connection pools: one for request-serving paths, one for
//! background pipeline/scheduler work. Background work runs long scans and
//! `FOR UPDATE SKIP LOCKED` batch acquisitions that must never compete with
//! interactive queries for a connection slot or time out on a short statement
//! timeout tuned for request handling.

use outreach_common::{Config, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;

pub async fn connect_foreground(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

pub async fn connect_background(config: &Config) -> Result<PgPool> {
    let opts = PgConnectOptions::from_str(&config.background_database_url)
        .map_err(|e| outreach_common::OutreachError::Config(e.to_string()))?
        .options([(
            "statement_timeout",
            format!("{}", config.background_statement_timeout.as_millis()),
        )]);

    let pool = PgPoolOptions::new()
        .max_connections(config.background_pool_size)
        .connect_with(opts)
        .await?;
    Ok(pool)
}

/// Runs the embedded schema migrations. Idempotent; safe to call on every
/// startup.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
