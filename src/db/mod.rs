//! Ledger store.
//!
//! Typed repositories over Postgres. Reads take a pool; every multi-entity
//! mutation takes a `PgConnection` belonging to a single transaction that the
//! caller begins and commits. Engines serialize globally through the named
//! advisory locks below.

use eyre::{Result, WrapErr};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};

pub mod balances;
pub mod configs;
pub mod locations;
pub mod models;
pub mod records;
pub mod users;
pub mod withdraws;

pub use models::*;

use crate::error::AppError;

/// Exclusive advisory lock held by the deposit engine for a whole run.
pub const LOCK_DEPOSIT_ENGINE: i64 = 0x0d4b_0001;
/// Exclusive advisory lock held by the withdrawal engine for a whole run.
pub const LOCK_WITHDRAW_ENGINE: i64 = 0x0d4b_0002;
/// Exclusive advisory lock held by the monthly fee distributor.
pub const LOCK_MONTHLY_FEE: i64 = 0x0d4b_0003;
/// Transaction-scoped lock serializing location placement and payouts.
pub const LOCK_PLACEMENT: i64 = 0x0d4b_0004;

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to database")
}

/// Run pending migrations (uses the migration files in migrations/)
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .wrap_err("Failed to run database migrations")?;
    Ok(())
}

/// Take a transaction-scoped advisory lock; released automatically at
/// commit or rollback.
pub async fn advisory_xact_lock(conn: &mut PgConnection, key: i64) -> Result<(), AppError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(key)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// A session-scoped advisory lock held for the duration of one engine run.
///
/// The lock lives on a connection detached from the pool. Dropping the guard
/// without calling [`EngineLock::release`] closes that connection, which
/// releases the lock server-side, so a failed run can never wedge the engine.
pub struct EngineLock {
    conn: Option<PgConnection>,
    key: i64,
}

/// Acquire an engine run lock, blocking until it is free.
pub async fn acquire_engine_lock(pool: &PgPool, key: i64) -> Result<EngineLock, AppError> {
    let mut conn = pool.acquire().await?.detach();
    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(key)
        .execute(&mut conn)
        .await?;
    Ok(EngineLock {
        conn: Some(conn),
        key,
    })
}

impl EngineLock {
    /// Release the lock and return the connection to the server cleanly.
    pub async fn release(mut self) -> Result<(), AppError> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(self.key)
                .execute(&mut conn)
                .await?;
            let _ = sqlx::Connection::close(conn).await;
        }
        Ok(())
    }
}
