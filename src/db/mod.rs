//! Persistence layer: models, repositories and the [`RosterStore`] handle.
//!
//! Repositories are stateless and operate on a borrowed `SqliteConnection`,
//! so the same query code serves both plain reads (a pooled connection) and
//! multi-step mutations (a [`RosterTx`]).

pub mod models;
pub mod repository;

use std::sync::Arc;

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{AppError, AppResult};

pub use models::*;
pub use repository::*;

/// Shared storage handle.
///
/// SQLite starts transactions as deferred readers, so two writers can both
/// observe the same "last free slot" before either upgrades its lock. All
/// roster mutations therefore go through [`RosterStore::begin`], which holds
/// a process-wide write gate for the lifetime of the transaction.
#[derive(Clone)]
pub struct RosterStore {
    pool: SqlitePool,
    write_gate: Arc<Mutex<()>>,
}

impl RosterStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Pooled connection for reads that need no isolation from writers.
    pub async fn acquire(&self) -> AppResult<PoolConnection<Sqlite>> {
        self.pool.acquire().await.map_err(AppError::Database)
    }

    /// Open a serialized write transaction.
    pub async fn begin(&self) -> AppResult<RosterTx> {
        let gate = self.write_gate.clone().lock_owned().await;
        let tx = self.pool.begin().await.map_err(AppError::Database)?;
        Ok(RosterTx { tx, _gate: gate })
    }
}

/// A write transaction holding the store's write gate.
///
/// Dropping it without [`RosterTx::commit`] rolls back. Field order matters:
/// the transaction is released before the gate.
pub struct RosterTx {
    tx: Transaction<'static, Sqlite>,
    _gate: OwnedMutexGuard<()>,
}

impl RosterTx {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> AppResult<()> {
        self.tx.commit().await.map_err(AppError::Database)
    }
}

/// In-memory store with migrations applied, for tests.
#[cfg(test)]
pub async fn test_store() -> RosterStore {
    use std::str::FromStr;

    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid in-memory url")
        .foreign_keys(true);
    // A single connection that never expires keeps the in-memory database alive.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("open in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    RosterStore::new(pool)
}
