//! Storage Gateway: a pooled connection to the relational store plus the
//! small error taxonomy every other component relies on.
//!
//! Callers obtain a pooled client via [`Storage::client`] and drive their
//! own transaction scope with `tokio_postgres::Client::transaction()`; this
//! mirrors the underlying driver closely enough that the Sync Counter
//! Engine's two-stage-commit sequence (spec §4.3.1) can be expressed
//! directly without fighting a heavier abstraction.

mod migrations;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

use crate::config::DatabaseConfig;
use crate::error::DatabaseError;

/// Shared handle to the connection pool. Cheap to clone; hands out pooled
/// connections on demand. One instance lives for the lifetime of the
/// process.
#[derive(Clone)]
pub struct Storage {
    pool: Pool,
}

impl Storage {
    /// Builds the pool and runs embedded migrations against it. Call once
    /// at process start.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pg_config: tokio_postgres::Config = config
            .database_url
            .parse()
            .map_err(|e| DatabaseError::Connection(format!("invalid DATABASE_URL: {e}")))?;

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = Manager::from_config(pg_config, NoTls, manager_config);
        let pool = Pool::builder(manager)
            .max_size(config.max_pool_size)
            .build()?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Wraps an already-built pool without running migrations again. Used
    /// by integration tests that migrate a testcontainer once and want to
    /// construct several `Storage` handles against it.
    pub(crate) fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let mut client = self.pool.get().await?;
        migrations::runner()
            .run_async(&mut **client)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Checks out a connection from the pool.
    pub async fn client(&self) -> Result<deadpool_postgres::Client, DatabaseError> {
        Ok(self.pool.get().await?)
    }
}
