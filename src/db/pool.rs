//! Database connection pool abstraction
//!
//! Repositories and migrations talk to the store through the `DatabasePool`
//! trait, so the pool can be shared as a trait object and swapped in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;

use crate::config::DatabaseConfig;

/// Database pool trait that abstracts over the connection pool.
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Execute a raw SQL query that doesn't return rows
    async fn execute(&self, query: &str) -> Result<u64>;

    /// Check if the database connection is healthy
    async fn ping(&self) -> Result<()>;

    /// Close the connection pool
    async fn close(&self);

    /// Get the underlying SQLite pool
    fn sqlite(&self) -> &SqlitePool;
}

/// SQLite connection pool implementation
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Create a new SQLite connection pool
    pub async fn new(url: &str, max_connections: u32) -> Result<Self> {
        // Ensure the database directory exists for file-based SQLite
        if !url.starts_with(":memory:") && !url.starts_with("sqlite::memory:") {
            let path = url.strip_prefix("sqlite:").unwrap_or(url);
            let path = path.split('?').next().unwrap_or(path);

            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory: {:?}", parent)
                    })?;
                }
            }
        }

        let connection_url = if url.starts_with("sqlite:") {
            if url.contains('?') {
                url.to_string()
            } else {
                format!("{}?mode=rwc", url)
            }
        } else if url == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", url)
        };

        // sqlx enables foreign keys on every pooled connection by default
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&connection_url)
            .await
            .with_context(|| format!("Failed to connect to SQLite database: {}", url))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for SqliteDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let result = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn sqlite(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Type alias for a shared database pool
pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// Create a database connection pool based on configuration.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    let db = SqliteDatabase::new(&config.url, config.max_connections).await?;
    Ok(Arc::new(db))
}

/// Create a SQLite in-memory database pool for testing
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    let config = DatabaseConfig {
        url: ":memory:".to_string(),
        max_connections: 5,
    };
    create_pool(&config).await
}

/// Create a file-backed pool for tests that need real concurrent writers
#[cfg(test)]
pub(crate) async fn create_file_test_pool(path: &std::path::Path) -> Result<DynDatabasePool> {
    let config = DatabaseConfig {
        url: path.to_string_lossy().to_string(),
        max_connections: 10,
    };
    create_pool(&config).await
}
