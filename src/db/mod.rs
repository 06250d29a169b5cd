//! Database layer
//!
//! SQLite persistence for the tag governance engine.
//!
//! # Architecture
//!
//! The pool is shared as a `DynDatabasePool` trait object. Repositories wrap it
//! behind async traits, one per entity, so services never see SQL.
//!
//! # Usage
//!
//! ```ignore
//! use tagvote::config::DatabaseConfig;
//! use tagvote::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool, SqliteDatabase};

#[cfg(test)]
pub(crate) use pool::create_file_test_pool;
