//! Test harness for database repository testing.
//!
//! Provides fast in-memory SQLite databases with the real migrations
//! applied, so tests exercise the production schema.

use sqlx::SqlitePool;

use crate::db::DbPool;

/// Create an in-memory SQLite pool for testing.
pub async fn create_sqlite_pool() -> SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

/// Build a migrated `DbPool` backed by in-memory SQLite.
pub async fn create_test_db() -> DbPool {
    let pool = create_sqlite_pool().await;
    sqlx::migrate!("./migrations_sqlx/sqlite")
        .run(&pool)
        .await
        .expect("Failed to run SQLite migrations");
    DbPool::from_sqlite(pool)
}
