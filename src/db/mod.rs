//! SQLite storage behind an r2d2 pool.
//!
//! Two tables: entitlements keyed by external user id, activation codes
//! keyed by the code string. All mutations run as single transactions on
//! one pooled connection, which gives the single-writer-per-row guarantee
//! the quota logic relies on.

pub mod queries;

use std::sync::Arc;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::config::Config;
use crate::error::Result;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
}

pub fn init_pool(database_path: &str) -> Result<DbPool> {
    // Separate pooled connections to a :memory: path would each get
    // their own database; cap that case at one connection.
    let (manager, max_size) = if database_path == ":memory:" {
        (SqliteConnectionManager::memory(), 1)
    } else {
        (SqliteConnectionManager::file(database_path), 10)
    };
    let manager =
        manager.with_init(|conn| conn.execute_batch("PRAGMA busy_timeout = 5000;"));
    let pool = r2d2::Pool::builder().max_size(max_size).build(manager)?;
    let conn = pool.get()?;
    init_schema(&conn)?;
    Ok(pool)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS entitlements (
            user_id            INTEGER PRIMARY KEY,
            plan_capacity      INTEGER NOT NULL DEFAULT 0,
            plan_used          INTEGER NOT NULL DEFAULT 0,
            lifetime_used      INTEGER NOT NULL DEFAULT 0,
            expires_at         INTEGER,
            last_activation_at INTEGER,
            last_request_at    INTEGER,
            created_at         INTEGER NOT NULL,
            updated_at         INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS activation_codes (
            code        TEXT PRIMARY KEY,
            owner_id    INTEGER,
            note        TEXT,
            created_at  INTEGER NOT NULL,
            redeemed_at INTEGER
        );",
    )?;
    Ok(())
}
