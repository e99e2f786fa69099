mod from_row;
pub mod queries;

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::error::Result;

pub type DbPool = Pool<SqliteConnectionManager>;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a pooled connection to an on-disk database and create the schema.
pub fn create_pool(path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    let pool = Pool::builder().max_size(8).build(manager)?;
    init_db(&*pool.get()?)?;
    Ok(pool)
}

/// In-memory database. Every SQLite memory connection is its own database,
/// so the pool is capped at a single connection.
pub fn create_memory_pool() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager)?;
    init_db(&*pool.get()?)?;
    Ok(pool)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS vouchers (
            id TEXT PRIMARY KEY,
            code_hash TEXT NOT NULL,
            salt TEXT NOT NULL,
            lookup_key TEXT NOT NULL,
            denomination INTEGER NOT NULL CHECK (denomination > 0),
            learner_count INTEGER NOT NULL CHECK (learner_count > 0),
            issued_by_user_id TEXT NOT NULL,
            institution_id TEXT NOT NULL,
            is_redeemed INTEGER NOT NULL DEFAULT 0,
            redeemed_by TEXT,
            redeemed_at INTEGER,
            created_at INTEGER NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_vouchers_lookup_key ON vouchers(lookup_key);
        CREATE INDEX IF NOT EXISTS idx_vouchers_institution ON vouchers(institution_id, created_at);

        CREATE TABLE IF NOT EXISTS credit_accounts (
            user_id TEXT PRIMARY KEY,
            balance INTEGER NOT NULL CHECK (balance >= 0),
            updated_at INTEGER NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS ledger_entries (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            amount INTEGER NOT NULL,
            balance_after INTEGER NOT NULL CHECK (balance_after >= 0),
            voucher_id TEXT REFERENCES vouchers(id),
            learner_id TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ledger_entries_user ON ledger_entries(user_id, created_at);

        CREATE TABLE IF NOT EXISTS subscriptions (
            learner_id TEXT PRIMARY KEY,
            funded_by TEXT NOT NULL,
            start_date INTEGER NOT NULL,
            end_date INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )?;
    Ok(())
}
