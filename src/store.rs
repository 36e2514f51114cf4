//! Persistent requirement store.
//!
//! SQLite via SQLx holds the per-group configuration and the referral
//! ledger: required channels, required referral counts, ledger entries and
//! per-user satisfaction flags. Concurrent writers rely on the unique
//! constraints (`INSERT OR IGNORE` / upserts), not on explicit locking.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Handle to the moderation database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Open (and create if missing) the database at `path`.
    ///
    /// `":memory:"` opens a uniquely named shared-cache in-memory database so
    /// parallel tests do not collide.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let uri = format!(
                "file:uzguard-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );
            let options = SqliteConnectOptions::new()
                .filename(&uri)
                .shared_cache(true)
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        tracing::warn!(path = %parent.display(), error = %e,
                            "failed to create database directory");
                    }
                }
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await?
        };

        // WAL lets requirement reads proceed while ledger writes commit.
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(path = %path, "store opened");
        Ok(store)
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS required_channels (
                group_id   INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                PRIMARY KEY (group_id, channel_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS referrals (
                group_id INTEGER NOT NULL,
                adder_id INTEGER NOT NULL,
                member_id INTEGER NOT NULL,
                added_at INTEGER NOT NULL,
                PRIMARY KEY (group_id, member_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_referrals_adder ON referrals (group_id, adder_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS group_requirements (
                group_id       INTEGER PRIMARY KEY,
                required_count INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_status (
                group_id  INTEGER NOT NULL,
                user_id   INTEGER NOT NULL,
                satisfied INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (group_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ---- required channels ----

    pub async fn add_required_channel(
        &self,
        group_id: i64,
        channel_id: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO required_channels (group_id, channel_id) VALUES (?, ?)",
        )
        .bind(group_id)
        .bind(channel_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_required_channel(
        &self,
        group_id: i64,
        channel_id: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM required_channels WHERE group_id = ? AND channel_id = ?")
            .bind(group_id)
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn required_channels(&self, group_id: i64) -> Result<Vec<i64>, StoreError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT channel_id FROM required_channels WHERE group_id = ?")
                .bind(group_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    // ---- referral ledger ----

    /// Record that `adder_id` brought `member_id` into the group.
    ///
    /// At-most-once attribution: the (group, member) pair is unique, a
    /// duplicate insert is a silent no-op. Returns whether a row was added.
    pub async fn record_referral(
        &self,
        group_id: i64,
        adder_id: i64,
        member_id: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO referrals (group_id, adder_id, member_id, added_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(group_id)
        .bind(adder_id)
        .bind(member_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn referral_count(&self, group_id: i64, adder_id: i64) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM referrals WHERE group_id = ? AND adder_id = ?",
        )
        .bind(group_id)
        .bind(adder_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Top adders for a group: (adder_id, total), descending.
    pub async fn top_adders(
        &self,
        group_id: i64,
        limit: i64,
    ) -> Result<Vec<(i64, i64)>, StoreError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT adder_id, COUNT(*) as total
            FROM referrals
            WHERE group_id = ?
            GROUP BY adder_id
            ORDER BY total DESC
            LIMIT ?
            "#,
        )
        .bind(group_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ---- group requirement ----

    /// Set the referral threshold for a group; zero disables the requirement.
    pub async fn set_required_count(&self, group_id: i64, count: i64) -> Result<(), StoreError> {
        if count <= 0 {
            sqlx::query("DELETE FROM group_requirements WHERE group_id = ?")
                .bind(group_id)
                .execute(&self.pool)
                .await?;
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO group_requirements (group_id, required_count) VALUES (?, ?)
            ON CONFLICT(group_id) DO UPDATE SET required_count = excluded.required_count
            "#,
        )
        .bind(group_id)
        .bind(count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// `None` means the referral requirement is disabled for the group.
    pub async fn required_count(&self, group_id: i64) -> Result<Option<i64>, StoreError> {
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT required_count FROM group_requirements WHERE group_id = ?",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.filter(|c| *c > 0))
    }

    // ---- user satisfaction ----

    pub async fn is_satisfied(&self, group_id: i64, user_id: i64) -> Result<bool, StoreError> {
        let row: Option<i64> = sqlx::query_scalar(
            "SELECT satisfied FROM user_status WHERE group_id = ? AND user_id = ?",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.unwrap_or(0) != 0)
    }

    pub async fn set_satisfied(
        &self,
        group_id: i64,
        user_id: i64,
        satisfied: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_status (group_id, user_id, satisfied) VALUES (?, ?, ?)
            ON CONFLICT(group_id, user_id) DO UPDATE SET satisfied = excluded.satisfied
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(satisfied as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- administrative resets ----

    /// Drop one user's ledger rows and force their status back to unsatisfied.
    pub async fn clear_user(&self, group_id: i64, user_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM referrals WHERE group_id = ? AND adder_id = ?")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        self.set_satisfied(group_id, user_id, false).await
    }

    /// Group-wide reset of the ledger and every satisfaction flag.
    pub async fn clear_group(&self, group_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM referrals WHERE group_id = ?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM user_status WHERE group_id = ?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
