use anyhow::Context as _;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    ConnectOptions, SqlitePool,
};
use std::{path::Path, str::FromStr, time::Duration};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// The user's selection fields on the profile record.
///
/// `showcase_titles` is a JSON array of title codes, at most three entries,
/// owned and validated by the selection manager before it ever reaches here.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub user_id: String,
    pub selected_title: Option<String>,
    pub showcase_titles: String,
}

/// Client for the application's relational store.
///
/// SQLite in WAL mode stands in for the managed store; everything the engine
/// needs from it is point reads, aggregate reads, and small transactional
/// writes. The activity tables (`entries`, `journal_records`, `reviews`) are
/// written by the rest of the application; the engine only reads them.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> anyhow::Result<Self> {
        Self::new_with_config(data_dir, &EngineConfig::default()).await
    }

    pub async fn new_with_config(data_dir: &Path, config: &EngineConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("Creating data dir {}", data_dir.display()))?;
        let db_path = data_dir.join("accolade.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if config.slow_query_ms > 0 {
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                Duration::from_millis(config.slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self {
            pool,
            query_timeout: config.query_timeout(),
        })
    }

    /// Single-connection in-memory store. Each in-memory SQLite connection
    /// is its own database, so the pool must never grow past one.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self {
            pool,
            query_timeout: EngineConfig::default().query_timeout(),
        })
    }

    /// Return a clone of the connection pool (cheap, Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Execute a future with the configured per-query timeout.
    pub(crate) async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Unavailable(format!(
                "query timed out after {}s",
                self.query_timeout.as_secs()
            ))),
        }
    }

    async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                category TEXT,
                creator TEXT,
                status TEXT NOT NULL DEFAULT 'logged',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entries_user ON entries(user_id);

            CREATE TABLE IF NOT EXISTS journal_records (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_journal_user ON journal_records(user_id);

            CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                entry_id TEXT,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reviews_user ON reviews(user_id);

            CREATE TABLE IF NOT EXISTS score_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                action TEXT NOT NULL,
                amount INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_score_logs_user
                ON score_logs(user_id, created_at);

            CREATE TABLE IF NOT EXISTS user_scores (
                user_id TEXT PRIMARY KEY,
                activity_score INTEGER NOT NULL DEFAULT 0,
                title_bonus INTEGER NOT NULL DEFAULT 0,
                total_score INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                selected_title TEXT,
                showcase_titles TEXT NOT NULL DEFAULT '[]'
            );
            ",
        )
        .execute(pool)
        .await
        .context("Creating achievement tables")?;
        Ok(())
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    pub async fn user_exists(&self, user_id: &str) -> Result<bool> {
        self.with_timeout(async {
            let found: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
            Ok(found != 0)
        })
        .await
    }

    // ─── Profile selection fields ───────────────────────────────────────────

    /// The stored selection fields, or `None` when the user has never
    /// selected anything (the profile row is created lazily).
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        self.with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM user_profiles WHERE user_id = ?")
                    .bind(user_id)
                    .fetch_optional(&self.pool)
                    .await?,
            )
        })
        .await
    }

    pub async fn set_selected_title(&self, user_id: &str, code: Option<&str>) -> Result<()> {
        self.with_timeout(async {
            sqlx::query(
                "INSERT INTO user_profiles (user_id, selected_title) VALUES (?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET selected_title = excluded.selected_title",
            )
            .bind(user_id)
            .bind(code)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Write showcase and derived primary title as one single-row update.
    pub async fn set_showcase(
        &self,
        user_id: &str,
        selected: Option<&str>,
        showcase_json: &str,
    ) -> Result<()> {
        self.with_timeout(async {
            sqlx::query(
                "INSERT INTO user_profiles (user_id, selected_title, showcase_titles)
                 VALUES (?, ?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET
                   selected_title = excluded.selected_title,
                   showcase_titles = excluded.showcase_titles",
            )
            .bind(user_id)
            .bind(selected)
            .bind(showcase_json)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }
}
