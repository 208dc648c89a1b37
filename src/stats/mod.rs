use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::StatKey;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::storage::Storage;

/// Flat numeric snapshot of a user's activity.
///
/// Recomputed on every read, never persisted. Missing keys read as 0 and all
/// stored values are non-negative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsSnapshot(BTreeMap<StatKey, f64>);

impl StatsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: StatKey) -> f64 {
        self.0.get(&key).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, key: StatKey, value: f64) {
        self.0.insert(key, value.max(0.0));
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatKey, f64)> + '_ {
        self.0.iter().map(|(&k, &v)| (k, v))
    }
}

impl FromIterator<(StatKey, f64)> for StatsSnapshot {
    fn from_iter<I: IntoIterator<Item = (StatKey, f64)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (key, value) in iter {
            snapshot.set(key, value);
        }
        snapshot
    }
}

/// Computes the stats snapshot from the raw activity tables.
///
/// The six sub-queries are independent; they are issued concurrently and
/// joined before the snapshot is assembled. Any store failure aborts the
/// whole computation; there is no partial snapshot.
#[derive(Clone)]
pub struct StatsAggregator {
    storage: Arc<Storage>,
    config: Arc<EngineConfig>,
}

impl StatsAggregator {
    pub fn new(storage: Arc<Storage>, config: Arc<EngineConfig>) -> Self {
        Self { storage, config }
    }

    pub async fn compute_stats(&self, user_id: &str) -> Result<StatsSnapshot> {
        if !self.storage.user_exists(user_id).await? {
            return Err(EngineError::NotFound(format!("user {user_id}")));
        }

        let (content, records, categories, creators, completed, (avg_len, long_reviews)) =
            tokio::try_join!(
                self.entry_count(user_id),
                self.record_count(user_id),
                self.category_count(user_id),
                self.creator_count(user_id),
                self.completed_count(user_id),
                self.review_stats(user_id),
            )?;

        let snapshot: StatsSnapshot = [
            (StatKey::ContentCount, content as f64),
            (StatKey::RecordCount, records as f64),
            (StatKey::CategoryCount, categories as f64),
            (StatKey::CreatorCount, creators as f64),
            (StatKey::CompletedCount, completed as f64),
            (StatKey::AvgReviewLength, avg_len),
            (StatKey::LongReviewCount, long_reviews as f64),
        ]
        .into_iter()
        .collect();

        debug!(user_id, ?snapshot, "computed stats snapshot");
        Ok(snapshot)
    }

    async fn entry_count(&self, user_id: &str) -> Result<i64> {
        self.storage
            .with_timeout(async {
                Ok(
                    sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE user_id = ?")
                        .bind(user_id)
                        .fetch_one(&self.storage.pool())
                        .await?,
                )
            })
            .await
    }

    async fn record_count(&self, user_id: &str) -> Result<i64> {
        self.storage
            .with_timeout(async {
                Ok(
                    sqlx::query_scalar("SELECT COUNT(*) FROM journal_records WHERE user_id = ?")
                        .bind(user_id)
                        .fetch_one(&self.storage.pool())
                        .await?,
                )
            })
            .await
    }

    /// Entries with no category are excluded from the distinct count.
    async fn category_count(&self, user_id: &str) -> Result<i64> {
        self.storage
            .with_timeout(async {
                Ok(sqlx::query_scalar(
                    "SELECT COUNT(DISTINCT category) FROM entries
                     WHERE user_id = ? AND category IS NOT NULL",
                )
                .bind(user_id)
                .fetch_one(&self.storage.pool())
                .await?)
            })
            .await
    }

    async fn creator_count(&self, user_id: &str) -> Result<i64> {
        self.storage
            .with_timeout(async {
                Ok(sqlx::query_scalar(
                    "SELECT COUNT(DISTINCT creator) FROM entries
                     WHERE user_id = ? AND creator IS NOT NULL",
                )
                .bind(user_id)
                .fetch_one(&self.storage.pool())
                .await?)
            })
            .await
    }

    async fn completed_count(&self, user_id: &str) -> Result<i64> {
        let statuses = &self.config.completed_statuses;
        if statuses.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT COUNT(*) FROM entries WHERE user_id = ? AND status IN ({placeholders})"
        );
        self.storage
            .with_timeout(async {
                let mut query = sqlx::query_scalar(&sql).bind(user_id);
                for status in statuses {
                    query = query.bind(status);
                }
                Ok(query.fetch_one(&self.storage.pool()).await?)
            })
            .await
    }

    /// Average review length and count of reviews at or above the
    /// long-review threshold, in one pass.
    async fn review_stats(&self, user_id: &str) -> Result<(f64, i64)> {
        self.storage
            .with_timeout(async {
                let row: (f64, i64) = sqlx::query_as(
                    "SELECT
                       CAST(COALESCE(AVG(LENGTH(body)), 0) AS REAL),
                       COALESCE(SUM(CASE WHEN LENGTH(body) >= ? THEN 1 ELSE 0 END), 0)
                     FROM reviews WHERE user_id = ?",
                )
                .bind(self.config.long_review_chars)
                .bind(user_id)
                .fetch_one(&self.storage.pool())
                .await?;
                Ok(row)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    async fn make_aggregator() -> (StatsAggregator, Arc<Storage>) {
        let storage = Arc::new(Storage::in_memory().await.unwrap());
        let aggregator =
            StatsAggregator::new(Arc::clone(&storage), Arc::new(EngineConfig::default()));
        (aggregator, storage)
    }

    async fn seed_user(storage: &Storage, id: &str) {
        sqlx::query("INSERT INTO users (id, username, created_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(id)
            .bind(Utc::now().to_rfc3339())
            .execute(&storage.pool())
            .await
            .unwrap();
    }

    async fn seed_entry(
        storage: &Storage,
        user_id: &str,
        category: Option<&str>,
        creator: Option<&str>,
        status: &str,
    ) {
        sqlx::query(
            "INSERT INTO entries (id, user_id, title, category, creator, status, created_at)
             VALUES (?, ?, 'some work', ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(category)
        .bind(creator)
        .bind(status)
        .bind(Utc::now().to_rfc3339())
        .execute(&storage.pool())
        .await
        .unwrap();
    }

    async fn seed_review(storage: &Storage, user_id: &str, body: &str) {
        sqlx::query(
            "INSERT INTO reviews (id, user_id, body, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&storage.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (aggregator, _storage) = make_aggregator().await;
        let err = aggregator.compute_stats("ghost").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn fresh_user_has_all_zero_stats() {
        let (aggregator, storage) = make_aggregator().await;
        seed_user(&storage, "u1").await;
        let stats = aggregator.compute_stats("u1").await.unwrap();
        for key in StatKey::ALL {
            assert_eq!(stats.get(key), 0.0, "{key:?} should default to zero");
        }
    }

    #[tokio::test]
    async fn null_category_and_creator_are_excluded_from_distinct_counts() {
        let (aggregator, storage) = make_aggregator().await;
        seed_user(&storage, "u1").await;
        seed_entry(&storage, "u1", Some("film"), Some("kurosawa"), "completed").await;
        seed_entry(&storage, "u1", Some("film"), None, "logged").await;
        seed_entry(&storage, "u1", None, Some("herbert"), "completed").await;
        seed_entry(&storage, "u1", Some("book"), Some("herbert"), "dropped").await;

        let stats = aggregator.compute_stats("u1").await.unwrap();
        assert_eq!(stats.get(StatKey::ContentCount), 4.0);
        assert_eq!(stats.get(StatKey::CategoryCount), 2.0);
        assert_eq!(stats.get(StatKey::CreatorCount), 2.0);
        assert_eq!(stats.get(StatKey::CompletedCount), 2.0);
    }

    #[tokio::test]
    async fn review_stats_average_and_long_count() {
        let (aggregator, storage) = make_aggregator().await;
        seed_user(&storage, "u1").await;
        seed_review(&storage, "u1", &"a".repeat(100)).await;
        seed_review(&storage, "u1", &"b".repeat(300)).await;
        seed_review(&storage, "u1", &"c".repeat(500)).await;

        let stats = aggregator.compute_stats("u1").await.unwrap();
        assert_eq!(stats.get(StatKey::AvgReviewLength), 300.0);
        // 300-char review meets the >= 300 threshold.
        assert_eq!(stats.get(StatKey::LongReviewCount), 2.0);
    }

    #[tokio::test]
    async fn recomputation_is_deterministic() {
        let (aggregator, storage) = make_aggregator().await;
        seed_user(&storage, "u1").await;
        seed_entry(&storage, "u1", Some("game"), Some("studio"), "completed").await;
        seed_review(&storage, "u1", &"r".repeat(250)).await;

        let first = aggregator.compute_stats("u1").await.unwrap();
        let second = aggregator.compute_stats("u1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn stats_of_other_users_do_not_leak() {
        let (aggregator, storage) = make_aggregator().await;
        seed_user(&storage, "u1").await;
        seed_user(&storage, "u2").await;
        seed_entry(&storage, "u2", Some("film"), Some("tarr"), "completed").await;

        let stats = aggregator.compute_stats("u1").await.unwrap();
        assert_eq!(stats.get(StatKey::ContentCount), 0.0);
    }
}
