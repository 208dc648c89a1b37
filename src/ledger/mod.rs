use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::storage::Storage;

/// Which side of the score a ledger entry lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ScoreKind {
    Activity,
    Title,
}

impl ScoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreKind::Activity => "activity",
            ScoreKind::Title => "title",
        }
    }
}

/// One score-affecting event. Append-only: rows are never mutated or
/// deleted, they are the audit trail behind the aggregate.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ScoreLogEntry {
    /// Autoincrement id, which doubles as the per-user insertion order.
    pub id: i64,
    pub user_id: String,
    pub kind: ScoreKind,
    pub action: String,
    /// Signed; negative amounts are corrections.
    pub amount: i64,
    pub created_at: String,
}

/// Current totals for one user. `total_score` is always the sum of the
/// other two columns; the ledger maintains all three in one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct UserScoreAggregate {
    pub user_id: String,
    pub activity_score: i64,
    pub title_bonus: i64,
    pub total_score: i64,
}

impl UserScoreAggregate {
    fn zero(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            activity_score: 0,
            title_bonus: 0,
            total_score: 0,
        }
    }
}

/// Durable history of score events plus the stored aggregate.
#[derive(Clone)]
pub struct ScoreLedger {
    storage: Arc<Storage>,
}

impl ScoreLedger {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Append one event and fold it into the aggregate, atomically.
    ///
    /// The log insert and the aggregate upsert run in a single transaction,
    /// and the upsert increments in the database (`score + excluded.score`)
    /// rather than reading and writing back, so concurrent appends for the
    /// same user serialize in the store instead of racing in process memory.
    pub async fn append(
        &self,
        user_id: &str,
        kind: ScoreKind,
        action: &str,
        amount: i64,
    ) -> Result<ScoreLogEntry> {
        self.storage
            .with_timeout(async {
                let now = Utc::now().to_rfc3339();
                let (activity_delta, title_delta) = match kind {
                    ScoreKind::Activity => (amount, 0),
                    ScoreKind::Title => (0, amount),
                };

                let mut tx = self.storage.pool().begin().await?;
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO score_logs (user_id, kind, action, amount, created_at)
                     VALUES (?, ?, ?, ?, ?)
                     RETURNING id",
                )
                .bind(user_id)
                .bind(kind)
                .bind(action)
                .bind(amount)
                .bind(&now)
                .fetch_one(&mut *tx)
                .await?;

                sqlx::query(
                    "INSERT INTO user_scores (user_id, activity_score, title_bonus, total_score)
                     VALUES (?, ?, ?, ?)
                     ON CONFLICT(user_id) DO UPDATE SET
                       activity_score = activity_score + excluded.activity_score,
                       title_bonus = title_bonus + excluded.title_bonus,
                       total_score = total_score + excluded.total_score",
                )
                .bind(user_id)
                .bind(activity_delta)
                .bind(title_delta)
                .bind(amount)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

                debug!(user_id, kind = kind.as_str(), action, amount, "score event appended");
                Ok(ScoreLogEntry {
                    id,
                    user_id: user_id.to_string(),
                    kind,
                    action: action.to_string(),
                    amount,
                    created_at: now,
                })
            })
            .await
    }

    /// Append a title bonus unless one was already granted for this code.
    ///
    /// The existence check and the insert share one transaction, so two
    /// concurrent grants of the same title cannot both land. Returns `None`
    /// when the bonus was already on the ledger.
    pub async fn append_title_once(
        &self,
        user_id: &str,
        code: &str,
        amount: i64,
    ) -> Result<Option<ScoreLogEntry>> {
        self.storage
            .with_timeout(async {
                let now = Utc::now().to_rfc3339();
                let mut tx = self.storage.pool().begin().await?;

                let already: i64 = sqlx::query_scalar(
                    "SELECT EXISTS(
                       SELECT 1 FROM score_logs
                       WHERE user_id = ? AND kind = 'title' AND action = ?
                     )",
                )
                .bind(user_id)
                .bind(code)
                .fetch_one(&mut *tx)
                .await?;
                if already != 0 {
                    debug!(user_id, code, "title bonus already granted");
                    return Ok(None);
                }

                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO score_logs (user_id, kind, action, amount, created_at)
                     VALUES (?, 'title', ?, ?, ?)
                     RETURNING id",
                )
                .bind(user_id)
                .bind(code)
                .bind(amount)
                .bind(&now)
                .fetch_one(&mut *tx)
                .await?;

                sqlx::query(
                    "INSERT INTO user_scores (user_id, activity_score, title_bonus, total_score)
                     VALUES (?, 0, ?, ?)
                     ON CONFLICT(user_id) DO UPDATE SET
                       title_bonus = title_bonus + excluded.title_bonus,
                       total_score = total_score + excluded.total_score",
                )
                .bind(user_id)
                .bind(amount)
                .bind(amount)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

                Ok(Some(ScoreLogEntry {
                    id,
                    user_id: user_id.to_string(),
                    kind: ScoreKind::Title,
                    action: code.to_string(),
                    amount,
                    created_at: now,
                }))
            })
            .await
    }

    /// Most recent entries, newest first. `limit` must be positive.
    pub async fn recent_history(&self, user_id: &str, limit: i64) -> Result<Vec<ScoreLogEntry>> {
        if limit <= 0 {
            return Err(EngineError::Validation(format!(
                "history limit must be positive, got {limit}"
            )));
        }
        self.storage
            .with_timeout(async {
                Ok(sqlx::query_as(
                    "SELECT * FROM score_logs WHERE user_id = ?
                     ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(user_id)
                .bind(limit)
                .fetch_all(&self.storage.pool())
                .await?)
            })
            .await
    }

    /// The stored aggregate, or all zeros for a user with no entries yet.
    pub async fn current_aggregate(&self, user_id: &str) -> Result<UserScoreAggregate> {
        self.storage
            .with_timeout(async {
                let row: Option<UserScoreAggregate> =
                    sqlx::query_as("SELECT * FROM user_scores WHERE user_id = ?")
                        .bind(user_id)
                        .fetch_optional(&self.storage.pool())
                        .await?;
                Ok(row.unwrap_or_else(|| UserScoreAggregate::zero(user_id)))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_ledger() -> ScoreLedger {
        let storage = Arc::new(Storage::in_memory().await.unwrap());
        ScoreLedger::new(storage)
    }

    fn assert_consistent(aggregate: &UserScoreAggregate) {
        assert_eq!(
            aggregate.total_score,
            aggregate.activity_score + aggregate.title_bonus
        );
    }

    #[tokio::test]
    async fn aggregate_defaults_to_zero() {
        let ledger = make_ledger().await;
        let aggregate = ledger.current_aggregate("u1").await.unwrap();
        assert_eq!(aggregate, UserScoreAggregate::zero("u1"));
    }

    #[tokio::test]
    async fn append_updates_the_matching_side() {
        let ledger = make_ledger().await;
        ledger
            .append("u1", ScoreKind::Activity, "entry_logged", 10)
            .await
            .unwrap();
        ledger
            .append("u1", ScoreKind::Title, "TEN_STEPS", 25)
            .await
            .unwrap();

        let aggregate = ledger.current_aggregate("u1").await.unwrap();
        assert_eq!(aggregate.activity_score, 10);
        assert_eq!(aggregate.title_bonus, 25);
        assert_consistent(&aggregate);
    }

    #[tokio::test]
    async fn negative_amounts_fold_as_signed_sums() {
        let ledger = make_ledger().await;
        ledger
            .append("u1", ScoreKind::Activity, "entry_logged", 10)
            .await
            .unwrap();
        ledger
            .append("u1", ScoreKind::Activity, "entry_removed", -4)
            .await
            .unwrap();

        let aggregate = ledger.current_aggregate("u1").await.unwrap();
        assert_eq!(aggregate.activity_score, 6);
        assert_consistent(&aggregate);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_bounded() {
        let ledger = make_ledger().await;
        for i in 0..5 {
            ledger
                .append("u1", ScoreKind::Activity, &format!("event_{i}"), 1)
                .await
                .unwrap();
        }

        let history = ledger.recent_history("u1", 3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].action, "event_4");
        assert_eq!(history[1].action, "event_3");
        assert_eq!(history[2].action, "event_2");
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let ledger = make_ledger().await;
        let err = ledger.recent_history("u1", 0).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn history_is_scoped_per_user() {
        let ledger = make_ledger().await;
        ledger
            .append("u1", ScoreKind::Activity, "mine", 1)
            .await
            .unwrap();
        ledger
            .append("u2", ScoreKind::Activity, "theirs", 1)
            .await
            .unwrap();

        let history = ledger.recent_history("u1", 20).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, "mine");
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_lose_updates() {
        let ledger = make_ledger().await;
        let (a, b) = tokio::join!(
            ledger.append("u1", ScoreKind::Activity, "burst_a", 5),
            ledger.append("u1", ScoreKind::Activity, "burst_b", 5),
        );
        a.unwrap();
        b.unwrap();

        let aggregate = ledger.current_aggregate("u1").await.unwrap();
        assert_eq!(aggregate.activity_score, 10);
        assert_consistent(&aggregate);
    }

    #[tokio::test]
    async fn title_bonus_is_granted_once() {
        let ledger = make_ledger().await;
        let first = ledger.append_title_once("u1", "CRITIC", 25).await.unwrap();
        assert!(first.is_some());
        let second = ledger.append_title_once("u1", "CRITIC", 25).await.unwrap();
        assert!(second.is_none());

        let aggregate = ledger.current_aggregate("u1").await.unwrap();
        assert_eq!(aggregate.title_bonus, 25);
        assert_consistent(&aggregate);
    }
}
