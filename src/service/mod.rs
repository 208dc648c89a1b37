use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::catalog::{TitleCatalog, TitleDefinition};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::evaluator::is_unlocked;
use crate::identity::IdentityProvider;
use crate::ledger::{ScoreKind, ScoreLedger, ScoreLogEntry, UserScoreAggregate};
use crate::selection::{SelectionManager, SelectionState};
use crate::stats::{StatsAggregator, StatsSnapshot};
use crate::storage::Storage;

/// A catalog entry with its per-request unlocked flag. Derived on every
/// read, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct TitleWithStatus {
    #[serde(flatten)]
    pub title: TitleDefinition,
    pub unlocked: bool,
}

/// Everything the achievement page renders for one user.
#[derive(Debug, Clone, Serialize)]
pub struct AchievementView {
    pub titles: Vec<TitleWithStatus>,
    pub score_logs: Vec<ScoreLogEntry>,
    pub user_score: UserScoreAggregate,
    pub stats: StatsSnapshot,
}

/// Root of the achievement engine. Page handlers and activity producers
/// talk to this; everything below it is wiring.
#[derive(Clone)]
pub struct AchievementService {
    catalog: Arc<TitleCatalog>,
    config: Arc<EngineConfig>,
    aggregator: StatsAggregator,
    ledger: ScoreLedger,
    selection: SelectionManager,
    identity: Arc<dyn IdentityProvider>,
}

impl AchievementService {
    /// Builtin catalog, default config.
    pub fn new(storage: Arc<Storage>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self::with_parts(
            storage,
            TitleCatalog::builtin(),
            Arc::new(EngineConfig::default()),
            identity,
        )
    }

    pub fn with_parts(
        storage: Arc<Storage>,
        catalog: Arc<TitleCatalog>,
        config: Arc<EngineConfig>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let aggregator = StatsAggregator::new(Arc::clone(&storage), Arc::clone(&config));
        let ledger = ScoreLedger::new(Arc::clone(&storage));
        let selection = SelectionManager::new(
            Arc::clone(&storage),
            Arc::clone(&catalog),
            aggregator.clone(),
        );
        Self {
            catalog,
            config,
            aggregator,
            ledger,
            selection,
            identity,
        }
    }

    pub fn catalog(&self) -> &TitleCatalog {
        &self.catalog
    }

    /// Resolve the target user and assemble the achievement page view.
    ///
    /// `None` target with no caller identity returns `Ok(None)`: an
    /// unauthenticated visitor sees a sign-in prompt, not an error. The
    /// three store fetches are independent and run concurrently; any
    /// failure aborts the whole request (no partial view).
    pub async fn get_achievement_data(
        &self,
        user_id: Option<&str>,
    ) -> Result<Option<AchievementView>> {
        let target = match user_id {
            Some(id) => id.to_string(),
            None => match self.identity.current_user_id().await {
                Some(id) => id,
                None => return Ok(None),
            },
        };

        let (stats, score_logs, user_score) = tokio::try_join!(
            self.aggregator.compute_stats(&target),
            self.ledger.recent_history(&target, self.config.history_limit),
            self.ledger.current_aggregate(&target),
        )?;

        let titles = self
            .catalog
            .iter()
            .map(|title| TitleWithStatus {
                unlocked: is_unlocked(&title.condition, &stats),
                title: title.clone(),
            })
            .collect();

        Ok(Some(AchievementView {
            titles,
            score_logs,
            user_score,
            stats,
        }))
    }

    /// The caller's stored selection fields.
    pub async fn selection_state(&self, user_id: &str) -> Result<SelectionState> {
        self.selection.selection_state(user_id).await
    }

    /// Set or clear the caller's primary title.
    pub async fn select_title(&self, code: Option<&str>) -> Result<()> {
        let caller = self.require_caller().await?;
        self.selection.select_title(&caller, code).await
    }

    /// Replace the caller's showcase (at most three unlocked titles).
    pub async fn update_showcase(&self, codes: Vec<String>) -> Result<()> {
        let caller = self.require_caller().await?;
        self.selection.update_showcase(&caller, codes).await
    }

    /// Ledger append for activity producers elsewhere in the application.
    pub async fn record_score_event(
        &self,
        user_id: &str,
        kind: ScoreKind,
        action: &str,
        amount: i64,
    ) -> Result<ScoreLogEntry> {
        self.ledger.append(user_id, kind, action, amount).await
    }

    /// Grant a title's bonus score, once per user per title.
    ///
    /// The title must be currently unlocked. Returns `None` when the bonus
    /// was already granted; re-awarding is a logged no-op, matching the
    /// additive-only ledger (there is no revoke event).
    pub async fn award_title(&self, user_id: &str, code: &str) -> Result<Option<ScoreLogEntry>> {
        let definition = self
            .catalog
            .get(code)
            .ok_or_else(|| EngineError::NotFound(format!("title {code}")))?;
        let stats = self.aggregator.compute_stats(user_id).await?;
        if !is_unlocked(&definition.condition, &stats) {
            return Err(EngineError::Forbidden(code.to_string()));
        }

        let granted = self
            .ledger
            .append_title_once(user_id, code, definition.bonus_score)
            .await?;
        if granted.is_some() {
            info!(user_id, code, bonus = definition.bonus_score, "title bonus granted");
        }
        Ok(granted)
    }

    async fn require_caller(&self) -> Result<String> {
        self.identity
            .current_user_id()
            .await
            .ok_or(EngineError::Unauthorized)
    }
}
