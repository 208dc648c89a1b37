use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::catalog::TitleCatalog;
use crate::error::{EngineError, Result};
use crate::evaluator::is_unlocked;
use crate::stats::StatsAggregator;
use crate::storage::{ProfileRow, Storage};

/// Maximum number of titles a user may showcase publicly.
pub const SHOWCASE_CAPACITY: usize = 3;

/// Ordered, bounded list of showcased title codes.
///
/// The constructor is the only way in, so every `Showcase` in the program
/// is within capacity and duplicate-free. The first entry is the user's
/// primary title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Showcase(Vec<String>);

impl Showcase {
    pub fn new(codes: Vec<String>) -> Result<Self> {
        if codes.len() > SHOWCASE_CAPACITY {
            return Err(EngineError::Validation(format!(
                "showcase holds at most {SHOWCASE_CAPACITY} titles, got {}",
                codes.len()
            )));
        }
        for (i, code) in codes.iter().enumerate() {
            if codes[..i].contains(code) {
                return Err(EngineError::Validation(format!(
                    "duplicate showcase code {code}"
                )));
            }
        }
        Ok(Self(codes))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// The primary title: the first showcased code.
    pub fn primary(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    pub(crate) fn from_json(raw: &str) -> Result<Self> {
        let codes: Vec<String> = serde_json::from_str(raw).map_err(|e| {
            EngineError::Unavailable(format!("corrupt showcase column: {e}"))
        })?;
        Self::new(codes)
    }
}

/// The selection fields of a user profile, as the page sees them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    pub selected_title: Option<String>,
    pub showcase: Showcase,
}

impl SelectionState {
    fn from_row(row: ProfileRow) -> Result<Self> {
        Ok(Self {
            selected_title: row.selected_title,
            showcase: Showcase::from_json(&row.showcase_titles)?,
        })
    }
}

/// Enforces the selection invariants and writes the chosen titles back to
/// the profile record.
///
/// Eligibility is re-validated against live stats on every command; it is
/// never cached. Stored selections are deliberately not revisited when
/// stats later regress; only new selections are guarded.
#[derive(Clone)]
pub struct SelectionManager {
    storage: Arc<Storage>,
    catalog: Arc<TitleCatalog>,
    stats: StatsAggregator,
}

impl SelectionManager {
    pub fn new(storage: Arc<Storage>, catalog: Arc<TitleCatalog>, stats: StatsAggregator) -> Self {
        Self {
            storage,
            catalog,
            stats,
        }
    }

    /// Current selection fields, empty for a user who never selected.
    pub async fn selection_state(&self, user_id: &str) -> Result<SelectionState> {
        match self.storage.get_profile(user_id).await? {
            Some(row) => SelectionState::from_row(row),
            None => Ok(SelectionState::default()),
        }
    }

    /// Set (or clear) the primary title. Clearing never touches the
    /// showcase; setting requires the title to be currently unlocked.
    pub async fn select_title(&self, user_id: &str, code: Option<&str>) -> Result<()> {
        let Some(code) = code else {
            self.storage.set_selected_title(user_id, None).await?;
            info!(user_id, "cleared selected title");
            return Ok(());
        };

        let definition = self
            .catalog
            .get(code)
            .ok_or_else(|| EngineError::NotFound(format!("title {code}")))?;
        let stats = self.stats.compute_stats(user_id).await?;
        if !is_unlocked(&definition.condition, &stats) {
            return Err(EngineError::Forbidden(code.to_string()));
        }

        self.storage.set_selected_title(user_id, Some(code)).await?;
        info!(user_id, code, "selected title");
        Ok(())
    }

    /// Replace the showcase. Validates everything before writing: the
    /// capacity bound first (before any store read), then every code
    /// against the catalog and the live stats, failing fast on the first
    /// violation. On success the showcase and the derived primary title
    /// land as one atomic profile update.
    pub async fn update_showcase(&self, user_id: &str, codes: Vec<String>) -> Result<()> {
        let showcase = Showcase::new(codes)?;

        if !showcase.is_empty() {
            let stats = self.stats.compute_stats(user_id).await?;
            for code in showcase.codes() {
                let definition = self
                    .catalog
                    .get(code)
                    .ok_or_else(|| EngineError::NotFound(format!("title {code}")))?;
                if !is_unlocked(&definition.condition, &stats) {
                    return Err(EngineError::Forbidden(code.clone()));
                }
            }
        }

        self.storage
            .set_showcase(user_id, showcase.primary(), &showcase.to_json())
            .await?;
        info!(user_id, count = showcase.len(), "updated showcase");
        Ok(())
    }
}
