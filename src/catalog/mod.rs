mod builtin;

use crate::error::{EngineError, Result};
use anyhow::Context as _;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// ─── Static vocabulary ───────────────────────────────────────────────────────

/// Thematic grouping of a title. Cosmetic, used only for page layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleCategory {
    Volume,
    Diversity,
    Consistency,
    Depth,
    Social,
    Special,
}

/// Rarity tier. Cosmetic, never consulted by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleGrade {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

/// Keys of the per-user statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKey {
    ContentCount,
    RecordCount,
    CategoryCount,
    CreatorCount,
    CompletedCount,
    AvgReviewLength,
    LongReviewCount,
}

impl StatKey {
    pub const ALL: [StatKey; 7] = [
        StatKey::ContentCount,
        StatKey::RecordCount,
        StatKey::CategoryCount,
        StatKey::CreatorCount,
        StatKey::CompletedCount,
        StatKey::AvgReviewLength,
        StatKey::LongReviewCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatKey::ContentCount => "content_count",
            StatKey::RecordCount => "record_count",
            StatKey::CategoryCount => "category_count",
            StatKey::CreatorCount => "creator_count",
            StatKey::CompletedCount => "completed_count",
            StatKey::AvgReviewLength => "avg_review_length",
            StatKey::LongReviewCount => "long_review_count",
        }
    }
}

/// Unlock predicate: `stats[stat] >= threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub stat: StatKey,
    pub threshold: f64,
}

/// One row of the title table. Static data, never mutated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleDefinition {
    pub code: String,
    pub name: String,
    pub description: String,
    pub category: TitleCategory,
    pub grade: TitleGrade,
    pub condition: Condition,
    pub bonus_score: i64,
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// Immutable registry of title definitions, keyed by code.
///
/// Built once at startup and shared read-only across all requests; lookups
/// of unknown codes return `None` and the caller decides how to react.
#[derive(Debug)]
pub struct TitleCatalog {
    titles: Vec<TitleDefinition>,
    index: HashMap<String, usize>,
}

impl TitleCatalog {
    pub fn from_definitions(titles: Vec<TitleDefinition>) -> Result<Self> {
        let mut index = HashMap::with_capacity(titles.len());
        for (i, title) in titles.iter().enumerate() {
            if index.insert(title.code.clone(), i).is_some() {
                return Err(EngineError::Validation(format!(
                    "duplicate title code {}",
                    title.code
                )));
            }
        }
        Ok(Self { titles, index })
    }

    /// Parse a `[[titles]]` TOML overlay, for deployments that ship their
    /// own catalog file instead of the builtin table.
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        #[derive(Deserialize)]
        struct CatalogFile {
            titles: Vec<TitleDefinition>,
        }
        let file: CatalogFile = toml::from_str(raw).context("Parsing title catalog")?;
        Self::from_definitions(file.titles).map_err(|e| anyhow::anyhow!(e))
    }

    /// The process-wide builtin catalog.
    pub fn builtin() -> Arc<TitleCatalog> {
        static BUILTIN: Lazy<Arc<TitleCatalog>> = Lazy::new(|| {
            // The builtin table is checked for duplicate codes by a unit
            // test, so this cannot fail outside of a bad edit.
            Arc::new(
                TitleCatalog::from_definitions(builtin::definitions())
                    .expect("builtin catalog has duplicate codes"),
            )
        });
        Arc::clone(&BUILTIN)
    }

    pub fn get(&self, code: &str) -> Option<&TitleDefinition> {
        self.index.get(code).map(|&i| &self.titles[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TitleDefinition> {
        self.titles.iter()
    }

    pub fn by_category(&self, category: TitleCategory) -> impl Iterator<Item = &TitleDefinition> {
        self.titles.iter().filter(move |t| t.category == category)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}
