use crate::catalog::Condition;
use crate::stats::StatsSnapshot;

/// Whether `stats` satisfies `condition`.
///
/// This is the whole unlock rule: `stats[stat] >= threshold`, with missing
/// keys reading as 0. Total and pure. Both the achievement-page view and
/// the selection guard call this same function, so the displayed badge and
/// the eligibility check can never disagree.
pub fn is_unlocked(condition: &Condition, stats: &StatsSnapshot) -> bool {
    stats.get(condition.stat) >= condition.threshold
}
