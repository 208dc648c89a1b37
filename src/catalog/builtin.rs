//! The builtin title table.
//!
//! Titles are plain data: a code, a predicate over the stats snapshot, and
//! display text. Evaluation never dispatches on the title itself.

use super::{Condition, StatKey, TitleCategory, TitleDefinition, TitleGrade};

fn title(
    code: &str,
    name: &str,
    description: &str,
    category: TitleCategory,
    grade: TitleGrade,
    stat: StatKey,
    threshold: f64,
    bonus_score: i64,
) -> TitleDefinition {
    TitleDefinition {
        code: code.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        category,
        grade,
        condition: Condition { stat, threshold },
        bonus_score,
    }
}

pub(super) fn definitions() -> Vec<TitleDefinition> {
    use StatKey::*;
    use TitleCategory::*;
    use TitleGrade::*;

    vec![
        // Volume: raw logging output.
        title("FIRST_STEPS", "First Steps", "Log your first item", Volume, Common, ContentCount, 1.0, 5),
        title("TEN_STEPS", "Ten Steps", "Log ten items", Volume, Common, ContentCount, 10.0, 10),
        title("COLLECTOR", "Collector", "Log fifty items", Volume, Uncommon, ContentCount, 50.0, 25),
        title("ARCHIVIST", "Archivist", "Log one hundred items", Volume, Rare, ContentCount, 100.0, 50),
        title("CURATOR", "Curator", "Log two hundred fifty items", Volume, Epic, ContentCount, 250.0, 100),
        title("THOUSAND_SHELVES", "Thousand Shelves", "Log one thousand items", Volume, Legendary, ContentCount, 1000.0, 250),
        // Diversity: breadth across categories and creators.
        title("GENRE_HOPPER", "Genre Hopper", "Touch three categories", Diversity, Common, CategoryCount, 3.0, 10),
        title("EXPLORER", "Explorer", "Touch eight categories", Diversity, Uncommon, CategoryCount, 8.0, 25),
        title("OMNIVORE", "Omnivore", "Touch fifteen categories", Diversity, Rare, CategoryCount, 15.0, 50),
        title("NAME_DROPPER", "Name Dropper", "Log works by ten creators", Diversity, Common, CreatorCount, 10.0, 10),
        title("CONNOISSEUR", "Connoisseur", "Log works by fifty creators", Diversity, Rare, CreatorCount, 50.0, 50),
        // Consistency: seeing things through.
        title("FINISHER", "Finisher", "Complete ten items", Consistency, Common, CompletedCount, 10.0, 10),
        title("CLOSER", "Closer", "Complete fifty items", Consistency, Uncommon, CompletedCount, 50.0, 25),
        title("COMPLETIONIST", "Completionist", "Complete two hundred items", Consistency, Legendary, CompletedCount, 200.0, 150),
        // Depth: substantial reviews.
        title("CRITIC", "Critic", "Write five long reviews", Depth, Uncommon, LongReviewCount, 5.0, 25),
        title("ESSAYIST", "Essayist", "Average four hundred characters per review", Depth, Rare, AvgReviewLength, 400.0, 50),
        title("WORDSMITH", "Wordsmith", "Write twenty-five long reviews", Depth, Epic, LongReviewCount, 25.0, 100),
        // Social: the public journal.
        title("DIARIST", "Diarist", "Post ten journal records", Social, Common, RecordCount, 10.0, 10),
        title("CHRONICLER", "Chronicler", "Post one hundred journal records", Social, Rare, RecordCount, 100.0, 50),
        // Special.
        title("WELCOME", "Welcome", "Join the community", Special, Common, ContentCount, 0.0, 0),
        title("MYTHIC_ARCHIVE", "Mythic Archive", "Log twenty-five hundred items", Special, Legendary, ContentCount, 2500.0, 500),
    ]
}
