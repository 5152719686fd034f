use crate::domain::models::{ActivityTemplate, Category, ScheduleBlock};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategorySlice {
    pub category: Category,
    pub minutes: u32,
}

/// Sum of block scores, snapshot-preferring. Stale references count as 0.
pub fn total_score(blocks: &[ScheduleBlock], catalog: &[ActivityTemplate]) -> i32 {
    blocks
        .iter()
        .map(|block| {
            block
                .display_source(catalog)
                .map(|source| source.score())
                .unwrap_or(0)
        })
        .sum()
}

pub fn total_minutes(blocks: &[ScheduleBlock]) -> u32 {
    blocks.iter().map(|block| block.duration).sum()
}

/// Scheduled minutes grouped by category, in the fixed enumeration order,
/// omitting categories with no time. Stale references contribute nothing.
pub fn category_distribution(
    blocks: &[ScheduleBlock],
    catalog: &[ActivityTemplate],
) -> Vec<CategorySlice> {
    let mut minutes_by_category: HashMap<Category, u32> = HashMap::new();
    for block in blocks {
        if let Some(source) = block.display_source(catalog) {
            *minutes_by_category.entry(source.category()).or_default() += block.duration;
        }
    }

    Category::ALL
        .into_iter()
        .filter_map(|category| {
            let minutes = minutes_by_category.get(&category).copied()?;
            (minutes > 0).then_some(CategorySlice { category, minutes })
        })
        .collect()
}
