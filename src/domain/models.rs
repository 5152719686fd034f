use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    #[serde(rename = "Trabajo/Estudio")]
    WorkStudy,
    #[serde(rename = "Proyecto Personal")]
    Project,
    #[serde(rename = "Salud")]
    Health,
    #[serde(rename = "Obligaciones")]
    Obligation,
    #[serde(rename = "Ocio")]
    Leisure,
}

impl Category {
    /// Fixed enumeration order; the category distribution reports in this order.
    pub const ALL: [Category; 5] = [
        Category::WorkStudy,
        Category::Project,
        Category::Health,
        Category::Obligation,
        Category::Leisure,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::WorkStudy => "Trabajo/Estudio",
            Category::Project => "Proyecto Personal",
            Category::Health => "Salud",
            Category::Obligation => "Obligaciones",
            Category::Leisure => "Ocio",
        }
    }

    pub fn default_color(self) -> &'static str {
        match self {
            Category::WorkStudy => "blue",
            Category::Project => "violet",
            Category::Health => "emerald",
            Category::Obligation => "slate",
            Category::Leisure => "pink",
        }
    }
}

/// A reusable activity definition owned by the session catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTemplate {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub score: i32,
    pub default_duration: u32,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl ActivityTemplate {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "activity.id")?;
        validate_non_empty(&self.name, "activity.name")?;
        if self.default_duration == 0 {
            return Err("activity.default_duration must be > 0".to_string());
        }
        Ok(())
    }
}

/// Frozen copy of a template's display and scoring fields, embedded in a
/// block at save time so historical days survive later catalog edits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySnapshot {
    pub name: String,
    pub category: Category,
    pub color: String,
    pub score: i32,
}

impl ActivitySnapshot {
    pub fn of(template: &ActivityTemplate) -> Self {
        Self {
            name: template.name.clone(),
            category: template.category,
            color: template.color.clone(),
            score: template.score,
        }
    }
}

/// One placed occurrence on a day's timeline. `start_time` is minutes from
/// midnight on the extended axis and may exceed 1440 for past-midnight
/// placements. The occupied interval is half-open:
/// `[start_time, start_time + duration)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBlock {
    pub id: String,
    pub activity_id: String,
    pub start_time: u32,
    pub duration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ActivitySnapshot>,
}

impl ScheduleBlock {
    pub fn end_time(&self) -> u32 {
        self.start_time + self.duration
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "block.id")?;
        if self.duration == 0 {
            return Err("block.duration must be > 0".to_string());
        }
        Ok(())
    }

    /// Resolves the authoritative display data for this block. The snapshot,
    /// when present, takes precedence over a live catalog lookup; `None`
    /// means the block is a stale reference (dangling `activity_id`, no
    /// snapshot) and scores 0.
    pub fn display_source<'a>(
        &'a self,
        catalog: &'a [ActivityTemplate],
    ) -> Option<DisplaySource<'a>> {
        if let Some(snapshot) = &self.snapshot {
            return Some(DisplaySource::Snapshot(snapshot));
        }
        catalog
            .iter()
            .find(|template| template.id == self.activity_id)
            .map(DisplaySource::Live)
    }
}

/// Where a block's display/scoring fields come from: the frozen snapshot
/// for historical accuracy, or the live template for the current day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplaySource<'a> {
    Snapshot(&'a ActivitySnapshot),
    Live(&'a ActivityTemplate),
}

impl<'a> DisplaySource<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            DisplaySource::Snapshot(snapshot) => &snapshot.name,
            DisplaySource::Live(template) => &template.name,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            DisplaySource::Snapshot(snapshot) => snapshot.category,
            DisplaySource::Live(template) => template.category,
        }
    }

    pub fn color(&self) -> &'a str {
        match self {
            DisplaySource::Snapshot(snapshot) => &snapshot.color,
            DisplaySource::Live(template) => &template.color,
        }
    }

    pub fn score(&self) -> i32 {
        match self {
            DisplaySource::Snapshot(snapshot) => snapshot.score,
            DisplaySource::Live(template) => template.score,
        }
    }
}

/// The persisted unit: one day's schedule with snapshots materialized.
/// Each save fully replaces any prior record for the date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayData {
    pub date: String,
    pub blocks: Vec<ScheduleBlock>,
    pub total_score: i32,
    pub total_minutes: u32,
}

/// Month index entry: per-date load summary for calendar rendering without
/// deserializing the full day record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayMeta {
    pub minutes: u32,
    pub score: i32,
    pub has_data: bool,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
