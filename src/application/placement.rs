use crate::application::commands::next_id;
use crate::domain::models::{ActivityTemplate, ScheduleBlock};
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use thiserror::Error;

pub type TodayProvider = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("end must be after start")]
    InvalidRange,
    #[error("the requested interval overlaps an existing block")]
    Conflict,
    #[error("only the current date can be edited")]
    ReadOnlyDay,
    #[error("no drag in progress")]
    NoActiveDrag,
    #[error("no placement awaiting confirmation")]
    NoPendingPlacement,
    #[error("unknown block: {0}")]
    UnknownBlock(String),
}

/// What is being dragged: an activity template (creation intent) or an
/// existing block (move intent). Exactly one at a time, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragIntent {
    Create(ActivityTemplate),
    Move(ScheduleBlock),
}

impl DragIntent {
    fn provisional_duration(&self) -> u32 {
        match self {
            DragIntent::Create(template) => template.default_duration,
            DragIntent::Move(block) => block.duration,
        }
    }

    fn moved_block_id(&self) -> Option<&str> {
        match self {
            DragIntent::Create(_) => None,
            DragIntent::Move(block) => Some(&block.id),
        }
    }
}

/// A dropped intent with its provisional window, surfaced for explicit
/// start/end confirmation before anything touches the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPlacement {
    pub intent: DragIntent,
    pub start_time: u32,
    pub end_time: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlacementState {
    #[default]
    Idle,
    Dragging(DragIntent),
    AwaitingConfirmation(PendingPlacement),
}

/// Half-open overlap test over one day's schedule. Touching endpoints do
/// not collide; `exclude` skips the block being moved.
pub fn conflicts(
    schedule: &[ScheduleBlock],
    start_time: u32,
    end_time: u32,
    exclude: Option<&str>,
) -> bool {
    schedule.iter().any(|block| {
        if exclude == Some(block.id.as_str()) {
            return false;
        }
        start_time < block.end_time() && end_time > block.start_time
    })
}

/// Drives the drag -> drop -> confirm workflow against a day's schedule and
/// enforces the no-overlap invariant and the current-date editability gate
/// at every entry point. The schedule itself is owned by the session and
/// passed in; the engine only tracks the in-flight placement attempt.
pub struct PlacementEngine {
    viewed_date: NaiveDate,
    today: TodayProvider,
    state: PlacementState,
}

impl PlacementEngine {
    pub fn new() -> Self {
        let today: TodayProvider = Arc::new(|| Local::now().date_naive());
        Self {
            viewed_date: today(),
            today,
            state: PlacementState::Idle,
        }
    }

    pub fn with_today_provider(mut self, today: TodayProvider) -> Self {
        self.viewed_date = today();
        self.today = today;
        self
    }

    pub fn viewed_date(&self) -> NaiveDate {
        self.viewed_date
    }

    /// Navigating to another date abandons any in-flight placement.
    pub fn set_viewed_date(&mut self, date: NaiveDate) {
        self.viewed_date = date;
        self.state = PlacementState::Idle;
    }

    pub fn is_editable(&self) -> bool {
        self.viewed_date == (self.today)()
    }

    pub fn state(&self) -> &PlacementState {
        &self.state
    }

    pub fn pending(&self) -> Option<&PendingPlacement> {
        match &self.state {
            PlacementState::AwaitingConfirmation(pending) => Some(pending),
            _ => None,
        }
    }

    fn guard_editable(&self) -> Result<(), PlacementError> {
        if self.is_editable() {
            Ok(())
        } else {
            Err(PlacementError::ReadOnlyDay)
        }
    }

    pub fn begin_template_drag(
        &mut self,
        template: &ActivityTemplate,
    ) -> Result<(), PlacementError> {
        self.guard_editable()?;
        self.state = PlacementState::Dragging(DragIntent::Create(template.clone()));
        Ok(())
    }

    pub fn begin_block_drag(&mut self, block: &ScheduleBlock) -> Result<(), PlacementError> {
        self.guard_editable()?;
        self.state = PlacementState::Dragging(DragIntent::Move(block.clone()));
        Ok(())
    }

    /// A drop at a candidate start minute moves the attempt into the
    /// confirmation step with a provisional window derived from the dragged
    /// template's default duration or the dragged block's current duration.
    pub fn drop_at(&mut self, start_time: u32) -> Result<&PendingPlacement, PlacementError> {
        self.guard_editable()?;
        let PlacementState::Dragging(intent) = std::mem::take(&mut self.state) else {
            self.state = PlacementState::Idle;
            return Err(PlacementError::NoActiveDrag);
        };

        let end_time = start_time + intent.provisional_duration();
        self.state = PlacementState::AwaitingConfirmation(PendingPlacement {
            intent,
            start_time,
            end_time,
        });
        match &self.state {
            PlacementState::AwaitingConfirmation(pending) => Ok(pending),
            _ => unreachable!("state was just set"),
        }
    }

    /// Commits the confirmed window. Validation order: range, then the
    /// half-open collision test excluding the moved block. A rejection
    /// leaves both the schedule and the pending placement untouched so the
    /// user can retry with adjusted times.
    pub fn confirm(
        &mut self,
        schedule: &mut Vec<ScheduleBlock>,
        start_time: u32,
        end_time: u32,
    ) -> Result<ScheduleBlock, PlacementError> {
        self.guard_editable()?;
        let pending = match &self.state {
            PlacementState::AwaitingConfirmation(pending) => pending.clone(),
            _ => return Err(PlacementError::NoPendingPlacement),
        };

        if end_time <= start_time {
            return Err(PlacementError::InvalidRange);
        }
        if conflicts(schedule, start_time, end_time, pending.intent.moved_block_id()) {
            return Err(PlacementError::Conflict);
        }

        let duration = end_time - start_time;
        let committed = match pending.intent {
            DragIntent::Create(template) => {
                let block = ScheduleBlock {
                    id: next_id("blk"),
                    activity_id: template.id,
                    start_time,
                    duration,
                    snapshot: None,
                };
                schedule.push(block.clone());
                block
            }
            DragIntent::Move(moved) => {
                let block = schedule
                    .iter_mut()
                    .find(|block| block.id == moved.id)
                    .ok_or_else(|| PlacementError::UnknownBlock(moved.id.clone()))?;
                block.start_time = start_time;
                block.duration = duration;
                block.clone()
            }
        };

        self.state = PlacementState::Idle;
        Ok(committed)
    }

    pub fn cancel(&mut self) {
        self.state = PlacementState::Idle;
    }

    /// Removes a block by id. Guarded like every other entry point; returns
    /// whether anything was removed.
    pub fn delete_block(
        &mut self,
        schedule: &mut Vec<ScheduleBlock>,
        block_id: &str,
    ) -> Result<bool, PlacementError> {
        self.guard_editable()?;
        let before = schedule.len();
        schedule.retain(|block| block.id != block_id);
        Ok(schedule.len() != before)
    }
}

impl Default for PlacementEngine {
    fn default() -> Self {
        Self::new()
    }
}
