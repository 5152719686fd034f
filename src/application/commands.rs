use crate::application::analysis::{build_prompt, AnalysisService, AnalysisSlot};
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::placement::{DragIntent, PlacementEngine, TodayProvider};
use crate::domain::models::{ActivityTemplate, Category, DayMeta, ScheduleBlock};
use crate::domain::stats;
use crate::domain::timeline::DayWindow;
use crate::infrastructure::config::{read_assistant_model, read_day_window};
use crate::infrastructure::credential_store::{CredentialStore, KeyringCredentialStore};
use crate::infrastructure::day_store::{DayStoreRepository, SqliteDayStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::text_client::{ReqwestTextGenerationClient, TextGenerationClient};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

const DATE_FORMAT: &str = "%Y-%m-%d";
const API_KEY_ENV: &str = "GEMINI_API_KEY";
const DEFAULT_ACTIVITY_SCORE: i32 = 5;
const DEFAULT_ACTIVITY_ICON: &str = "Star";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

/// Session state: the activity catalog and the viewed day's schedule live
/// behind one mutex and are mutated only through the guarded command
/// functions below. Collaborators (day store, credential store, text
/// client) are injected so the session is testable without its adapters.
pub struct AppState {
    config_dir: PathBuf,
    logs_dir: PathBuf,
    window: DayWindow,
    model: String,
    day_store: Arc<dyn DayStoreRepository>,
    credential_store: Arc<dyn CredentialStore>,
    text_client: Arc<dyn TextGenerationClient>,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");
        let window = read_day_window(&config_dir)?;
        let model = read_assistant_model(&config_dir)?;

        let state = Self {
            config_dir,
            logs_dir,
            window,
            model,
            day_store: Arc::new(SqliteDayStore::new(&bootstrap.database_path)),
            credential_store: Arc::new(KeyringCredentialStore::default()),
            text_client: Arc::new(ReqwestTextGenerationClient::new()),
            runtime: Mutex::new(RuntimeState::default()),
            log_guard: Mutex::new(()),
        };
        state.reload_viewed_day()?;
        Ok(state)
    }

    pub fn with_day_store(mut self, day_store: Arc<dyn DayStoreRepository>) -> Self {
        self.day_store = day_store;
        self
    }

    pub fn with_credential_store(mut self, credential_store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = credential_store;
        self
    }

    pub fn with_text_client(mut self, text_client: Arc<dyn TextGenerationClient>) -> Self {
        self.text_client = text_client;
        self
    }

    pub fn with_today_provider(self, today: TodayProvider) -> Self {
        if let Ok(mut runtime) = self.runtime.lock() {
            runtime.engine = PlacementEngine::new().with_today_provider(today);
        }
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn window(&self) -> DayWindow {
        self.window
    }

    fn reload_viewed_day(&self) -> Result<(), InfraError> {
        let mut runtime = lock_runtime(self)?;
        let date = runtime.engine.viewed_date().format(DATE_FORMAT).to_string();
        runtime.schedule = self
            .day_store
            .load(&date)?
            .map(|data| data.blocks)
            .unwrap_or_default();
        Ok(())
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Default)]
struct RuntimeState {
    activities: Vec<ActivityTemplate>,
    schedule: Vec<ScheduleBlock>,
    selected_block_id: Option<String>,
    engine: PlacementEngine,
    analysis: AnalysisSlot,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayViewResponse {
    pub date: String,
    pub editable: bool,
    pub blocks: Vec<ScheduleBlock>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingPlacementResponse {
    pub start_time: String,
    pub end_time: String,
    pub is_move: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySliceResponse {
    pub name: String,
    pub minutes: u32,
    pub color: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayStatsResponse {
    pub total_score: i32,
    pub total_minutes: u32,
    pub total_hours: f64,
    pub category_distribution: Vec<CategorySliceResponse>,
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("runtime lock poisoned: {error}")))
}

fn day_view(runtime: &RuntimeState) -> DayViewResponse {
    DayViewResponse {
        date: runtime.engine.viewed_date().format(DATE_FORMAT).to_string(),
        editable: runtime.engine.is_editable(),
        blocks: runtime.schedule.clone(),
    }
}

/// Auto-save: every accepted mutation of the current day is pushed through
/// the day store. A persistence failure is logged and never fails the
/// command; the in-memory schedule stays authoritative for the session.
fn persist_viewed_day(state: &AppState, runtime: &RuntimeState) {
    if !runtime.engine.is_editable() {
        return;
    }
    let date = runtime.engine.viewed_date().format(DATE_FORMAT).to_string();
    match state
        .day_store
        .save(&date, &runtime.schedule, &runtime.activities)
    {
        Ok(data) => state.log_info(
            "save_day",
            &format!("persisted {} blocks for {date}", data.blocks.len()),
        ),
        Err(error) => state.log_error("save_day", &format!("failed to persist {date}: {error}")),
    }
}

fn parse_date(text: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
        .map_err(|error| InfraError::InvalidConfig(format!("date must be YYYY-MM-DD: {error}")))
}

fn parse_clock(window: &DayWindow, text: &str, field: &str) -> Result<u32, InfraError> {
    window
        .time_to_minutes(text)
        .ok_or_else(|| InfraError::InvalidConfig(format!("{field} must be HH:MM: {text}")))
}

pub fn create_activity_impl(
    state: &AppState,
    name: String,
    category: Category,
    default_duration: u32,
) -> Result<ActivityTemplate, InfraError> {
    let template = ActivityTemplate {
        id: next_id("act"),
        name: name.trim().to_string(),
        category,
        score: DEFAULT_ACTIVITY_SCORE,
        default_duration,
        color: category.default_color().to_string(),
        icon: Some(DEFAULT_ACTIVITY_ICON.to_string()),
    };
    template.validate().map_err(InfraError::InvalidConfig)?;

    let mut runtime = lock_runtime(state)?;
    runtime.activities.push(template.clone());
    // Catalog growth refreshes the current day's snapshots on disk.
    persist_viewed_day(state, &runtime);
    Ok(template)
}

pub fn list_activities_impl(state: &AppState) -> Result<Vec<ActivityTemplate>, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(runtime.activities.clone())
}

/// Navigates the viewed day: loads the persisted record (or an empty
/// schedule), resets selection and any stored analysis, and moves the
/// engine's editability gate to the new date.
pub fn select_date_impl(state: &AppState, date: String) -> Result<DayViewResponse, InfraError> {
    let date = parse_date(&date)?;
    let mut runtime = lock_runtime(state)?;
    runtime.engine.set_viewed_date(date);
    runtime.selected_block_id = None;
    runtime.analysis = AnalysisSlot::Idle;

    let key = date.format(DATE_FORMAT).to_string();
    runtime.schedule = state
        .day_store
        .load(&key)?
        .map(|data| data.blocks)
        .unwrap_or_default();
    Ok(day_view(&runtime))
}

pub fn current_day_impl(state: &AppState) -> Result<DayViewResponse, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(day_view(&runtime))
}

pub fn begin_template_drag_impl(state: &AppState, activity_id: String) -> Result<(), InfraError> {
    let mut runtime = lock_runtime(state)?;
    let template = runtime
        .activities
        .iter()
        .find(|template| template.id == activity_id)
        .cloned()
        .ok_or_else(|| InfraError::InvalidConfig(format!("unknown activity: {activity_id}")))?;
    runtime.engine.begin_template_drag(&template)?;
    Ok(())
}

pub fn begin_block_drag_impl(state: &AppState, block_id: String) -> Result<(), InfraError> {
    let mut runtime = lock_runtime(state)?;
    let block = runtime
        .schedule
        .iter()
        .find(|block| block.id == block_id)
        .cloned()
        .ok_or_else(|| InfraError::InvalidConfig(format!("unknown block: {block_id}")))?;
    runtime.engine.begin_block_drag(&block)?;
    Ok(())
}

pub fn drop_block_impl(
    state: &AppState,
    start_time: u32,
) -> Result<PendingPlacementResponse, InfraError> {
    let mut runtime = lock_runtime(state)?;
    let pending = runtime.engine.drop_at(start_time)?;
    Ok(PendingPlacementResponse {
        start_time: state.window.minutes_to_time(pending.start_time),
        end_time: state.window.minutes_to_time(pending.end_time),
        is_move: matches!(pending.intent, DragIntent::Move(_)),
    })
}

pub fn confirm_placement_impl(
    state: &AppState,
    start: String,
    end: String,
) -> Result<ScheduleBlock, InfraError> {
    let start_minutes = parse_clock(&state.window, &start, "start")?;
    let end_minutes = parse_clock(&state.window, &end, "end")?;

    let mut runtime = lock_runtime(state)?;
    let runtime = &mut *runtime;
    let block = runtime
        .engine
        .confirm(&mut runtime.schedule, start_minutes, end_minutes)?;
    persist_viewed_day(state, runtime);
    state.log_info(
        "confirm_placement",
        &format!(
            "committed block {} at [{}, {})",
            block.id,
            block.start_time,
            block.end_time()
        ),
    );
    Ok(block)
}

pub fn cancel_placement_impl(state: &AppState) -> Result<(), InfraError> {
    let mut runtime = lock_runtime(state)?;
    runtime.engine.cancel();
    Ok(())
}

pub fn delete_block_impl(state: &AppState, block_id: String) -> Result<bool, InfraError> {
    let mut runtime = lock_runtime(state)?;
    let runtime = &mut *runtime;
    let removed = runtime.engine.delete_block(&mut runtime.schedule, &block_id)?;
    if runtime.selected_block_id.as_deref() == Some(block_id.as_str()) {
        runtime.selected_block_id = None;
    }
    if removed {
        persist_viewed_day(state, runtime);
    }
    Ok(removed)
}

/// Selecting the already-selected block deselects it.
pub fn select_block_impl(
    state: &AppState,
    block_id: Option<String>,
) -> Result<Option<String>, InfraError> {
    let mut runtime = lock_runtime(state)?;
    let next = match block_id {
        None => None,
        Some(id) => {
            if !runtime.schedule.iter().any(|block| block.id == id) {
                return Err(InfraError::InvalidConfig(format!("unknown block: {id}")));
            }
            if runtime.selected_block_id.as_deref() == Some(id.as_str()) {
                None
            } else {
                Some(id)
            }
        }
    };
    runtime.selected_block_id = next.clone();
    Ok(next)
}

pub fn day_stats_impl(state: &AppState) -> Result<DayStatsResponse, InfraError> {
    let runtime = lock_runtime(state)?;
    let total_score = stats::total_score(&runtime.schedule, &runtime.activities);
    let total_minutes = stats::total_minutes(&runtime.schedule);
    let category_distribution = stats::category_distribution(&runtime.schedule, &runtime.activities)
        .into_iter()
        .map(|slice| CategorySliceResponse {
            name: slice.category.label().to_string(),
            minutes: slice.minutes,
            color: slice.category.default_color().to_string(),
        })
        .collect();

    Ok(DayStatsResponse {
        total_score,
        total_minutes,
        total_hours: f64::from(total_minutes) / 60.0,
        category_distribution,
    })
}

pub fn day_meta_impl(state: &AppState, date: String) -> Result<Option<DayMeta>, InfraError> {
    let date = parse_date(&date)?;
    state
        .day_store
        .day_meta(&date.format(DATE_FORMAT).to_string())
}

pub fn rebuild_index_impl(state: &AppState) -> Result<usize, InfraError> {
    let count = state.day_store.rebuild_index()?;
    state.log_info("rebuild_index", &format!("reindexed {count} day records"));
    Ok(count)
}

pub fn analysis_state_impl(state: &AppState) -> Result<AnalysisSlot, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(runtime.analysis.clone())
}

fn resolve_api_key(state: &AppState) -> Option<String> {
    if let Ok(value) = std::env::var(API_KEY_ENV) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    state.credential_store.load_key().ok().flatten()
}

/// Relays the viewed day to the text-generation service. Holds the single
/// request slot while the call is in flight; a second trigger fails fast
/// as busy. The returned text is always a usable user-facing string, a
/// fixed fallback included.
pub async fn analyze_day_impl(state: &AppState) -> Result<String, InfraError> {
    let prompt = {
        let mut runtime = lock_runtime(state)?;
        if runtime.analysis == AnalysisSlot::Pending {
            return Err(InfraError::AnalysisBusy);
        }
        let total_score = stats::total_score(&runtime.schedule, &runtime.activities);
        let prompt = build_prompt(&runtime.schedule, &runtime.activities, total_score);
        runtime.analysis = AnalysisSlot::Pending;
        prompt
    };

    let api_key = resolve_api_key(state);
    let service = AnalysisService::new(Arc::clone(&state.text_client), state.model.clone());
    let feedback = service.analyze(api_key.as_deref(), &prompt).await;

    let mut runtime = lock_runtime(state)?;
    runtime.analysis = AnalysisSlot::Ready(feedback.clone());
    Ok(feedback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use crate::infrastructure::day_store::InMemoryDayStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct SlowStubClient;

    #[async_trait]
    impl TextGenerationClient for SlowStubClient {
        async fn generate(
            &self,
            _api_key: &str,
            _model: &str,
            _prompt: &str,
        ) -> Result<Option<String>, InfraError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Some("Buen plan.".to_string()))
        }
    }

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 27).expect("valid date")
    }

    fn temp_root(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "jornada-commands-{label}-{}-{}",
            std::process::id(),
            Utc::now().timestamp_micros()
        ))
    }

    fn test_state(label: &str) -> AppState {
        AppState::new(temp_root(label))
            .expect("initialize app state")
            .with_day_store(Arc::new(InMemoryDayStore::default()))
            .with_credential_store(Arc::new(InMemoryCredentialStore::default()))
            .with_text_client(Arc::new(SlowStubClient))
            .with_today_provider(Arc::new(fixed_today))
    }

    fn place_deep_work(state: &AppState, start: &str, end: &str) -> Result<ScheduleBlock, InfraError> {
        let activity = create_activity_impl(
            state,
            "Deep Work".to_string(),
            Category::WorkStudy,
            60,
        )?;
        begin_template_drag_impl(state, activity.id)?;
        drop_block_impl(state, 540)?;
        confirm_placement_impl(state, start.to_string(), end.to_string())
    }

    #[test]
    fn created_activities_carry_the_session_defaults() {
        let state = test_state("defaults");
        let activity =
            create_activity_impl(&state, "Leer".to_string(), Category::Leisure, 45).expect("create");

        assert_eq!(activity.score, 5);
        assert_eq!(activity.color, "pink");
        assert_eq!(activity.icon.as_deref(), Some("Star"));
        assert_eq!(list_activities_impl(&state).expect("list").len(), 1);
    }

    #[test]
    fn placement_scenario_yields_expected_stats() {
        let state = test_state("scenario");
        let block = place_deep_work(&state, "09:00", "10:30").expect("place");
        assert_eq!(block.start_time, 540);
        assert_eq!(block.duration, 90);

        let stats = day_stats_impl(&state).expect("stats");
        assert_eq!(stats.total_score, 5);
        assert_eq!(stats.total_minutes, 90);
        assert!((stats.total_hours - 1.5).abs() < f64::EPSILON);
        assert_eq!(stats.category_distribution.len(), 1);
        assert_eq!(stats.category_distribution[0].name, "Trabajo/Estudio");
        assert_eq!(stats.category_distribution[0].minutes, 90);
    }

    #[test]
    fn overlapping_placement_is_rejected_and_schedule_unchanged() {
        let state = test_state("overlap");
        place_deep_work(&state, "09:00", "10:30").expect("first placement");

        let second = place_deep_work(&state, "09:30", "10:00");
        assert!(matches!(second, Err(InfraError::Placement(_))));
        assert_eq!(current_day_impl(&state).expect("view").blocks.len(), 1);
    }

    #[test]
    fn moving_a_block_keeps_its_identity_and_score() {
        let state = test_state("move");
        let placed = place_deep_work(&state, "09:00", "10:30").expect("place");

        begin_block_drag_impl(&state, placed.id.clone()).expect("drag block");
        let pending = drop_block_impl(&state, 660).expect("drop");
        assert!(pending.is_move);

        let moved = confirm_placement_impl(&state, "11:00".to_string(), "12:00".to_string())
            .expect("confirm move");
        assert_eq!(moved.id, placed.id);
        assert_eq!(moved.start_time, 660);
        assert_eq!(moved.duration, 60);
        assert_eq!(day_stats_impl(&state).expect("stats").total_score, 5);
    }

    #[test]
    fn accepted_mutations_keep_the_month_index_current() {
        let state = test_state("index");
        let placed = place_deep_work(&state, "09:00", "10:30").expect("place");

        let meta = day_meta_impl(&state, "2026-08-27".to_string())
            .expect("meta")
            .expect("present");
        assert_eq!(meta.minutes, 90);
        assert_eq!(meta.score, 5);
        assert!(meta.has_data);

        delete_block_impl(&state, placed.id).expect("delete");
        let cleared = day_meta_impl(&state, "2026-08-27".to_string())
            .expect("meta")
            .expect("present");
        assert_eq!(cleared.minutes, 0);
        assert!(!cleared.has_data);
    }

    #[test]
    fn malformed_times_are_rejected_before_the_engine_runs() {
        let state = test_state("badtime");
        let activity =
            create_activity_impl(&state, "Deep Work".to_string(), Category::WorkStudy, 60)
                .expect("create");
        begin_template_drag_impl(&state, activity.id).expect("drag");
        drop_block_impl(&state, 540).expect("drop");

        let result = confirm_placement_impl(&state, "9am".to_string(), "10:00".to_string());
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
        assert!(current_day_impl(&state).expect("view").blocks.is_empty());
    }

    #[test]
    fn non_current_dates_are_read_only_end_to_end() {
        let yesterday = NaiveDate::from_ymd_opt(2026, 8, 26).expect("valid date");
        let state = test_state("readonly").with_today_provider(Arc::new(move || yesterday));

        // Seed a record while that date is the current one.
        let placed = place_deep_work(&state, "09:00", "10:30").expect("place");

        // The clock moves on; the same date becomes history.
        let state = state.with_today_provider(Arc::new(fixed_today));
        let view = select_date_impl(&state, "2026-08-26".to_string()).expect("select");
        assert!(!view.editable);
        assert_eq!(view.blocks.len(), 1);

        assert!(matches!(
            begin_block_drag_impl(&state, placed.id.clone()),
            Err(InfraError::Placement(_))
        ));
        assert!(matches!(
            delete_block_impl(&state, placed.id),
            Err(InfraError::Placement(_))
        ));

        // The persisted record is untouched.
        let reloaded = select_date_impl(&state, "2026-08-26".to_string()).expect("reselect");
        assert_eq!(reloaded.blocks.len(), 1);
        let meta = day_meta_impl(&state, "2026-08-26".to_string())
            .expect("meta")
            .expect("present");
        assert_eq!(meta.minutes, 90);
    }

    #[test]
    fn reloading_a_saved_day_surfaces_materialized_snapshots() {
        let state = test_state("snapshots");
        place_deep_work(&state, "09:00", "10:30").expect("place");

        select_date_impl(&state, "2026-08-01".to_string()).expect("away");
        let view = select_date_impl(&state, "2026-08-27".to_string()).expect("back");
        let snapshot = view.blocks[0].snapshot.as_ref().expect("snapshot");
        assert_eq!(snapshot.name, "Deep Work");
        assert_eq!(snapshot.score, 5);
    }

    #[test]
    fn selecting_the_selected_block_toggles_it_off() {
        let state = test_state("selection");
        let placed = place_deep_work(&state, "09:00", "10:30").expect("place");

        let selected = select_block_impl(&state, Some(placed.id.clone())).expect("select");
        assert_eq!(selected.as_deref(), Some(placed.id.as_str()));
        let toggled = select_block_impl(&state, Some(placed.id)).expect("toggle");
        assert_eq!(toggled, None);
    }

    #[test]
    fn rebuild_index_counts_persisted_days() {
        let state = test_state("rebuild");
        place_deep_work(&state, "09:00", "10:30").expect("place");
        assert_eq!(rebuild_index_impl(&state).expect("rebuild"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_second_analysis_trigger_is_rejected_while_one_is_in_flight() {
        std::env::remove_var(API_KEY_ENV);
        let state = test_state("busy")
            .with_credential_store(Arc::new(InMemoryCredentialStore::with_key("test-key")));
        place_deep_work(&state, "09:00", "10:30").expect("place");

        let first = analyze_day_impl(&state);
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            analyze_day_impl(&state).await
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.expect("first analysis"), "Buen plan.");
        assert!(matches!(second, Err(InfraError::AnalysisBusy)));
        assert_eq!(
            analysis_state_impl(&state).expect("slot"),
            AnalysisSlot::Ready("Buen plan.".to_string())
        );
    }

    #[tokio::test]
    async fn analysis_without_credentials_degrades_to_the_fixed_message() {
        std::env::remove_var(API_KEY_ENV);
        let state = test_state("nokey");

        let feedback = analyze_day_impl(&state).await.expect("analysis");
        assert_eq!(feedback, crate::application::analysis::MISSING_KEY_MESSAGE);
    }
}
