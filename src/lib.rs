//! Day-planning core: an activity catalog, a drag-and-confirm placement
//! engine over an extended 24-hour timeline, per-day persistence with
//! frozen activity snapshots and a derived month index, and an optional
//! text-generation critique of the planned day.
//!
//! The crate is layered the usual way: `domain` holds the pure types and
//! arithmetic, `application` drives workflows over session state, and
//! `infrastructure` owns the adapters (SQLite store, OS keyring, HTTP
//! client, config files).

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::analysis::AnalysisSlot;
pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::commands::AppState;
pub use application::placement::{PlacementEngine, PlacementError};
pub use domain::models::{
    ActivitySnapshot, ActivityTemplate, Category, DayData, DayMeta, ScheduleBlock,
};
pub use domain::timeline::DayWindow;
pub use infrastructure::error::InfraError;
