use crate::domain::models::{
    ActivitySnapshot, ActivityTemplate, DayData, DayMeta, ScheduleBlock,
};
use crate::infrastructure::error::InfraError;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const DAY_KEY_PREFIX: &str = "planner_day_";
const INDEX_KEY: &str = "planner_index";

type MonthIndex = BTreeMap<String, DayMeta>;

pub fn day_key(date: &str) -> String {
    format!("{DAY_KEY_PREFIX}{date}")
}

/// Persistence boundary for day records and the derived month index. Every
/// `save` fully replaces the record for its date and rewrites the index
/// entry; the index is a rebuildable materialized view over the records.
pub trait DayStoreRepository: Send + Sync {
    fn save(
        &self,
        date: &str,
        blocks: &[ScheduleBlock],
        catalog: &[ActivityTemplate],
    ) -> Result<DayData, InfraError>;
    fn load(&self, date: &str) -> Result<Option<DayData>, InfraError>;
    fn day_meta(&self, date: &str) -> Result<Option<DayMeta>, InfraError>;
    fn rebuild_index(&self) -> Result<usize, InfraError>;
}

/// Freezes current template data onto every resolvable block and computes
/// the day's totals from the hydrated result. A block whose `activity_id`
/// no longer resolves keeps whatever snapshot it already carries; one with
/// neither scores 0 but is retained.
pub fn hydrate_day(
    date: &str,
    blocks: &[ScheduleBlock],
    catalog: &[ActivityTemplate],
) -> DayData {
    let blocks: Vec<ScheduleBlock> = blocks
        .iter()
        .map(|block| {
            let snapshot = catalog
                .iter()
                .find(|template| template.id == block.activity_id)
                .map(ActivitySnapshot::of)
                .or_else(|| block.snapshot.clone());
            ScheduleBlock {
                snapshot,
                ..block.clone()
            }
        })
        .collect();

    let total_score = blocks
        .iter()
        .map(|block| block.snapshot.as_ref().map(|snapshot| snapshot.score).unwrap_or(0))
        .sum();
    let total_minutes = blocks.iter().map(|block| block.duration).sum();

    DayData {
        date: date.to_string(),
        blocks,
        total_score,
        total_minutes,
    }
}

fn meta_of(data: &DayData) -> DayMeta {
    DayMeta {
        minutes: data.total_minutes,
        score: data.total_score,
        has_data: data.total_minutes > 0,
    }
}

#[derive(Debug, Clone)]
pub struct SqliteDayStore {
    db_path: PathBuf,
}

impl SqliteDayStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn read_value(connection: &Connection, key: &str) -> Result<Option<String>, InfraError> {
        let value: Option<String> = connection
            .query_row(
                "SELECT value FROM planner_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write_value(connection: &Connection, key: &str, value: &str) -> Result<(), InfraError> {
        connection.execute(
            "INSERT INTO planner_store (key, value)
             VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn read_index(connection: &Connection) -> Result<MonthIndex, InfraError> {
        match Self::read_value(connection, INDEX_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(MonthIndex::new()),
        }
    }
}

impl DayStoreRepository for SqliteDayStore {
    fn save(
        &self,
        date: &str,
        blocks: &[ScheduleBlock],
        catalog: &[ActivityTemplate],
    ) -> Result<DayData, InfraError> {
        let data = hydrate_day(date, blocks, catalog);
        let connection = self.connect()?;

        // Two writes, no transaction: the index is recoverable through
        // rebuild_index if the second write never lands.
        Self::write_value(&connection, &day_key(date), &serde_json::to_string(&data)?)?;

        let mut index = Self::read_index(&connection)?;
        index.insert(date.to_string(), meta_of(&data));
        Self::write_value(&connection, INDEX_KEY, &serde_json::to_string(&index)?)?;

        Ok(data)
    }

    fn load(&self, date: &str) -> Result<Option<DayData>, InfraError> {
        let connection = self.connect()?;
        match Self::read_value(&connection, &day_key(date))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn day_meta(&self, date: &str) -> Result<Option<DayMeta>, InfraError> {
        let connection = self.connect()?;
        let index = Self::read_index(&connection)?;
        Ok(index.get(date).cloned())
    }

    fn rebuild_index(&self) -> Result<usize, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT value FROM planner_store WHERE key LIKE ?1",
        )?;
        let rows = statement.query_map(params![format!("{DAY_KEY_PREFIX}%")], |row| {
            row.get::<_, String>(0)
        })?;

        let mut index = MonthIndex::new();
        for raw in rows {
            let data: DayData = serde_json::from_str(&raw?)?;
            index.insert(data.date.clone(), meta_of(&data));
        }

        let count = index.len();
        Self::write_value(&connection, INDEX_KEY, &serde_json::to_string(&index)?)?;
        Ok(count)
    }
}

/// Test double keeping the same opaque-blob contract in a map of
/// serialized values.
#[derive(Debug, Default)]
pub struct InMemoryDayStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryDayStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, InfraError> {
        self.entries
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("day store lock poisoned: {error}")))
    }
}

impl DayStoreRepository for InMemoryDayStore {
    fn save(
        &self,
        date: &str,
        blocks: &[ScheduleBlock],
        catalog: &[ActivityTemplate],
    ) -> Result<DayData, InfraError> {
        let data = hydrate_day(date, blocks, catalog);
        let mut entries = self.lock()?;
        entries.insert(day_key(date), serde_json::to_string(&data)?);

        let mut index: MonthIndex = match entries.get(INDEX_KEY) {
            Some(raw) => serde_json::from_str(raw)?,
            None => MonthIndex::new(),
        };
        index.insert(date.to_string(), meta_of(&data));
        entries.insert(INDEX_KEY.to_string(), serde_json::to_string(&index)?);

        Ok(data)
    }

    fn load(&self, date: &str) -> Result<Option<DayData>, InfraError> {
        let entries = self.lock()?;
        match entries.get(&day_key(date)) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn day_meta(&self, date: &str) -> Result<Option<DayMeta>, InfraError> {
        let entries = self.lock()?;
        let index: MonthIndex = match entries.get(INDEX_KEY) {
            Some(raw) => serde_json::from_str(raw)?,
            None => return Ok(None),
        };
        Ok(index.get(date).cloned())
    }

    fn rebuild_index(&self) -> Result<usize, InfraError> {
        let mut entries = self.lock()?;
        let mut index = MonthIndex::new();
        for (key, raw) in entries.iter() {
            if key.starts_with(DAY_KEY_PREFIX) {
                let data: DayData = serde_json::from_str(raw)?;
                index.insert(data.date.clone(), meta_of(&data));
            }
        }

        let count = index.len();
        entries.insert(INDEX_KEY.to_string(), serde_json::to_string(&index)?);
        Ok(count)
    }
}
