use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::Datelike;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, LookupKind};
use crate::record::{NonBusinessDay, TimesheetRecord, TypeTable};

/// The timesheet backend the commands talk to.
pub trait TimesheetService {
    fn fetch_timesheets(
        &self,
        user_id: u64,
        year: i32,
        month: u32,
    ) -> anyhow::Result<Vec<TimesheetRecord>>;

    /// Stores `record` and returns it with its assigned id.
    fn create_timesheet(
        &self,
        user_id: u64,
        record: TimesheetRecord,
    ) -> anyhow::Result<TimesheetRecord>;

    fn delete_timesheet(&self, user_id: u64, id: u64) -> anyhow::Result<()>;

    fn fetch_non_business_days(&self, year: i32, month: u32)
    -> anyhow::Result<Vec<NonBusinessDay>>;

    fn fetch_timesheet_types(&self) -> anyhow::Result<TypeTable>;
}

/// One edit that `undo` can revert: the entries that were deleted and the
/// entries created in their place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub user_id: u64,
    pub originals: Vec<TimesheetRecord>,
    pub recreated: Vec<TimesheetRecord>,
}

/// File-backed timesheet ledger: one JSON-lines file per user plus an undo
/// journal. Reference data is supplied by the configuration.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub undo_path: PathBuf,
    types: TypeTable,
    non_business_days: Vec<NonBusinessDay>,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir, types, non_business_days))]
    pub fn open(
        data_dir: &Path,
        types: TypeTable,
        non_business_days: Vec<NonBusinessDay>,
    ) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let undo_path = data_dir.join("undo.data");
        if !undo_path.exists() {
            fs::write(&undo_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            undo = %undo_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            undo_path,
            types,
            non_business_days,
        })
    }

    pub fn ledger_path(&self, user_id: u64) -> PathBuf {
        self.data_dir.join(format!("timesheets-{user_id}.data"))
    }

    #[tracing::instrument(skip(self))]
    pub fn load_all(&self, user_id: u64) -> anyhow::Result<Vec<TimesheetRecord>> {
        let path = self.ledger_path(user_id);
        if !path.exists() {
            return Ok(vec![]);
        }
        load_jsonl(&path).with_context(|| format!("failed to load {}", path.display()))
    }

    #[tracing::instrument(skip(self, records))]
    fn save_all(&self, user_id: u64, records: &[TimesheetRecord]) -> anyhow::Result<()> {
        let path = self.ledger_path(user_id);
        save_jsonl_atomic(&path, records)
            .with_context(|| format!("failed to save {}", path.display()))
    }

    pub fn next_id(&self, records: &[TimesheetRecord]) -> u64 {
        records.iter().map(|r| r.id).max().unwrap_or(0) + 1
    }

    #[tracing::instrument(skip(self, entry), fields(user_id = entry.user_id))]
    pub fn push_undo(&self, entry: &UndoEntry) -> anyhow::Result<()> {
        let mut entries: Vec<UndoEntry> = load_jsonl(&self.undo_path)?;
        entries.push(entry.clone());
        save_jsonl_atomic(&self.undo_path, &entries)
    }

    #[tracing::instrument(skip(self))]
    pub fn pop_undo(&self) -> anyhow::Result<Option<UndoEntry>> {
        let mut entries: Vec<UndoEntry> = load_jsonl(&self.undo_path)?;
        let Some(entry) = entries.pop() else {
            return Ok(None);
        };
        save_jsonl_atomic(&self.undo_path, &entries)?;
        Ok(Some(entry))
    }

    /// Swaps the newest journal entry for `entry`, or drops it when `None`.
    #[tracing::instrument(skip(self, entry))]
    pub fn replace_last_undo(&self, entry: Option<&UndoEntry>) -> anyhow::Result<()> {
        let mut entries: Vec<UndoEntry> = load_jsonl(&self.undo_path)?;
        entries.pop();
        entries.extend(entry.cloned());
        save_jsonl_atomic(&self.undo_path, &entries)
    }

    /// Puts a previously stored record back as-is. Its id is kept unless
    /// another record took it meanwhile.
    #[tracing::instrument(skip(self, record), fields(id = record.id))]
    pub fn restore_timesheet(
        &self,
        user_id: u64,
        mut record: TimesheetRecord,
    ) -> anyhow::Result<TimesheetRecord> {
        let mut records = self.load_all(user_id)?;
        if record.id == 0 || records.iter().any(|r| r.id == record.id) {
            record.id = self.next_id(&records);
        }
        records.push(record.clone());
        self.save_all(user_id, &records)?;

        info!(id = record.id, "restored timesheet");
        Ok(record)
    }
}

impl TimesheetService for DataStore {
    #[tracing::instrument(skip(self))]
    fn fetch_timesheets(
        &self,
        user_id: u64,
        year: i32,
        month: u32,
    ) -> anyhow::Result<Vec<TimesheetRecord>> {
        let records: Vec<TimesheetRecord> = self
            .load_all(user_id)?
            .into_iter()
            .filter(|r| {
                r.day()
                    .is_some_and(|day| day.year() == year && day.month() == month)
            })
            .collect();
        debug!(count = records.len(), "fetched timesheets");
        Ok(records)
    }

    #[tracing::instrument(skip(self, record), fields(date = %record.date, hours = record.hours))]
    fn create_timesheet(
        &self,
        user_id: u64,
        mut record: TimesheetRecord,
    ) -> anyhow::Result<TimesheetRecord> {
        if record.day().is_none() {
            return Err(anyhow!("timesheet has an invalid date: {}", record.date));
        }

        let mut records = self.load_all(user_id)?;
        record.id = self.next_id(&records);
        records.push(record.clone());
        self.save_all(user_id, &records)?;

        info!(id = record.id, "created timesheet");
        Ok(record)
    }

    #[tracing::instrument(skip(self))]
    fn delete_timesheet(&self, user_id: u64, id: u64) -> anyhow::Result<()> {
        let mut records = self.load_all(user_id)?;
        let idx = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| Error::lookup(LookupKind::Timesheet, id.to_string()))?;
        records.remove(idx);
        self.save_all(user_id, &records)?;

        info!(id, "deleted timesheet");
        Ok(())
    }

    fn fetch_non_business_days(
        &self,
        year: i32,
        month: u32,
    ) -> anyhow::Result<Vec<NonBusinessDay>> {
        Ok(self
            .non_business_days
            .iter()
            .filter(|nbd| nbd.date.year() == year && nbd.date.month() == month)
            .cloned()
            .collect())
    }

    fn fetch_timesheet_types(&self) -> anyhow::Result<TypeTable> {
        Ok(self.types.clone())
    }
}

/// Local copy of fetched timesheet lists, one JSON file per key.
#[derive(Debug, Clone)]
pub struct Cache {
    pub dir: PathBuf,
}

impl Cache {
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn timesheets_key(user_id: u64) -> String {
        format!("timesheets{user_id}.json")
    }

    /// A missing cache file reads as an empty list.
    #[tracing::instrument(skip(self))]
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Vec<T>> {
        let path = self.dir.join(key);
        if !path.exists() {
            debug!(file = %path.display(), "cache file not found");
            return Ok(vec![]);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("failed parsing {}", path.display()))
    }

    #[tracing::instrument(skip(self, items), fields(count = items.len()))]
    pub fn write<T: Serialize>(&self, key: &str, items: &[T]) -> anyhow::Result<()> {
        let path = self.dir.join(key);
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut temp, items)?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        debug!(file = %path.display(), "wrote cache");
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let item: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(item);
    }

    debug!(count = out.len(), "loaded jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, items))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = items.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for item in items {
        let serialized = serde_json::to_string(item)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::{Cache, DataStore, TimesheetService, UndoEntry};
    use crate::record::{NonBusinessDay, TimesheetRecord, TypeTable};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store(dir: &std::path::Path) -> DataStore {
        DataStore::open(
            dir,
            TypeTable::new([("Normal", "N")]),
            vec![
                NonBusinessDay {
                    date: day(2025, 7, 9),
                    name: "State holiday".to_string(),
                },
                NonBusinessDay {
                    date: day(2025, 12, 25),
                    name: "Christmas".to_string(),
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn create_fetch_and_delete() {
        let temp = tempdir().unwrap();
        let store = store(temp.path());

        let first = store
            .create_timesheet(42, TimesheetRecord::new(day(2025, 7, 1), 4.0, "a"))
            .unwrap();
        let second = store
            .create_timesheet(42, TimesheetRecord::new(day(2025, 8, 1), 2.0, "b"))
            .unwrap();
        store
            .create_timesheet(7, TimesheetRecord::new(day(2025, 7, 1), 8.0, "other user"))
            .unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let july = store.fetch_timesheets(42, 2025, 7).unwrap();
        assert_eq!(july, vec![first.clone()]);

        store.delete_timesheet(42, first.id).unwrap();
        assert!(store.fetch_timesheets(42, 2025, 7).unwrap().is_empty());
        assert!(store.delete_timesheet(42, first.id).is_err());

        let third = store
            .create_timesheet(42, TimesheetRecord::new(day(2025, 7, 2), 1.0, "c"))
            .unwrap();
        assert_eq!(third.id, 3);
    }

    #[test]
    fn rejects_records_without_a_date() {
        let temp = tempdir().unwrap();
        let store = store(temp.path());
        let mut record = TimesheetRecord::new(day(2025, 7, 1), 1.0, "x");
        record.date = "soon".to_string();
        assert!(store.create_timesheet(42, record).is_err());
    }

    #[test]
    fn reference_data_is_scoped_by_month() {
        let temp = tempdir().unwrap();
        let store = store(temp.path());
        let july = store.fetch_non_business_days(2025, 7).unwrap();
        assert_eq!(july.len(), 1);
        assert_eq!(july[0].name, "State holiday");
        assert_eq!(store.fetch_timesheet_types().unwrap().code_for("Normal"), Some("N"));
    }

    #[test]
    fn undo_journal_is_a_stack() {
        let temp = tempdir().unwrap();
        let store = store(temp.path());
        assert!(store.pop_undo().unwrap().is_none());

        let entry = |hours: f64| UndoEntry {
            user_id: 42,
            originals: vec![TimesheetRecord::new(day(2025, 7, 1), hours, "old")],
            recreated: vec![],
        };
        store.push_undo(&entry(1.0)).unwrap();
        store.push_undo(&entry(2.0)).unwrap();

        assert_eq!(store.pop_undo().unwrap(), Some(entry(2.0)));
        assert_eq!(store.pop_undo().unwrap(), Some(entry(1.0)));
        assert!(store.pop_undo().unwrap().is_none());
    }

    #[test]
    fn replace_last_undo_swaps_or_drops_the_top() {
        let temp = tempdir().unwrap();
        let store = store(temp.path());
        let entry = |hours: f64| UndoEntry {
            user_id: 42,
            originals: vec![TimesheetRecord::new(day(2025, 7, 1), hours, "old")],
            recreated: vec![],
        };
        store.push_undo(&entry(1.0)).unwrap();
        store.push_undo(&entry(2.0)).unwrap();

        store.replace_last_undo(Some(&entry(3.0))).unwrap();
        assert_eq!(store.pop_undo().unwrap(), Some(entry(3.0)));

        store.replace_last_undo(None).unwrap();
        assert!(store.pop_undo().unwrap().is_none());
    }

    #[test]
    fn restore_keeps_free_ids_and_skips_date_checks() {
        let temp = tempdir().unwrap();
        let store = store(temp.path());
        store
            .create_timesheet(42, TimesheetRecord::new(day(2025, 7, 1), 1.0, "a"))
            .unwrap();

        let mut legacy = TimesheetRecord::new(day(2025, 7, 2), 2.0, "legacy");
        legacy.id = 7;
        legacy.date = "31/07/2025".to_string();
        assert_eq!(store.restore_timesheet(42, legacy.clone()).unwrap().id, 7);

        let mut clash = TimesheetRecord::new(day(2025, 7, 3), 3.0, "clash");
        clash.id = 1;
        assert_eq!(store.restore_timesheet(42, clash).unwrap().id, 8);

        let all = store.load_all(42).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&legacy));
    }

    #[test]
    fn cache_round_trip() {
        let temp = tempdir().unwrap();
        let cache = Cache::open(&temp.path().join("cache")).unwrap();
        let key = Cache::timesheets_key(42);

        let empty: Vec<TimesheetRecord> = cache.read(&key).unwrap();
        assert!(empty.is_empty());

        let records = vec![TimesheetRecord::new(day(2025, 7, 1), 2.5, "cached")];
        cache.write(&key, &records).unwrap();
        let back: Vec<TimesheetRecord> = cache.read(&key).unwrap();
        assert_eq!(back, records);
        assert_eq!(key, "timesheets42.json");
    }
}
