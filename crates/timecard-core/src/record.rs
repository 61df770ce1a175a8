use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::datetime::parse_record_day;

/// Code used when an appointment is created without an explicit type.
pub const DEFAULT_TYPE_CODE: &str = "N";

/// One logged appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimesheetRecord {
    /// Server-assigned; zero until the entry has been created.
    #[serde(default)]
    pub id: u64,

    /// Raw timestamp as delivered by the service. Only the date part is used.
    pub date: String,

    pub hours: f64,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub ticket_number: String,

    #[serde(default)]
    pub timesheet_type_code: String,

    #[serde(default)]
    pub project_sales_order: i64,

    #[serde(default)]
    pub project_sales_order_line: i64,

    #[serde(default)]
    pub project_name: String,

    #[serde(default)]
    pub project_manager_name: String,
}

impl TimesheetRecord {
    pub fn new(day: NaiveDate, hours: f64, description: impl Into<String>) -> Self {
        Self {
            id: 0,
            date: day.format("%Y-%m-%dT00:00:00Z").to_string(),
            hours,
            description: description.into(),
            ticket_number: String::new(),
            timesheet_type_code: DEFAULT_TYPE_CODE.to_string(),
            project_sales_order: 0,
            project_sales_order_line: 0,
            project_name: String::new(),
            project_manager_name: String::new(),
        }
    }

    /// Calendar date of the record, or `None` when the timestamp is unparsable.
    pub fn day(&self) -> Option<NaiveDate> {
        parse_record_day(&self.date)
    }

    pub fn has_ticket(&self) -> bool {
        !self.ticket_number.is_empty()
    }

    pub fn project_key(&self) -> (i64, i64) {
        (self.project_sales_order, self.project_sales_order_line)
    }
}

/// A day flagged by the calendar service as non-working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonBusinessDay {
    pub date: NaiveDate,
    pub name: String,
}

/// Timesheet type names and their codes, loaded once per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeTable {
    by_name: BTreeMap<String, String>,
    by_code: BTreeMap<String, String>,
}

impl TypeTable {
    pub fn new<I, N, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<String>,
    {
        let mut table = Self::default();
        for (name, code) in entries {
            let (name, code) = (name.into(), code.into());
            table.by_code.insert(code.clone(), name.clone());
            table.by_name.insert(name, code);
        }
        table
    }

    pub fn code_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    pub fn name_for(&self, code: &str) -> Option<&str> {
        self.by_code.get(code).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{TimesheetRecord, TypeTable};

    #[test]
    fn day_ignores_time_of_day() {
        let mut record = TimesheetRecord::new(
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            2.0,
            "review",
        );
        assert_eq!(record.date, "2025-07-01T00:00:00Z");
        record.date = "2025-07-01T17:45:00Z".to_string();
        assert_eq!(record.day(), NaiveDate::from_ymd_opt(2025, 7, 1));

        record.date = "yesterday".to_string();
        assert_eq!(record.day(), None);
    }

    #[test]
    fn type_table_resolves_both_directions() {
        let table = TypeTable::new([("Normal", "N"), ("Overtime", "HE")]);
        assert_eq!(table.code_for("Overtime"), Some("HE"));
        assert_eq!(table.name_for("N"), Some("Normal"));
        assert_eq!(table.code_for("Sobreaviso"), None);
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["Normal", "Overtime"]);
    }
}
