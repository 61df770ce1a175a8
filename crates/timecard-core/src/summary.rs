use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datetime::{month_name, parse_month_name};
use crate::error::{Error, FormatKind};
use crate::filter::{DailyFilter, apply_daily_filter};
use crate::record::TimesheetRecord;

/// Daily hours above which a day counts as overtime, whatever the journey.
pub const OVERTIME_THRESHOLD: f64 = 8.0;

pub const WORKLOAD_BAR_WIDTH: usize = 8;
const BAR_FILLED: char = '█';
const BAR_EMPTY: char = '░';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayStatus {
    Missing,
    Ok,
    Overtime,
}

impl DayStatus {
    pub fn classify(total_hours: f64, min_daily_hours: f64) -> Self {
        if total_hours < min_daily_hours {
            Self::Missing
        } else if total_hours > OVERTIME_THRESHOLD {
            Self::Overtime
        } else {
            Self::Ok
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "MISSING",
            Self::Ok => "OK",
            Self::Overtime => "OVERTIME",
        }
    }
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MISSING" => Ok(Self::Missing),
            "OK" => Ok(Self::Ok),
            "OVERTIME" => Ok(Self::Overtime),
            _ => Err(Error::format(FormatKind::Status, s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_hours: f64,
    pub status: DayStatus,
    /// Project of the last record seen for the day.
    pub project: String,
    /// Manager of the last record seen for the day.
    pub user: String,
    pub iso_week: u32,
    pub month_label: String,
    pub workload_bar: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub days: Vec<DailySummary>,
    /// Keyed `YYYY-Www` by ISO week-numbering year.
    pub weekly: HashMap<String, f64>,
    /// Keyed `YYYY-MonthName`.
    pub monthly: HashMap<String, f64>,
}

impl Summary {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn sorted_weekly(&self) -> Vec<(&str, f64)> {
        let mut out: Vec<(&str, f64)> = self
            .weekly
            .iter()
            .map(|(key, hours)| (key.as_str(), *hours))
            .collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    /// Monthly totals in calendar order. Keys that do not parse back into a
    /// year and month are left out.
    pub fn sorted_monthly(&self) -> Vec<(&str, f64)> {
        let mut out: Vec<((i32, u32), &str, f64)> = self
            .monthly
            .iter()
            .filter_map(|(key, hours)| {
                parse_month_key(key).map(|ym| (ym, key.as_str(), *hours))
            })
            .collect();
        out.sort_by_key(|(ym, _, _)| *ym);
        out.into_iter().map(|(_, key, hours)| (key, hours)).collect()
    }

    pub fn total_hours(&self) -> f64 {
        self.days.iter().map(|day| day.total_hours).sum()
    }

    pub fn average_daily_hours(&self) -> Option<f64> {
        if self.days.is_empty() {
            None
        } else {
            Some(self.total_hours() / self.days.len() as f64)
        }
    }
}

#[must_use]
pub fn week_key(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{:04}-W{:02}", iso.year(), iso.week())
}

#[must_use]
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{}", date.year(), month_name(date.month()))
}

fn parse_month_key(key: &str) -> Option<(i32, u32)> {
    let (year, month) = key.split_once('-')?;
    Some((year.parse().ok()?, parse_month_name(month)?))
}

/// Eight-glyph bar of `hours` against `target` hours.
#[must_use]
pub fn workload_bar(hours: f64, target: f64) -> String {
    let target = if target > 0.0 { target } else { OVERTIME_THRESHOLD };
    let units = (hours / target * WORKLOAD_BAR_WIDTH as f64).round();
    let filled = units.clamp(0.0, WORKLOAD_BAR_WIDTH as f64) as usize;

    let mut bar = String::with_capacity(WORKLOAD_BAR_WIDTH * BAR_FILLED.len_utf8());
    bar.extend(std::iter::repeat_n(BAR_FILLED, filled));
    bar.extend(std::iter::repeat_n(BAR_EMPTY, WORKLOAD_BAR_WIDTH - filled));
    bar
}

/// Groups the records that survive `filter` by day and rolls them up.
#[tracing::instrument(skip_all, fields(input = records.len()))]
pub fn summarize(
    records: &[TimesheetRecord],
    filter: &DailyFilter,
    expected_daily_hours: f64,
) -> Summary {
    let filtered = apply_daily_filter(records, filter);
    if filtered.is_empty() {
        debug!("no records left after day filter");
        return Summary::default();
    }

    let mut by_day: BTreeMap<NaiveDate, Vec<&TimesheetRecord>> = BTreeMap::new();
    for record in &filtered {
        if let Some(day) = record.day() {
            by_day.entry(day).or_default().push(record);
        }
    }

    let mut summary = Summary::default();
    for (date, group) in by_day {
        let total_hours: f64 = group.iter().map(|r| r.hours).sum();
        let (project, user) = group
            .last()
            .map(|r| (r.project_name.clone(), r.project_manager_name.clone()))
            .unwrap_or_default();
        let status = DayStatus::classify(total_hours, filter.min_daily_hours);

        if filter.status.is_some_and(|wanted| wanted != status) {
            continue;
        }

        *summary.weekly.entry(week_key(date)).or_default() += total_hours;
        *summary.monthly.entry(month_key(date)).or_default() += total_hours;

        summary.days.push(DailySummary {
            date,
            total_hours,
            status,
            project,
            user,
            iso_week: date.iso_week().week(),
            month_label: month_name(date.month()).to_string(),
            workload_bar: workload_bar(total_hours, expected_daily_hours),
        });
    }

    debug!(days = summary.days.len(), "summarized records");
    summary
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{DayStatus, Summary, summarize, week_key, workload_bar};
    use crate::filter::DailyFilter;
    use crate::record::TimesheetRecord;

    fn record(date: &str, hours: f64, project: &str) -> TimesheetRecord {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        let mut r = TimesheetRecord::new(day, hours, "work");
        r.project_name = project.to_string();
        r.project_manager_name = format!("{project} manager");
        r
    }

    #[test]
    fn empty_input_yields_empty_summary() {
        let summary = summarize(&[], &DailyFilter::default(), 8.0);
        assert_eq!(summary, Summary::default());
        assert!(summary.weekly.is_empty());
        assert!(summary.monthly.is_empty());
        assert_eq!(summary.average_daily_hours(), None);
    }

    #[test]
    fn last_record_of_the_day_wins() {
        let records = vec![
            record("2025-07-01", 1.0, "A"),
            record("2025-07-01", 1.0, "B"),
        ];
        let summary = summarize(&records, &DailyFilter::default(), 8.0);
        assert_eq!(summary.days.len(), 1);
        assert_eq!(summary.days[0].project, "B");
        assert_eq!(summary.days[0].user, "B manager");
    }

    #[test]
    fn status_classification() {
        assert_eq!(DayStatus::classify(0.0, 0.0), DayStatus::Ok);
        assert_eq!(DayStatus::classify(8.5, 0.0), DayStatus::Overtime);
        assert_eq!(DayStatus::classify(4.0, 8.0), DayStatus::Missing);
        assert_eq!(DayStatus::classify(8.0, 8.0), DayStatus::Ok);
        assert_eq!("overtime".parse::<DayStatus>().unwrap(), DayStatus::Overtime);
        assert!("late".parse::<DayStatus>().is_err());
    }

    #[test]
    fn monthly_scenario() {
        let records = vec![
            record("2025-07-02", 8.0, "B"),
            record("2025-07-01", 2.0, "A"),
            record("2025-07-01", 3.0, "A"),
        ];
        let filter = DailyFilter {
            min_daily_hours: 8.0,
            ..Default::default()
        };
        let summary = summarize(&records, &filter, 8.0);

        let rows: Vec<(String, f64, DayStatus)> = summary
            .days
            .iter()
            .map(|d| (d.date.format("%Y-%m-%d").to_string(), d.total_hours, d.status))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("2025-07-01".to_string(), 5.0, DayStatus::Missing),
                ("2025-07-02".to_string(), 8.0, DayStatus::Ok),
            ]
        );
        assert_eq!(summary.days[0].iso_week, 27);
        assert_eq!(summary.days[0].month_label, "July");
        assert_eq!(summary.weekly.get("2025-W27"), Some(&13.0));
        assert_eq!(summary.monthly.get("2025-July"), Some(&13.0));
        assert_eq!(summary.average_daily_hours(), Some(6.5));
    }

    #[test]
    fn unparsable_dates_are_skipped() {
        let mut broken = record("2025-07-01", 4.0, "A");
        broken.date = "31/07/2025".to_string();
        let records = vec![broken, record("2025-07-03", 6.0, "A")];
        let summary = summarize(&records, &DailyFilter::default(), 8.0);
        assert_eq!(summary.days.len(), 1);
        assert_eq!(summary.total_hours(), 6.0);
    }

    #[test]
    fn status_filter_drops_other_days_from_totals() {
        let records = vec![record("2025-07-01", 4.0, "A"), record("2025-07-02", 9.0, "A")];
        let filter = DailyFilter {
            min_daily_hours: 8.0,
            status: Some(DayStatus::Overtime),
            ..Default::default()
        };
        let summary = summarize(&records, &filter, 8.0);
        assert_eq!(summary.days.len(), 1);
        assert_eq!(summary.days[0].status, DayStatus::Overtime);
        assert_eq!(summary.weekly.get("2025-W27"), Some(&9.0));
    }

    #[test]
    fn week_key_uses_iso_week_year() {
        let dec_30 = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        let jan_1 = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        assert_eq!(week_key(dec_30), "2025-W01");
        assert_eq!(week_key(jan_1), "2020-W53");
    }

    #[test]
    fn totals_sort_for_display() {
        let records = vec![
            record("2025-02-03", 1.0, "A"),
            record("2024-12-30", 2.0, "A"),
            record("2025-01-06", 3.0, "A"),
            record("2025-10-01", 4.0, "A"),
        ];
        let summary = summarize(&records, &DailyFilter::default(), 8.0);
        let weeks: Vec<&str> = summary.sorted_weekly().into_iter().map(|(k, _)| k).collect();
        assert_eq!(weeks, vec!["2025-W01", "2025-W02", "2025-W06", "2025-W40"]);

        let months: Vec<&str> = summary.sorted_monthly().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            months,
            vec!["2024-December", "2025-January", "2025-February", "2025-October"]
        );
    }

    #[test]
    fn workload_bar_is_clamped_to_eight_units() {
        assert_eq!(workload_bar(0.0, 8.0), "░░░░░░░░");
        assert_eq!(workload_bar(4.0, 8.0), "████░░░░");
        assert_eq!(workload_bar(3.6, 8.0), "████░░░░");
        assert_eq!(workload_bar(12.0, 8.0), "████████");
        assert_eq!(workload_bar(3.0, 6.0), "████░░░░");
        assert_eq!(workload_bar(8.0, 0.0), "████████");
    }
}
