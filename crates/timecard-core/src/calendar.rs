//! Month-grid layout of worked hours.
//!
//! Every day of the month gets exactly one [`DayState`]. The rules are
//! checked in priority order and the first one that applies wins:
//!
//! 1. hours were logged: a colour on the green/yellow/red gradient,
//! 2. a weekend day up to today with nothing logged,
//! 3. a non-business day,
//! 4. today,
//! 5. a past weekday with nothing logged,
//! 6. anything else.
//!
//! Weeks start on Sunday.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate, Weekday};

use crate::datetime::{days_in_month, first_of_month};
use crate::error::{Error, FormatKind, Result};
use crate::record::{NonBusinessDay, TimesheetRecord};

/// Journey assumed when a profile does not configure one.
pub const DEFAULT_JOURNEY: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Linear interpolation from `self` (t = 0) to `other` (t = 1).
    pub fn lerp(self, other: Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Rgb::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
        )
    }
}

pub const RED: Rgb = Rgb::new(0xea, 0x69, 0x62);
pub const YELLOW: Rgb = Rgb::new(0xe7, 0x8a, 0x4e);
pub const GREEN: Rgb = Rgb::new(0xa9, 0xb6, 0x65);

/// Colour for a day with `actual_hours` logged against the expected journey.
///
/// Green when the journey is met, yellow at half of it, red at nothing.
pub fn gradient_for_hours(expected_hours: f64, actual_hours: f64) -> Rgb {
    let expected = effective_journey(expected_hours);
    let diff = (expected - actual_hours).clamp(0.0, expected);
    let t = diff / expected;

    if t >= 0.5 {
        YELLOW.lerp(RED, (t - 0.5) / 0.5)
    } else {
        GREEN.lerp(YELLOW, t / 0.5)
    }
}

fn effective_journey(expected_hours: f64) -> f64 {
    if expected_hours > 0.0 {
        expected_hours
    } else {
        DEFAULT_JOURNEY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayState {
    Worked(Rgb),
    Weekend,
    Holiday,
    Today,
    Missing,
    Plain,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayCell {
    pub day: u32,
    pub date: NaiveDate,
    pub hours: f64,
    pub state: DayState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    /// Empty cells before the 1st; the weekday index counted from Sunday.
    pub leading_blanks: usize,
    pub cells: Vec<DayCell>,
}

impl MonthGrid {
    /// Rows of the grid, each starting on a Sunday. Leading blanks are `None`.
    pub fn weeks(&self) -> Vec<Vec<Option<&DayCell>>> {
        let mut rows: Vec<Vec<Option<&DayCell>>> = Vec::new();
        let mut row: Vec<Option<&DayCell>> = vec![None; self.leading_blanks];

        for cell in &self.cells {
            if cell.date.weekday() == Weekday::Sun && cell.day != 1 {
                rows.push(std::mem::take(&mut row));
            }
            row.push(Some(cell));
        }
        if !row.is_empty() {
            rows.push(row);
        }
        rows
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn classify_day(
    date: NaiveDate,
    hours: f64,
    non_business: bool,
    expected_hours: f64,
    today: NaiveDate,
) -> DayState {
    if hours > 0.0 {
        return DayState::Worked(gradient_for_hours(expected_hours, hours));
    }
    let weekend = is_weekend(date);
    if weekend && date <= today {
        return DayState::Weekend;
    }
    if non_business {
        return DayState::Holiday;
    }
    if date == today {
        return DayState::Today;
    }
    if !weekend && date < today {
        return DayState::Missing;
    }
    DayState::Plain
}

#[tracing::instrument(skip(hours_by_date, non_business_days))]
pub fn render_month(
    year: i32,
    month: u32,
    hours_by_date: &BTreeMap<NaiveDate, f64>,
    non_business_days: &BTreeSet<u32>,
    expected_hours: f64,
    today: NaiveDate,
) -> Result<MonthGrid> {
    let first = first_of_month(year, month)?;
    let last_day = days_in_month(year, month)?;

    let cells = first
        .iter_days()
        .take(last_day as usize)
        .map(|date| {
            let hours = hours_by_date.get(&date).copied().unwrap_or(0.0);
            let state = classify_day(
                date,
                hours,
                non_business_days.contains(&date.day()),
                expected_hours,
                today,
            );
            DayCell {
                day: date.day(),
                date,
                hours,
                state,
            }
        })
        .collect();

    Ok(MonthGrid {
        year,
        month,
        leading_blanks: first.weekday().num_days_from_sunday() as usize,
        cells,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum DayListing {
    Appointments(Vec<TimesheetRecord>),
    Holiday(String),
    NoAppointments,
}

/// The appointments logged on one day, in input order.
pub fn render_day(
    year: i32,
    month: u32,
    day: u32,
    records: &[TimesheetRecord],
    non_business_day_name: Option<&str>,
) -> Result<DayListing> {
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::format(FormatKind::Date, format!("{year:04}-{month:02}-{day:02}")))?;

    let appointments: Vec<TimesheetRecord> = records
        .iter()
        .filter(|record| record.day() == Some(date))
        .cloned()
        .collect();

    if !appointments.is_empty() {
        return Ok(DayListing::Appointments(appointments));
    }
    Ok(match non_business_day_name {
        Some(name) => DayListing::Holiday(name.to_string()),
        None => DayListing::NoAppointments,
    })
}

/// Hours logged per day of the given month.
pub fn hours_by_date(
    records: &[TimesheetRecord],
    year: i32,
    month: u32,
) -> BTreeMap<NaiveDate, f64> {
    let mut out = BTreeMap::new();
    for record in records {
        let Some(day) = record.day() else {
            continue;
        };
        if day.year() == year && day.month() == month {
            *out.entry(day).or_insert(0.0) += record.hours;
        }
    }
    out
}

/// Non-business days of the given month, keyed by day of month.
pub fn non_business_index(
    days: &[NonBusinessDay],
    year: i32,
    month: u32,
) -> BTreeMap<u32, String> {
    days.iter()
        .filter(|nbd| nbd.date.year() == year && nbd.date.month() == month)
        .map(|nbd| (nbd.date.day(), nbd.name.clone()))
        .collect()
}
