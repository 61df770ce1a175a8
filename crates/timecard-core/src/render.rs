use std::fmt::Display;
use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::calendar::{DayListing, DayState, MonthGrid, Rgb};
use crate::config::Config;
use crate::datetime::month_name;
use crate::record::{TimesheetRecord, TypeTable};
use crate::summary::{DayStatus, Summary};

const WEEKDAY_HEADER: &str = "Su Mo Tu We Th Fr Sa";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.color.unwrap_or(true) && io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, records, types))]
    pub fn print_timesheet_table(
        &self,
        records: &[TimesheetRecord],
        types: &TypeTable,
    ) -> anyhow::Result<()> {
        self.write_timesheet_table(io::stdout().lock(), records, types)
    }

    pub fn write_timesheet_table<W: Write>(
        &self,
        mut out: W,
        records: &[TimesheetRecord],
        types: &TypeTable,
    ) -> anyhow::Result<()> {
        if records.is_empty() {
            writeln!(out, "No timesheets found.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Type".to_string(),
            "Date".to_string(),
            "Hours".to_string(),
            "Description".to_string(),
            "Ticket".to_string(),
        ];

        let rows = records
            .iter()
            .map(|record| {
                let kind = types
                    .name_for(&record.timesheet_type_code)
                    .unwrap_or(&record.timesheet_type_code)
                    .to_string();
                let date = record
                    .day()
                    .map(|day| day.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| record.date.clone());
                vec![
                    self.paint(&record.id.to_string(), "33"),
                    kind,
                    date,
                    format!("{:.2}", record.hours),
                    record.description.clone(),
                    record.ticket_number.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        let total: f64 = records.iter().map(|r| r.hours).sum();
        writeln!(out)?;
        writeln!(out, "{} entries, {:.2} hours", records.len(), total)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, grid), fields(year = grid.year, month = grid.month))]
    pub fn print_calendar(&self, grid: &MonthGrid) -> anyhow::Result<()> {
        self.write_calendar(io::stdout().lock(), grid)
    }

    pub fn write_calendar<W: Write>(&self, mut out: W, grid: &MonthGrid) -> anyhow::Result<()> {
        let title = format!("{} {}", month_name(grid.month), grid.year);
        writeln!(out, "{title:^width$}", width = WEEKDAY_HEADER.len())?;
        writeln!(out, "{WEEKDAY_HEADER}")?;

        for week in grid.weeks() {
            let line = week
                .iter()
                .map(|cell| match cell {
                    Some(cell) => self.paint_day(&format!("{:>2}", cell.day), cell.state),
                    None => "  ".to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, listing, types))]
    pub fn print_day(
        &self,
        date: NaiveDate,
        listing: &DayListing,
        types: &TypeTable,
    ) -> anyhow::Result<()> {
        self.write_day(io::stdout().lock(), date, listing, types)
    }

    pub fn write_day<W: Write>(
        &self,
        mut out: W,
        date: NaiveDate,
        listing: &DayListing,
        types: &TypeTable,
    ) -> anyhow::Result<()> {
        match listing {
            DayListing::Appointments(records) => {
                writeln!(out, "Appointments for {}", date.format("%Y-%m-%d"))?;
                self.write_timesheet_table(out, records, types)?;
            }
            DayListing::Holiday(name) => {
                let name = self.paint(name, "1;36");
                writeln!(out, "{}: {}", date.format("%Y-%m-%d"), name)?;
            }
            DayListing::NoAppointments => {
                writeln!(out, "No appointments on {}", date.format("%Y-%m-%d"))?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, summary), fields(days = summary.days.len()))]
    pub fn print_summary(&self, summary: &Summary, target_hours: f64) -> anyhow::Result<()> {
        self.write_summary(io::stdout().lock(), summary, target_hours)
    }

    pub fn write_summary<W: Write>(
        &self,
        mut out: W,
        summary: &Summary,
        target_hours: f64,
    ) -> anyhow::Result<()> {
        if summary.is_empty() {
            writeln!(out, "No timesheets match the filters.")?;
            return Ok(());
        }

        let headers = [
            "DATE", "HOURS", "STATUS", "PROJECT", "USER", "WEEK", "MONTH", "WORKLOAD",
        ]
        .iter()
        .map(|h| h.to_string())
        .collect();

        let rows = summary
            .days
            .iter()
            .map(|day| {
                vec![
                    day.date.format("%Y-%m-%d").to_string(),
                    format!("{:.2}", day.total_hours),
                    self.paint_status(day.status),
                    day.project.clone(),
                    day.user.clone(),
                    day.iso_week.to_string(),
                    day.month_label.clone(),
                    day.workload_bar.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;

        writeln!(out)?;
        writeln!(out, "{}", self.paint("WEEKLY TOTALS", "1"))?;
        for (week, hours) in summary.sorted_weekly() {
            writeln!(out, "  {week}: {hours:.2}")?;
        }

        writeln!(out)?;
        writeln!(out, "{}", self.paint("MONTHLY TOTALS", "1"))?;
        for (month, hours) in summary.sorted_monthly() {
            writeln!(out, "  {month}: {hours:.2}")?;
        }

        if let Some(average) = summary.average_daily_hours() {
            writeln!(out)?;
            writeln!(
                out,
                "AVERAGE DAILY HOURS: {average:.2} (target {target_hours:.2})"
            )?;
        }
        Ok(())
    }

    /// `name: definition` lines for saved filters.
    pub fn print_named<'a, T, I>(&self, heading: &str, items: I) -> anyhow::Result<()>
    where
        T: Display + 'a,
        I: IntoIterator<Item = (&'a String, &'a T)>,
    {
        let mut out = io::stdout().lock();
        let mut any = false;
        for (name, item) in items {
            if !any {
                writeln!(out, "{}", self.paint(heading, "1"))?;
                any = true;
            }
            writeln!(out, "  {}: {}", self.paint(name, "33"), item)?;
        }
        if !any {
            writeln!(out, "No saved {}.", heading.to_lowercase())?;
        }
        Ok(())
    }

    pub fn print_profiles(&self, cfg: &Config) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if cfg.profiles.is_empty() {
            writeln!(out, "No profiles configured in {}", cfg.path.display())?;
            return Ok(());
        }

        for (name, profile) in &cfg.profiles {
            let marker = if *name == cfg.default_profile { "*" } else { " " };
            writeln!(
                out,
                "{marker} {} ({}, user {})",
                self.paint(name, "1"),
                profile.employee_name,
                profile.user_id
            )?;

            let headers = vec![
                "Alias".to_string(),
                "Sales order".to_string(),
                "Line".to_string(),
                "Ticket".to_string(),
            ];
            let rows = profile
                .project_aliases
                .iter()
                .map(|(alias, project)| {
                    vec![
                        alias.clone(),
                        project.sales_order.to_string(),
                        project.sales_order_line.to_string(),
                        if project.needs_ticket { "required" } else { "" }.to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            if !rows.is_empty() {
                write_table(&mut out, headers, rows)?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn paint_status(&self, status: DayStatus) -> String {
        let code = match status {
            DayStatus::Missing => "31",
            DayStatus::Overtime => "33",
            DayStatus::Ok => "32",
        };
        self.paint(status.as_str(), code)
    }

    fn paint_day(&self, text: &str, state: DayState) -> String {
        match state {
            DayState::Worked(Rgb { r, g, b }) => self.paint(text, &format!("1;38;2;{r};{g};{b}")),
            DayState::Weekend => self.paint(text, "34"),
            DayState::Holiday => self.paint(text, "1;36"),
            DayState::Today | DayState::Missing => self.paint(text, "1;31"),
            DayState::Plain => text.to_string(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
