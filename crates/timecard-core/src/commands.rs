use std::collections::BTreeSet;

use anyhow::{Context, anyhow};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::calendar::{hours_by_date, non_business_index, render_day, render_month};
use crate::cli::{
    AliasAction, Command, DailyFilterArgs, MonthArgs, ProfileAction, SavedAction, SavedOp,
    TimesheetFilterArgs,
};
use crate::config::{Config, Profile, ProjectAlias};
use crate::datastore::{Cache, DataStore, TimesheetService, UndoEntry};
use crate::datetime::{first_of_month, parse_day, shift_month};
use crate::duration::parse_duration;
use crate::error::{Error, FormatKind, LookupKind};
use crate::filter::{DailyFilter, TimesheetFilter, apply_filter};
use crate::quantity::parse_comparator;
use crate::record::{DEFAULT_TYPE_CODE, TimesheetRecord, TypeTable};
use crate::render::Renderer;
use crate::summary::{DayStatus, summarize};

/// Everything a command needs besides its own arguments.
pub struct Session<'a> {
    pub store: &'a DataStore,
    pub cache: &'a Cache,
    pub renderer: &'a Renderer,
    pub profile: Option<&'a str>,
    pub today: NaiveDate,
}

#[instrument(skip(session, cfg, command), fields(today = %session.today))]
pub fn dispatch(session: &Session<'_>, cfg: &mut Config, command: Command) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Appoint {
            description,
            hours,
            date,
            project,
            ticket,
            type_name,
        } => cmd_appoint(
            session,
            cfg,
            AppointArgs {
                description,
                hours,
                date,
                project,
                ticket,
                type_name,
            },
        ),
        Command::List { period, filter } => cmd_list(session, cfg, &period, filter.as_deref()),
        Command::Delete { id } => cmd_delete(session, cfg, id),
        Command::Edit {
            id,
            filter,
            period,
            description,
            hours,
            ticket,
            project,
            date,
            type_name,
        } => {
            let overrides = EditOverrides {
                description,
                hours,
                ticket,
                project,
                date,
                type_name,
            };
            cmd_edit(session, cfg, id, filter.as_deref(), &period, &overrides)
        }
        Command::Undo => cmd_undo(session),
        Command::Cal {
            year,
            month,
            day,
            filter,
            force,
        } => cmd_cal(session, cfg, year, month, day, filter.as_deref(), force),
        Command::DateSummary {
            year,
            month,
            filter_day,
            filter_timesheet,
        } => cmd_date_summary(
            session,
            cfg,
            year,
            month,
            filter_day.as_deref(),
            filter_timesheet.as_deref(),
        ),
        Command::FilterTimesheets { action, fields } => {
            cmd_filter_timesheets(session, cfg, &action, &fields)
        }
        Command::FilterDays { action, fields } => cmd_filter_days(session, cfg, &action, &fields),
        Command::Profiles { action: None } => session.renderer.print_profiles(cfg),
        Command::Profiles {
            action: Some(action),
        } => cmd_profiles(cfg, action),
        Command::Alias(action) => cmd_alias(session, cfg, action),
    }
}

#[derive(Debug)]
struct AppointArgs {
    description: String,
    hours: String,
    date: Option<String>,
    project: String,
    ticket: Option<String>,
    type_name: Option<String>,
}

#[derive(Debug, Default)]
struct EditOverrides {
    description: Option<String>,
    hours: Option<String>,
    ticket: Option<String>,
    project: Option<String>,
    date: Option<String>,
    type_name: Option<String>,
}

#[instrument(skip(session, cfg))]
fn cmd_appoint(session: &Session<'_>, cfg: &Config, args: AppointArgs) -> anyhow::Result<()> {
    info!("command appoint");

    let (profile_name, profile) = cfg.profile(session.profile)?;
    let hours = parse_positive_hours(&args.hours)?;
    let day = match args.date.as_deref() {
        Some(text) => parse_day(text)?,
        None => session.today,
    };
    let types = session.store.fetch_timesheet_types()?;
    if types.is_empty() {
        warn!("no timesheet types configured");
    }

    let mut record = TimesheetRecord::new(day, hours, args.description);
    record.ticket_number = args.ticket.unwrap_or_default();
    record.timesheet_type_code = resolve_type_code(&types, args.type_name.as_deref())?;
    assign_project(&mut record, profile, &args.project)?;

    debug!(profile = profile_name, ?record, "creating appointment");
    let created = session.store.create_timesheet(profile.user_id, record)?;
    println!(
        "Created timesheet {} on {} ({:.2}h, {}).",
        created.id,
        day.format("%Y-%m-%d"),
        created.hours,
        created.project_name
    );
    Ok(())
}

#[instrument(skip(session, cfg))]
fn cmd_list(
    session: &Session<'_>,
    cfg: &Config,
    period: &MonthArgs,
    filter: Option<&str>,
) -> anyhow::Result<()> {
    info!("command list");

    let (_, profile) = cfg.profile(session.profile)?;
    let (year, month) = resolve_month(period.year, period.month, session.today)?;
    let records = session
        .store
        .fetch_timesheets(profile.user_id, year, month)?;
    session
        .cache
        .write(&Cache::timesheets_key(profile.user_id), &records)?;

    let types = session.store.fetch_timesheet_types()?;
    let shown = match filter {
        Some(name) => apply_filter(&records, cfg.timesheet_filter(name)?, profile, &types),
        None => records,
    };

    session.renderer.print_timesheet_table(&shown, &types)
}

#[instrument(skip(session, cfg))]
fn cmd_delete(session: &Session<'_>, cfg: &Config, id: u64) -> anyhow::Result<()> {
    info!("command delete");

    let (_, profile) = cfg.profile(session.profile)?;
    session.store.delete_timesheet(profile.user_id, id)?;
    println!("Deleted timesheet {id}.");
    Ok(())
}

#[instrument(skip(session, cfg, overrides))]
fn cmd_edit(
    session: &Session<'_>,
    cfg: &Config,
    id: Option<u64>,
    filter: Option<&str>,
    period: &MonthArgs,
    overrides: &EditOverrides,
) -> anyhow::Result<()> {
    info!("command edit");

    let (_, profile) = cfg.profile(session.profile)?;
    let types = session.store.fetch_timesheet_types()?;

    let targets: Vec<TimesheetRecord> = match (id, filter) {
        (Some(id), _) => {
            let record = session
                .store
                .load_all(profile.user_id)?
                .into_iter()
                .find(|r| r.id == id)
                .ok_or_else(|| Error::lookup(LookupKind::Timesheet, id.to_string()))?;
            vec![record]
        }
        (None, Some(name)) => {
            let (year, month) = resolve_month(period.year, period.month, session.today)?;
            let records = session
                .store
                .fetch_timesheets(profile.user_id, year, month)?;
            apply_filter(&records, cfg.timesheet_filter(name)?, profile, &types)
        }
        (None, None) => return Err(anyhow!("edit needs --id or --filter")),
    };

    if targets.is_empty() {
        println!("No timesheets matched.");
        return Ok(());
    }

    // Validate every replacement before touching the ledger.
    let replacements = targets
        .iter()
        .map(|original| apply_overrides(original, overrides, profile, &types))
        .collect::<anyhow::Result<Vec<_>>>()?;

    // Journal first so an interrupted edit can still be undone.
    let mut entry = UndoEntry {
        user_id: profile.user_id,
        originals: targets.clone(),
        recreated: Vec::with_capacity(targets.len()),
    };
    session.store.push_undo(&entry)?;

    for (idx, (original, replacement)) in targets.iter().zip(replacements).enumerate() {
        match recreate(session.store, profile.user_id, original, replacement) {
            Ok(created) => entry.recreated.push(created),
            Err(err) => {
                // `original` is back in the ledger; only the ones before it changed.
                entry.originals.truncate(idx);
                let journalled = (!entry.originals.is_empty()).then_some(&entry);
                session.store.replace_last_undo(journalled)?;
                return Err(err);
            }
        }
    }
    session.store.replace_last_undo(Some(&entry))?;

    for (original, created) in entry.originals.iter().zip(&entry.recreated) {
        println!("Edited timesheet {} (now {}).", original.id, created.id);
    }
    Ok(())
}

/// Deletes `original` and stores `replacement`. When the replacement cannot
/// be stored the original is put back before the error is returned.
fn recreate(
    store: &DataStore,
    user_id: u64,
    original: &TimesheetRecord,
    replacement: TimesheetRecord,
) -> anyhow::Result<TimesheetRecord> {
    store.delete_timesheet(user_id, original.id)?;
    match store.create_timesheet(user_id, replacement) {
        Ok(created) => {
            debug!(from = original.id, to = created.id, "re-created timesheet");
            Ok(created)
        }
        Err(err) => {
            store
                .restore_timesheet(user_id, original.clone())
                .with_context(|| format!("failed to restore timesheet {}", original.id))?;
            Err(err.context(format!("failed to re-create timesheet {}", original.id)))
        }
    }
}

#[instrument(skip(session))]
fn cmd_undo(session: &Session<'_>) -> anyhow::Result<()> {
    info!("command undo");

    let Some(entry) = session.store.pop_undo()? else {
        println!("Nothing to undo.");
        return Ok(());
    };

    for record in &entry.recreated {
        if let Err(err) = session.store.delete_timesheet(entry.user_id, record.id) {
            warn!(id = record.id, error = %err, "re-created timesheet already gone");
        }
    }

    for original in entry.originals {
        let old_id = original.id;
        let restored = session.store.restore_timesheet(entry.user_id, original)?;
        if restored.id == old_id {
            println!("Restored timesheet {old_id}.");
        } else {
            println!("Restored timesheet {old_id} as {}.", restored.id);
        }
    }
    Ok(())
}

#[instrument(skip(session, cfg))]
fn cmd_cal(
    session: &Session<'_>,
    cfg: &Config,
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    filter: Option<&str>,
    force: bool,
) -> anyhow::Result<()> {
    info!("command cal");

    let (_, profile) = cfg.profile(session.profile)?;
    let (year, month) = resolve_month(year, month, session.today)?;
    let mut records = load_calendar_records(session, profile.user_id, year, month, force)?;

    let types = session.store.fetch_timesheet_types()?;
    if let Some(name) = filter {
        records = apply_filter(&records, cfg.timesheet_filter(name)?, profile, &types);
    }

    let holidays = non_business_index(
        &session.store.fetch_non_business_days(year, month)?,
        year,
        month,
    );

    if let Some(day) = day {
        let date = first_of_month(year, month)?.with_day(day).ok_or_else(|| {
            Error::format(FormatKind::Date, format!("{year:04}-{month:02}-{day:02}"))
        })?;
        let listing = render_day(
            year,
            month,
            date.day(),
            &records,
            holidays.get(&day).map(String::as_str),
        )?;
        return session.renderer.print_day(date, &listing, &types);
    }

    let hours = hours_by_date(&records, year, month);
    let non_business: BTreeSet<u32> = holidays.keys().copied().collect();
    let grid = render_month(
        year,
        month,
        &hours,
        &non_business,
        profile.journey(),
        session.today,
    )?;
    session.renderer.print_calendar(&grid)
}

/// Cached records, refreshed from the service (the month and its two
/// neighbours) when forced or when the cache has nothing for the month.
#[instrument(skip(session))]
fn load_calendar_records(
    session: &Session<'_>,
    user_id: u64,
    year: i32,
    month: u32,
    force: bool,
) -> anyhow::Result<Vec<TimesheetRecord>> {
    let key = Cache::timesheets_key(user_id);
    let cached: Vec<TimesheetRecord> = if force {
        vec![]
    } else {
        session.cache.read(&key)?
    };
    let has_month = cached
        .iter()
        .filter_map(TimesheetRecord::day)
        .any(|d| d.year() == year && d.month() == month);
    if has_month {
        return Ok(cached);
    }

    debug!(force, "refreshing cache");
    let mut records = Vec::new();
    for delta in [-1, 0, 1] {
        let (y, m) = shift_month(year, month, delta);
        records.extend(session.store.fetch_timesheets(user_id, y, m)?);
    }
    session.cache.write(&key, &records)?;
    Ok(records)
}

#[instrument(skip(session, cfg))]
fn cmd_date_summary(
    session: &Session<'_>,
    cfg: &Config,
    year: Option<i32>,
    month: Option<u32>,
    filter_day: Option<&str>,
    filter_timesheet: Option<&str>,
) -> anyhow::Result<()> {
    info!("command date-summary");

    let (_, profile) = cfg.profile(session.profile)?;
    let months: Vec<(i32, u32)> = match (year, month) {
        (Some(year), None) => (1..=12).map(|m| (year, m)).collect(),
        (year, month) => vec![resolve_month(year, month, session.today)?],
    };

    let mut records = Vec::new();
    for (y, m) in months {
        records.extend(session.store.fetch_timesheets(profile.user_id, y, m)?);
    }
    debug!(fetched = records.len(), "fetched records for summary");

    if let Some(name) = filter_timesheet {
        let types = session.store.fetch_timesheet_types()?;
        records = apply_filter(&records, cfg.timesheet_filter(name)?, profile, &types);
    }

    let day_filter = resolve_day_filter(cfg, filter_day)?;

    let summary = summarize(&records, &day_filter, profile.journey());
    session
        .renderer
        .print_summary(&summary, day_filter.min_daily_hours)
}

#[instrument(skip(session, cfg, action, fields))]
fn cmd_filter_timesheets(
    session: &Session<'_>,
    cfg: &mut Config,
    action: &SavedAction,
    fields: &TimesheetFilterArgs,
) -> anyhow::Result<()> {
    info!("command filter-timesheets");

    match action.op() {
        Some(SavedOp::Save(name)) => {
            let filter = build_timesheet_filter(fields)?;
            println!("Saved timesheet filter '{name}': {filter}");
            cfg.saved_filters.insert(name.to_string(), filter);
            cfg.save()
        }
        Some(SavedOp::Delete(name)) => {
            cfg.saved_filters
                .remove(name)
                .ok_or_else(|| Error::lookup(LookupKind::TimesheetFilter, name))?;
            println!("Deleted timesheet filter '{name}'.");
            cfg.save()
        }
        Some(SavedOp::List) => session
            .renderer
            .print_named("Timesheet filters", cfg.saved_filters.iter()),
        None => Err(anyhow!("choose one of --save, --list or --delete")),
    }
}

#[instrument(skip(session, cfg, action, fields))]
fn cmd_filter_days(
    session: &Session<'_>,
    cfg: &mut Config,
    action: &SavedAction,
    fields: &DailyFilterArgs,
) -> anyhow::Result<()> {
    info!("command filter-days");

    match action.op() {
        Some(SavedOp::Save(name)) => {
            let filter = build_daily_filter(fields)?;
            println!("Saved day filter '{name}': {filter}");
            cfg.saved_day_filters.insert(name.to_string(), filter);
            cfg.save()
        }
        Some(SavedOp::Delete(name)) => {
            cfg.saved_day_filters
                .remove(name)
                .ok_or_else(|| Error::lookup(LookupKind::DayFilter, name))?;
            println!("Deleted day filter '{name}'.");
            cfg.save()
        }
        Some(SavedOp::List) => session
            .renderer
            .print_named("Day filters", cfg.saved_day_filters.iter()),
        None => Err(anyhow!("choose one of --save, --list or --delete")),
    }
}

#[instrument(skip(cfg))]
fn cmd_profiles(cfg: &mut Config, action: ProfileAction) -> anyhow::Result<()> {
    info!("command profiles");

    match action {
        ProfileAction::Add {
            name,
            user_id,
            employee_name,
            email,
            employee_code,
            journey,
            make_default,
        } => {
            if let Some(journey) = journey.filter(|j| *j < 0.0) {
                return Err(anyhow!("journey must not be negative, got {journey}"));
            }
            let created = !cfg.profiles.contains_key(&name);
            let profile = cfg.profiles.entry(name.clone()).or_default();
            if let Some(user_id) = user_id {
                profile.user_id = user_id;
            }
            if let Some(employee_name) = employee_name {
                profile.employee_name = employee_name;
            }
            if let Some(email) = email {
                profile.email = email;
            }
            if let Some(employee_code) = employee_code {
                profile.employee_code = employee_code;
            }
            if let Some(journey) = journey {
                profile.daily_journey = journey;
            }

            if make_default || cfg.default_profile.is_empty() {
                cfg.default_profile = name.clone();
            }
            println!(
                "{} profile '{name}'.",
                if created { "Created" } else { "Updated" }
            );
        }
        ProfileAction::SetDefault { name } => {
            if !cfg.profiles.contains_key(&name) {
                return Err(Error::lookup(LookupKind::Profile, name).into());
            }
            println!("Default profile is now '{name}'.");
            cfg.default_profile = name;
        }
        ProfileAction::Remove { name } => {
            cfg.profiles
                .remove(&name)
                .ok_or_else(|| Error::lookup(LookupKind::Profile, name.as_str()))?;
            if cfg.default_profile == name {
                cfg.default_profile.clear();
            }
            println!("Removed profile '{name}'.");
        }
    }
    cfg.save()
}

#[instrument(skip(session, cfg))]
fn cmd_alias(session: &Session<'_>, cfg: &mut Config, action: AliasAction) -> anyhow::Result<()> {
    info!("command alias");

    let profile_name = cfg.profile(session.profile)?.0.to_string();
    let profile = cfg
        .profiles
        .get_mut(&profile_name)
        .ok_or_else(|| Error::lookup(LookupKind::Profile, profile_name.as_str()))?;

    match action {
        AliasAction::Add {
            name,
            sales_order,
            line,
            needs_ticket,
        } => {
            let alias = ProjectAlias {
                sales_order,
                sales_order_line: line,
                needs_ticket,
            };
            profile.project_aliases.insert(name.clone(), alias);
            println!("Alias '{name}' -> {sales_order}/{line} saved in profile '{profile_name}'.");
        }
        AliasAction::Remove { name } => {
            profile
                .project_aliases
                .remove(&name)
                .ok_or_else(|| Error::lookup(LookupKind::ProjectAlias, name.as_str()))?;
            println!("Alias '{name}' removed from profile '{profile_name}'.");
        }
    }
    cfg.save()
}

/// The saved day filter `name`, or a filter with no floor and no clauses.
fn resolve_day_filter(cfg: &Config, name: Option<&str>) -> anyhow::Result<DailyFilter> {
    Ok(match name {
        Some(name) => cfg.day_filter(name)?.clone(),
        None => DailyFilter::default(),
    })
}

fn resolve_month(
    year: Option<i32>,
    month: Option<u32>,
    today: NaiveDate,
) -> anyhow::Result<(i32, u32)> {
    let year = year.unwrap_or_else(|| today.year());
    let month = month.unwrap_or_else(|| today.month());
    first_of_month(year, month)?;
    Ok((year, month))
}

fn parse_positive_hours(text: &str) -> anyhow::Result<f64> {
    let hours = parse_duration(text)?;
    if hours <= 0.0 {
        return Err(anyhow!("hours must be greater than zero, got '{text}'"));
    }
    Ok(hours)
}

fn resolve_type_code(types: &TypeTable, type_name: Option<&str>) -> anyhow::Result<String> {
    let Some(name) = type_name else {
        return Ok(DEFAULT_TYPE_CODE.to_string());
    };
    match types.code_for(name) {
        Some(code) => Ok(code.to_string()),
        None => {
            debug!(known = ?types.names().collect::<Vec<_>>(), "unknown timesheet type");
            Err(Error::lookup(LookupKind::TimesheetType, name).into())
        }
    }
}

/// Points `record` at the project behind `alias`; the record must already
/// carry its ticket.
fn assign_project(
    record: &mut TimesheetRecord,
    profile: &Profile,
    alias: &str,
) -> anyhow::Result<()> {
    let project = profile.alias(alias)?;
    if project.needs_ticket && !record.has_ticket() {
        return Err(anyhow!("project '{alias}' requires a ticket number"));
    }
    record.project_sales_order = project.sales_order;
    record.project_sales_order_line = project.sales_order_line;
    record.project_name = alias.to_string();
    Ok(())
}

fn apply_overrides(
    original: &TimesheetRecord,
    overrides: &EditOverrides,
    profile: &Profile,
    types: &TypeTable,
) -> anyhow::Result<TimesheetRecord> {
    let mut record = original.clone();
    record.id = 0;

    if let Some(description) = &overrides.description {
        record.description = description.clone();
    }
    if let Some(hours) = &overrides.hours {
        record.hours = parse_positive_hours(hours)?;
    }
    if let Some(ticket) = &overrides.ticket {
        record.ticket_number = ticket.clone();
    }
    if let Some(date) = &overrides.date {
        record.date = parse_day(date)?.format("%Y-%m-%dT00:00:00Z").to_string();
    }
    if overrides.type_name.is_some() {
        record.timesheet_type_code = resolve_type_code(types, overrides.type_name.as_deref())?;
    }
    if let Some(alias) = &overrides.project {
        assign_project(&mut record, profile, alias)?;
    }
    if record.day().is_none() {
        return Err(anyhow!(
            "timesheet {} has an unreadable date '{}'; pass --date to replace it",
            original.id,
            original.date
        ));
    }
    Ok(record)
}

fn parse_optional_day(text: Option<&str>) -> anyhow::Result<Option<NaiveDate>> {
    Ok(text.map(parse_day).transpose()?)
}

fn build_timesheet_filter(fields: &TimesheetFilterArgs) -> anyhow::Result<TimesheetFilter> {
    if let Some(pattern) = fields.description.as_deref() {
        Regex::new(pattern).with_context(|| format!("invalid description pattern '{pattern}'"))?;
    }
    if let Some(expr) = fields.quantity.as_deref() {
        parse_comparator(expr)?;
    }

    Ok(TimesheetFilter {
        from_date: parse_optional_day(fields.from.as_deref())?,
        to_date: parse_optional_day(fields.to.as_deref())?,
        ticket: fields.ticket.clone().unwrap_or_default(),
        project: fields.project.clone().unwrap_or_default(),
        has_ticket_only: fields.has_ticket_only,
        description: fields.description.clone().unwrap_or_default(),
        quantity: fields.quantity.clone().unwrap_or_default(),
        type_name: fields.type_name.clone().unwrap_or_default(),
    })
}

fn build_daily_filter(fields: &DailyFilterArgs) -> anyhow::Result<DailyFilter> {
    let status = fields
        .status
        .as_deref()
        .map(str::parse::<DayStatus>)
        .transpose()?;

    Ok(DailyFilter {
        from_date: parse_optional_day(fields.from.as_deref())?,
        to_date: parse_optional_day(fields.to.as_deref())?,
        min_daily_hours: fields.min_hours.unwrap_or_default(),
        project: fields.project.clone().unwrap_or_default(),
        user: fields.user.clone().unwrap_or_default(),
        has_ticket_only: fields.has_ticket_only,
        status,
    })
}
