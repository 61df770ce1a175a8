use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "timecard",
    version,
    about = "Log, filter and summarize timesheet appointments",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Config file to use instead of the default location.
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Profile to act as; defaults to `default_profile`.
    #[arg(short = 'P', long = "profile", global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log a new appointment.
    Appoint {
        #[arg(short = 'd', long = "description")]
        description: String,

        /// Duration such as `8`, `7.5`, `1d2h` or `90m`.
        #[arg(short = 'H', long = "hours")]
        hours: String,

        /// YYYY-MM-DD; defaults to today.
        #[arg(short = 'D', long = "date")]
        date: Option<String>,

        /// Project alias from the active profile.
        #[arg(short = 'p', long = "project")]
        project: String,

        #[arg(short = 't', long = "ticket")]
        ticket: Option<String>,

        /// Timesheet type name.
        #[arg(short = 'T', long = "type")]
        type_name: Option<String>,
    },

    /// List the appointments of a month.
    List {
        #[command(flatten)]
        period: MonthArgs,

        /// Saved timesheet filter to apply.
        #[arg(long = "filter")]
        filter: Option<String>,
    },

    /// Delete one appointment.
    Delete {
        #[arg(short = 'i', long = "id")]
        id: u64,
    },

    /// Re-create appointments with some fields replaced.
    Edit {
        #[arg(short = 'i', long = "id", required_unless_present = "filter", conflicts_with = "filter")]
        id: Option<u64>,

        /// Edit every entry of the month matching this saved filter.
        #[arg(long = "filter")]
        filter: Option<String>,

        #[command(flatten)]
        period: MonthArgs,

        #[arg(short = 'd', long = "description")]
        description: Option<String>,

        #[arg(short = 'H', long = "hours")]
        hours: Option<String>,

        #[arg(short = 't', long = "ticket")]
        ticket: Option<String>,

        #[arg(short = 'p', long = "project")]
        project: Option<String>,

        #[arg(short = 'D', long = "date")]
        date: Option<String>,

        #[arg(short = 'T', long = "type")]
        type_name: Option<String>,
    },

    /// Revert the last edit.
    Undo,

    /// Show a month calendar coloured by logged hours.
    Cal {
        #[arg(long = "year")]
        year: Option<i32>,

        #[arg(long = "month")]
        month: Option<u32>,

        /// Show the appointments of this day instead of the grid.
        #[arg(short = 'd', long = "day")]
        day: Option<u32>,

        /// Saved timesheet filter to apply.
        #[arg(short = 'F', long = "filter")]
        filter: Option<String>,

        /// Refresh the cache from the timesheet service.
        #[arg(short = 'f', long = "force")]
        force: bool,
    },

    /// Per-day totals with weekly and monthly roll-ups.
    DateSummary {
        #[arg(short = 'y', long = "year")]
        year: Option<i32>,

        /// Month number; the whole year when omitted together with `--year`.
        #[arg(short = 'm', long = "month")]
        month: Option<u32>,

        #[arg(long = "filter-day")]
        filter_day: Option<String>,

        #[arg(long = "filter-timesheet")]
        filter_timesheet: Option<String>,
    },

    /// Manage saved timesheet filters.
    FilterTimesheets {
        #[command(flatten)]
        action: SavedAction,

        #[command(flatten)]
        fields: TimesheetFilterArgs,
    },

    /// Manage saved day filters.
    FilterDays {
        #[command(flatten)]
        action: SavedAction,

        #[command(flatten)]
        fields: DailyFilterArgs,
    },

    /// List profiles, or create, update, remove or select one.
    Profiles {
        #[command(subcommand)]
        action: Option<ProfileAction>,
    },

    /// Manage the project aliases of the active profile.
    #[command(subcommand)]
    Alias(AliasAction),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ProfileAction {
    /// Create a profile, or update the given fields of an existing one.
    Add {
        name: String,

        #[arg(long = "user-id")]
        user_id: Option<u64>,

        #[arg(long = "employee-name")]
        employee_name: Option<String>,

        #[arg(long = "email")]
        email: Option<String>,

        #[arg(long = "employee-code")]
        employee_code: Option<u64>,

        /// Expected hours per day.
        #[arg(long = "journey")]
        journey: Option<f64>,

        /// Also make it the default profile.
        #[arg(long = "default")]
        make_default: bool,
    },

    /// Make an existing profile the default.
    #[command(name = "default")]
    SetDefault { name: String },

    Remove { name: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AliasAction {
    /// Map a short name to a project's sales order and line.
    Add {
        name: String,

        #[arg(long = "sales-order")]
        sales_order: i64,

        #[arg(long = "line")]
        line: i64,

        /// Appointments on this project must carry a ticket.
        #[arg(long = "needs-ticket")]
        needs_ticket: bool,
    },

    Remove { name: String },
}

#[derive(Args, Debug, Clone, Default)]
pub struct MonthArgs {
    #[arg(short = 'y', long = "year")]
    pub year: Option<i32>,

    #[arg(short = 'm', long = "month")]
    pub month: Option<u32>,
}

#[derive(Args, Debug, Clone, Default)]
#[group(required = true, multiple = false)]
pub struct SavedAction {
    /// Save the filter under this name.
    #[arg(long = "save")]
    pub save: Option<String>,

    #[arg(long = "list")]
    pub list: bool,

    #[arg(long = "delete")]
    pub delete: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedOp<'a> {
    Save(&'a str),
    Delete(&'a str),
    List,
}

impl SavedAction {
    /// The requested action; `None` only when no flag was given.
    pub fn op(&self) -> Option<SavedOp<'_>> {
        match (self.save.as_deref(), self.delete.as_deref(), self.list) {
            (Some(name), _, _) => Some(SavedOp::Save(name)),
            (_, Some(name), _) => Some(SavedOp::Delete(name)),
            (_, _, true) => Some(SavedOp::List),
            _ => None,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct TimesheetFilterArgs {
    #[arg(long = "from")]
    pub from: Option<String>,

    #[arg(long = "to")]
    pub to: Option<String>,

    #[arg(long = "ticket")]
    pub ticket: Option<String>,

    #[arg(long = "project")]
    pub project: Option<String>,

    #[arg(long = "has-ticket-only")]
    pub has_ticket_only: bool,

    #[arg(long = "type")]
    pub type_name: Option<String>,

    /// Regular expression matched against the description.
    #[arg(long = "description")]
    pub description: Option<String>,

    /// Comparator such as `>=8`.
    #[arg(long = "quantity")]
    pub quantity: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DailyFilterArgs {
    #[arg(long = "from")]
    pub from: Option<String>,

    #[arg(long = "to")]
    pub to: Option<String>,

    #[arg(long = "min-hours")]
    pub min_hours: Option<f64>,

    #[arg(long = "project")]
    pub project: Option<String>,

    #[arg(long = "user")]
    pub user: Option<String>,

    #[arg(long = "has-ticket-only")]
    pub has_ticket_only: bool,

    /// MISSING, OK or OVERTIME.
    #[arg(long = "status")]
    pub status: Option<String>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{AliasAction, Command, GlobalCli, ProfileAction, SavedOp};

    #[test]
    fn parses_appoint_with_globals() {
        let cli = GlobalCli::parse_from([
            "timecard", "-vv", "-P", "work", "appoint", "-d", "review", "-H", "1d2h", "-p",
            "core", "-t", "T-12",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.profile.as_deref(), Some("work"));
        match cli.command {
            Command::Appoint {
                hours,
                project,
                ticket,
                date,
                ..
            } => {
                assert_eq!(hours, "1d2h");
                assert_eq!(project, "core");
                assert_eq!(ticket.as_deref(), Some("T-12"));
                assert!(date.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn edit_needs_id_or_filter() {
        assert!(GlobalCli::try_parse_from(["timecard", "edit", "-H", "2"]).is_err());
        assert!(
            GlobalCli::try_parse_from(["timecard", "edit", "-i", "3", "--filter", "x"]).is_err()
        );
        assert!(GlobalCli::try_parse_from(["timecard", "edit", "--filter", "x", "-H", "2"]).is_ok());
    }

    #[test]
    fn saved_filter_actions_are_exclusive() {
        assert!(
            GlobalCli::try_parse_from(["timecard", "filter-days", "--save", "a", "--list"]).is_err()
        );
        let cli = GlobalCli::try_parse_from([
            "timecard",
            "filter-timesheets",
            "--save",
            "long",
            "--quantity",
            ">=8",
        ])
        .unwrap();
        match cli.command {
            Command::FilterTimesheets { action, fields } => {
                assert_eq!(action.save.as_deref(), Some("long"));
                assert_eq!(fields.quantity.as_deref(), Some(">=8"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn saved_filter_action_is_required_and_explicit() {
        assert!(GlobalCli::try_parse_from(["timecard", "filter-days"]).is_err());

        let cli = GlobalCli::try_parse_from(["timecard", "filter-days", "--list"]).unwrap();
        match cli.command {
            Command::FilterDays { action, .. } => assert_eq!(action.op(), Some(SavedOp::List)),
            other => panic!("unexpected command: {other:?}"),
        }

        let cli =
            GlobalCli::try_parse_from(["timecard", "filter-timesheets", "--delete", "old"]).unwrap();
        match cli.command {
            Command::FilterTimesheets { action, .. } => {
                assert_eq!(action.op(), Some(SavedOp::Delete("old")))
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_profile_and_alias_management() {
        let cli = GlobalCli::parse_from([
            "timecard",
            "profiles",
            "add",
            "work",
            "--user-id",
            "42",
            "--journey",
            "6",
            "--default",
        ]);
        match cli.command {
            Command::Profiles {
                action:
                    Some(ProfileAction::Add {
                        name,
                        user_id,
                        journey,
                        make_default,
                        ..
                    }),
            } => {
                assert_eq!(name, "work");
                assert_eq!(user_id, Some(42));
                assert_eq!(journey, Some(6.0));
                assert!(make_default);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = GlobalCli::parse_from(["timecard", "profiles"]);
        assert!(matches!(cli.command, Command::Profiles { action: None }));

        let cli = GlobalCli::parse_from([
            "timecard",
            "alias",
            "add",
            "core",
            "--sales-order",
            "100",
            "--line",
            "10",
            "--needs-ticket",
        ]);
        match cli.command {
            Command::Alias(AliasAction::Add {
                name,
                sales_order,
                line,
                needs_ticket,
            }) => {
                assert_eq!(name, "core");
                assert_eq!((sales_order, line), (100, 10));
                assert!(needs_ticket);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(GlobalCli::try_parse_from(["timecard", "alias", "add", "core"]).is_err());
    }

    #[test]
    fn date_summary_flags() {
        let cli = GlobalCli::parse_from([
            "timecard",
            "date-summary",
            "-y",
            "2025",
            "--filter-day",
            "missing",
        ]);
        match cli.command {
            Command::DateSummary {
                year,
                month,
                filter_day,
                ..
            } => {
                assert_eq!(year, Some(2025));
                assert_eq!(month, None);
                assert_eq!(filter_day.as_deref(), Some("missing"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
