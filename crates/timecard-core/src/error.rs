use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Duration,
    Date,
    Quantity,
    Status,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FormatKind::Duration => "duration",
            FormatKind::Date => "date",
            FormatKind::Quantity => "quantity expression",
            FormatKind::Status => "day status",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Profile,
    ProjectAlias,
    TimesheetFilter,
    DayFilter,
    TimesheetType,
    Timesheet,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LookupKind::Profile => "profile",
            LookupKind::ProjectAlias => "project alias",
            LookupKind::TimesheetFilter => "timesheet filter",
            LookupKind::DayFilter => "day filter",
            LookupKind::TimesheetType => "timesheet type",
            LookupKind::Timesheet => "timesheet",
        };
        f.write_str(label)
    }
}

/// Failures reported by the core pipeline.
///
/// `Format` covers input that could not be parsed and is always
/// recoverable by skipping the offending value. `Lookup` covers names the
/// operator supplied that do not resolve; the command layer aborts on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid {kind}: '{input}'")]
    Format { kind: FormatKind, input: String },

    #[error("{kind} '{name}' not found")]
    Lookup { kind: LookupKind, name: String },
}

impl Error {
    pub fn format(kind: FormatKind, input: impl Into<String>) -> Self {
        Self::Format {
            kind,
            input: input.into(),
        }
    }

    pub fn lookup(kind: LookupKind, name: impl Into<String>) -> Self {
        Self::Lookup {
            kind,
            name: name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
