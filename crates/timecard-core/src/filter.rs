use std::fmt;

use chrono::NaiveDate;
use regex::Regex;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  trace
};

use crate::config::Profile;
use crate::quantity::{
  Comparison,
  parse_comparator
};
use crate::record::{
  TimesheetRecord,
  TypeTable
};
use crate::summary::DayStatus;

/// Record-level selection. Every
/// non-empty field must hold.
#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Serialize,
  Deserialize
)]
#[serde(default)]
pub struct TimesheetFilter {
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub from_date:       Option<NaiveDate>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub to_date:         Option<NaiveDate>,
  #[serde(
    skip_serializing_if = "String::is_empty"
  )]
  pub ticket:          String,
  /// Project alias name, resolved
  /// against the active profile.
  #[serde(
    skip_serializing_if = "String::is_empty"
  )]
  pub project:         String,
  #[serde(skip_serializing_if = "is_false")]
  pub has_ticket_only: bool,
  /// Regular expression searched in
  /// the description.
  #[serde(
    skip_serializing_if = "String::is_empty"
  )]
  pub description:     String,
  /// Comparator expression such as
  /// `>=8`.
  #[serde(
    skip_serializing_if = "String::is_empty"
  )]
  pub quantity:        String,
  #[serde(
    rename = "type",
    skip_serializing_if = "String::is_empty"
  )]
  pub type_name:       String
}

/// Day-level selection applied before
/// grouping records by date.
#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Serialize,
  Deserialize
)]
#[serde(default)]
pub struct DailyFilter {
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub from_date:       Option<NaiveDate>,
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub to_date:         Option<NaiveDate>,
  pub min_daily_hours: f64,
  /// Case-insensitive substring of
  /// the project name.
  #[serde(
    skip_serializing_if = "String::is_empty"
  )]
  pub project:         String,
  /// Case-insensitive substring of
  /// the project manager name.
  #[serde(
    skip_serializing_if = "String::is_empty"
  )]
  pub user:            String,
  #[serde(skip_serializing_if = "is_false")]
  pub has_ticket_only: bool,
  /// Keeps only summarized days with
  /// this status.
  #[serde(
    skip_serializing_if = "Option::is_none"
  )]
  pub status:          Option<DayStatus>
}

fn is_false(value: &bool) -> bool {
  !*value
}

#[derive(Debug, Clone)]
enum Pred {
  FromDate(NaiveDate),
  ToDate(NaiveDate),
  TicketContains(String),
  HasTicket,
  /// `None` when the alias is unknown:
  /// nothing matches.
  Project(Option<(i64, i64)>),
  /// `None` when the pattern does not
  /// compile: nothing matches.
  Description(Option<Regex>),
  /// `None` when the expression is
  /// malformed: nothing matches.
  Quantity(Option<Comparison>),
  /// `None` when the type name is
  /// unknown: nothing matches.
  TypeCode(Option<String>)
}

/// A `TimesheetFilter` with its alias,
/// pattern, comparator and type
/// resolved once.
#[derive(Debug, Clone, Default)]
pub struct RecordMatcher {
  preds: Vec<Pred>
}

impl TimesheetFilter {
  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }

  #[tracing::instrument(skip(
    self, profile, types
  ))]
  pub fn compile(
    &self,
    profile: &Profile,
    types: &TypeTable
  ) -> RecordMatcher {
    let mut preds = Vec::new();

    if let Some(from) = self.from_date
    {
      preds.push(Pred::FromDate(from));
    }
    if let Some(to) = self.to_date {
      preds.push(Pred::ToDate(to));
    }
    if !self.ticket.is_empty() {
      preds.push(Pred::TicketContains(
        self.ticket.clone()
      ));
    }
    if self.has_ticket_only {
      preds.push(Pred::HasTicket);
    }
    if !self.description.is_empty() {
      let re =
        Regex::new(&self.description)
          .inspect_err(|err| {
            debug!(
              pattern = %self.description,
              error = %err,
              "description pattern does not compile"
            );
          })
          .ok();
      preds.push(Pred::Description(re));
    }
    if !self.quantity.is_empty() {
      let cmp =
        parse_comparator(&self.quantity)
          .inspect_err(|err| {
            debug!(error = %err, "quantity clause never matches");
          })
          .ok();
      preds.push(Pred::Quantity(cmp));
    }
    if !self.project.is_empty() {
      let key = profile
        .project_aliases
        .get(&self.project)
        .map(|alias| alias.key());
      if key.is_none() {
        debug!(
          alias = %self.project,
          "project alias not in profile"
        );
      }
      preds.push(Pred::Project(key));
    }
    if !self.type_name.is_empty() {
      let code = types
        .code_for(&self.type_name)
        .map(str::to_string);
      if code.is_none() {
        debug!(
          type_name = %self.type_name,
          "unknown timesheet type"
        );
      }
      preds.push(Pred::TypeCode(code));
    }

    RecordMatcher {
      preds
    }
  }
}

impl fmt::Display for TimesheetFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    let mut parts = Vec::new();
    push_date(
      &mut parts,
      "from",
      self.from_date
    );
    push_date(
      &mut parts,
      "to",
      self.to_date
    );
    push_text(
      &mut parts,
      "ticket",
      &self.ticket
    );
    push_text(
      &mut parts,
      "project",
      &self.project
    );
    if self.has_ticket_only {
      parts.push(
        "has-ticket-only".to_string()
      );
    }
    push_text(
      &mut parts,
      "description",
      &self.description
    );
    push_text(
      &mut parts,
      "quantity",
      &self.quantity
    );
    push_text(
      &mut parts,
      "type",
      &self.type_name
    );
    write_parts(f, &parts)
  }
}

impl fmt::Display for DailyFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    let mut parts = Vec::new();
    push_date(
      &mut parts,
      "from",
      self.from_date
    );
    push_date(
      &mut parts,
      "to",
      self.to_date
    );
    if self.min_daily_hours > 0.0 {
      parts.push(format!(
        "min-hours={}",
        self.min_daily_hours
      ));
    }
    push_text(
      &mut parts,
      "project",
      &self.project
    );
    push_text(
      &mut parts,
      "user",
      &self.user
    );
    if self.has_ticket_only {
      parts.push(
        "has-ticket-only".to_string()
      );
    }
    if let Some(status) = self.status {
      parts
        .push(format!("status={status}"));
    }
    write_parts(f, &parts)
  }
}

fn push_date(
  parts: &mut Vec<String>,
  label: &str,
  value: Option<NaiveDate>
) {
  if let Some(day) = value {
    parts.push(format!(
      "{label}={}",
      day.format("%Y-%m-%d")
    ));
  }
}

fn push_text(
  parts: &mut Vec<String>,
  label: &str,
  value: &str
) {
  if !value.is_empty() {
    parts.push(format!("{label}={value}"));
  }
}

fn write_parts(
  f: &mut fmt::Formatter<'_>,
  parts: &[String]
) -> fmt::Result {
  if parts.is_empty() {
    f.write_str("(matches everything)")
  } else {
    f.write_str(&parts.join(" "))
  }
}

impl RecordMatcher {
  pub fn matches(
    &self,
    record: &TimesheetRecord
  ) -> bool {
    let Some(day) = record.day() else {
      trace!(
        id = record.id,
        date = %record.date,
        "unparsable record date"
      );
      return false;
    };

    self.preds.iter().all(|pred| {
      eval_pred(pred, record, day)
    })
  }
}

fn eval_pred(
  pred: &Pred,
  record: &TimesheetRecord,
  day: NaiveDate
) -> bool {
  let ok = match pred {
    | Pred::FromDate(from) => {
      day >= *from
    }
    | Pred::ToDate(to) => day <= *to,
    | Pred::TicketContains(text) => {
      record
        .ticket_number
        .contains(text.as_str())
    }
    | Pred::HasTicket => {
      record.has_ticket()
    }
    | Pred::Project(key) => {
      key
        .map(|key| {
          record.project_key() == key
        })
        .unwrap_or(false)
    }
    | Pred::Description(re) => {
      re.as_ref()
        .map(|re| {
          re.is_match(&record.description)
        })
        .unwrap_or(false)
    }
    | Pred::Quantity(cmp) => {
      cmp
        .map(|cmp| {
          cmp.evaluate(record.hours)
        })
        .unwrap_or(false)
    }
    | Pred::TypeCode(code) => {
      code.as_deref()
        == Some(
          record
            .timesheet_type_code
            .as_str()
        )
    }
  };

  trace!(pred = ?pred, id = record.id, ok, "filter predicate evaluation");
  ok
}

/// Records matching `filter`, in input
/// order.
#[tracing::instrument(skip_all, fields(
  input = records.len()
))]
pub fn apply_filter(
  records: &[TimesheetRecord],
  filter: &TimesheetFilter,
  profile: &Profile,
  types: &TypeTable
) -> Vec<TimesheetRecord> {
  let matcher =
    filter.compile(profile, types);
  let out: Vec<TimesheetRecord> =
    records
      .iter()
      .filter(|record| {
        matcher.matches(record)
      })
      .cloned()
      .collect();
  debug!(
    kept = out.len(),
    "applied timesheet filter"
  );
  out
}

/// Records passing the day-level
/// clauses, in input order.
#[tracing::instrument(skip_all, fields(
  input = records.len()
))]
pub fn apply_daily_filter(
  records: &[TimesheetRecord],
  filter: &DailyFilter
) -> Vec<TimesheetRecord> {
  let project =
    filter.project.to_lowercase();
  let user = filter.user.to_lowercase();

  records
    .iter()
    .filter(|record| {
      let Some(day) = record.day()
      else {
        return false;
      };
      if filter
        .from_date
        .is_some_and(|from| day < from)
        || filter
          .to_date
          .is_some_and(|to| day > to)
      {
        return false;
      }
      if !project.is_empty()
        && !record
          .project_name
          .to_lowercase()
          .contains(&project)
      {
        return false;
      }
      if !user.is_empty()
        && !record
          .project_manager_name
          .to_lowercase()
          .contains(&user)
      {
        return false;
      }
      !filter.has_ticket_only
        || record.has_ticket()
    })
    .cloned()
    .collect()
}
