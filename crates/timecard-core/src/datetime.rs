use chrono::{
  DateTime,
  Local,
  NaiveDate,
  NaiveDateTime,
  Utc
};
use chrono_tz::Tz;

use crate::error::{
  Error,
  FormatKind,
  Result
};

pub const TIMEZONE_ENV_VAR: &str =
  "TIMECARD_TIMEZONE";

const MONTH_NAMES: [&str; 12] = [
  "January",
  "February",
  "March",
  "April",
  "May",
  "June",
  "July",
  "August",
  "September",
  "October",
  "November",
  "December"
];

/// Date component of a service
/// timestamp.
///
/// RFC 3339 timestamps keep the date
/// in their own offset; naive
/// timestamps and bare dates are taken
/// as-is.
#[must_use]
pub fn parse_record_day(
  raw: &str
) -> Option<NaiveDate> {
  let raw = raw.trim();
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(raw)
  {
    return Some(dt.date_naive());
  }
  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      raw,
      "%Y-%m-%dT%H:%M:%S"
    )
  {
    return Some(ndt.date());
  }
  NaiveDate::parse_from_str(
    raw, "%Y-%m-%d"
  )
  .ok()
}

pub fn parse_day(
  text: &str
) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(
    text.trim(),
    "%Y-%m-%d"
  )
  .map_err(|_| {
    Error::format(
      FormatKind::Date,
      text
    )
  })
}

pub fn first_of_month(
  year: i32,
  month: u32
) -> Result<NaiveDate> {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .ok_or_else(|| {
    Error::format(
      FormatKind::Date,
      format!("{year:04}-{month:02}")
    )
  })
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> Result<u32> {
  let first =
    first_of_month(year, month)?;
  let (next_year, next_month) =
    shift_month(year, month, 1);
  let next = first_of_month(
    next_year, next_month
  )?;
  Ok(
    next
      .signed_duration_since(first)
      .num_days() as u32
  )
}

/// Moves `delta` months away from
/// `(year, month)`, rolling the year.
#[must_use]
pub fn shift_month(
  year: i32,
  month: u32,
  delta: i32
) -> (i32, u32) {
  let zero_based = year * 12
    + (month as i32 - 1)
    + delta;
  (
    zero_based.div_euclid(12),
    zero_based.rem_euclid(12) as u32
      + 1
  )
}

#[must_use]
pub fn month_name(
  month: u32
) -> &'static str {
  month
    .checked_sub(1)
    .and_then(|idx| {
      MONTH_NAMES.get(idx as usize)
    })
    .copied()
    .unwrap_or("")
}

#[must_use]
pub fn parse_month_name(
  token: &str
) -> Option<u32> {
  MONTH_NAMES
    .iter()
    .position(|name| {
      name.eq_ignore_ascii_case(
        token.trim()
      )
    })
    .map(|idx| idx as u32 + 1)
}

/// Resolves the timezone used to
/// decide which day is "today".
///
/// `TIMECARD_TIMEZONE` wins over the
/// configured value. `None` means the
/// local clock of the machine.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return Some(tz);
  }

  configured.and_then(|raw| {
    parse_timezone(raw, "config")
  })
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "resolved timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::warn!(
        source,
        timezone = %trimmed,
        error = %err,
        "invalid timezone; using local clock"
      );
      None
    }
  }
}

#[must_use]
pub fn today(
  tz: Option<Tz>
) -> NaiveDate {
  match tz {
    | Some(tz) => {
      Utc::now()
        .with_timezone(&tz)
        .date_naive()
    }
    | None => {
      Local::now().date_naive()
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::{
    days_in_month,
    month_name,
    parse_day,
    parse_month_name,
    parse_record_day,
    shift_month
  };

  #[test]
  fn record_day_accepts_service_layouts()
  {
    let day =
      NaiveDate::from_ymd_opt(
        2025, 7, 1
      );
    assert_eq!(
      parse_record_day(
        "2025-07-01T00:00:00Z"
      ),
      day
    );
    assert_eq!(
      parse_record_day(
        "2025-07-01T23:30:00-03:00"
      ),
      day
    );
    assert_eq!(
      parse_record_day(
        "2025-07-01T08:00:00"
      ),
      day
    );
    assert_eq!(
      parse_record_day("2025-07-01"),
      day
    );
    assert_eq!(
      parse_record_day("07/01/2025"),
      None
    );
  }

  #[test]
  fn parse_day_rejects_garbage() {
    assert!(parse_day("2025-02-30")
      .is_err());
    assert_eq!(
      parse_day("2025-02-28")
        .unwrap(),
      NaiveDate::from_ymd_opt(
        2025, 2, 28
      )
      .unwrap()
    );
  }

  #[test]
  fn month_arithmetic_rolls_years() {
    assert_eq!(
      shift_month(2025, 1, -1),
      (2024, 12)
    );
    assert_eq!(
      shift_month(2025, 12, 1),
      (2026, 1)
    );
    assert_eq!(
      days_in_month(2024, 2).unwrap(),
      29
    );
    assert_eq!(
      days_in_month(2025, 2).unwrap(),
      28
    );
    assert!(
      days_in_month(2025, 13).is_err()
    );
  }

  #[test]
  fn month_names_round_trip() {
    assert_eq!(month_name(7), "July");
    assert_eq!(month_name(0), "");
    assert_eq!(
      parse_month_name("july"),
      Some(7)
    );
    assert_eq!(
      parse_month_name("Julho"),
      None
    );
  }
}
