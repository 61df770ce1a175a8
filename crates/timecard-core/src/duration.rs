use regex::Regex;
use tracing::trace;

use crate::error::{Error, FormatKind, Result};

pub const HOURS_PER_DAY: f64 = 8.0;
pub const HOURS_PER_WEEK: f64 = 5.0 * HOURS_PER_DAY;

/// Converts a duration such as `1d 2h30m` (or a bare `7.5`) into hours.
///
/// Unit tokens are summed left to right: `w` is a 5-day work week, `d` an
/// 8-hour day, `h` an hour and `m` a minute. Text with no unit token at all
/// is read as a decimal number of hours; empty text is zero.
pub fn parse_duration(text: &str) -> Result<f64> {
    let token_re = Regex::new(r"(\d+)([wdhm])")
        .map_err(|_| Error::format(FormatKind::Duration, text))?;

    let mut total = 0.0;
    let mut matched = false;

    for caps in token_re.captures_iter(text) {
        matched = true;
        let value: f64 = caps[1]
            .parse()
            .map_err(|_| Error::format(FormatKind::Duration, &caps[1]))?;
        let hours = match &caps[2] {
            "w" => value * HOURS_PER_WEEK,
            "d" => value * HOURS_PER_DAY,
            "h" => value,
            "m" => value / 60.0,
            other => return Err(Error::format(FormatKind::Duration, other)),
        };
        trace!(token = &caps[0], hours, "duration token");
        total += hours;
    }

    if matched {
        return Ok(total);
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }

    trimmed
        .parse::<f64>()
        .ok()
        .filter(|hours| hours.is_finite())
        .ok_or_else(|| Error::format(FormatKind::Duration, text))
}

#[cfg(test)]
mod tests {
    use super::parse_duration;
    use crate::error::{Error, FormatKind};

    #[test]
    fn sums_unit_tokens() {
        assert_eq!(parse_duration("1d2h").unwrap(), 10.0);
        assert_eq!(parse_duration("1d 2h").unwrap(), 10.0);
        assert_eq!(parse_duration("90m").unwrap(), 1.5);
        assert_eq!(parse_duration("2h30m").unwrap(), 2.5);
    }

    #[test]
    fn week_is_five_work_days() {
        assert_eq!(parse_duration("1w").unwrap(), 40.0);
        assert_eq!(parse_duration("1w1d").unwrap(), 48.0);
    }

    #[test]
    fn bare_numbers_are_hours() {
        assert_eq!(parse_duration("8").unwrap(), 8.0);
        assert_eq!(parse_duration("7.5").unwrap(), 7.5);
        assert_eq!(parse_duration("").unwrap(), 0.0);
    }

    #[test]
    fn rejects_text_without_tokens() {
        assert_eq!(
            parse_duration("abc"),
            Err(Error::format(FormatKind::Duration, "abc"))
        );
        assert!(parse_duration("NaN").is_err());
    }
}
