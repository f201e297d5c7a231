use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static YEAR_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4}$").expect("valid regex"));
static YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<year>[0-9]{4})(?:-(?P<month>[0-9]{2}))?$").expect("valid regex"));

const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M%#z",
];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// True when a folder name is a bucket name: exactly four ASCII digits.
pub fn is_year_name(name: &str) -> bool {
    YEAR_NAME.is_match(name)
}

/// Parses a `periodStart` value into a UTC instant. Offsets are honoured;
/// values without an offset are read as UTC. `YYYY` and `YYYY-MM` stand for
/// the first day of that year or month.
pub fn parse_period_start(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    let with_offset = match trimmed.strip_suffix(['Z', 'z']) {
        Some(head) => format!("{}+00:00", head),
        None => trimmed.to_string(),
    };
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(&with_offset, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    let captures = YEAR_MONTH.captures(trimmed)?;
    let year = captures["year"].parse().ok()?;
    let month = match captures.name("month") {
        Some(month) => month.as_str().parse().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Derives the bucket name for a `periodStart`: its UTC calendar year as four
/// decimal digits. `None` means the document cannot be classified.
pub fn bucket_year(period_start: Option<&str>) -> Option<String> {
    let instant = parse_period_start(period_start?)?;
    let year = instant.year();
    if !(0..=9999).contains(&year) {
        return None;
    }
    Some(format!("{:04}", year))
}
