use std::sync::LazyLock;

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)(?: of)?\b").expect("valid regex"));
static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(sec|second|min|minute|hour|day|week|month|year)s?\s+ago")
        .expect("valid regex")
});

const PT_MONTHS: &[(&str, &str)] = &[
    ("janeiro", "January"),
    ("fevereiro", "February"),
    ("março", "March"),
    ("marco", "March"),
    ("abril", "April"),
    ("maio", "May"),
    ("junho", "June"),
    ("julho", "July"),
    ("agosto", "August"),
    ("setembro", "September"),
    ("outubro", "October"),
    ("novembro", "November"),
    ("dezembro", "December"),
];

/// Tries each chrono format in turn; date-only formats resolve to midnight UTC.
pub fn parse_date(value: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    formats.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(value, fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(|naive| Utc.from_utc_datetime(&naive))
    })
}

/// Parses a date in the site's language. Only English and Portuguese month names
/// are understood.
pub fn parse_localized(value: &str, lang: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
    if lang.starts_with("pt") {
        parse_date(&english_months(value), formats)
    } else {
        parse_date(value, formats)
    }
}

/// "12th of Mar, 2021" -> "12 Mar, 2021".
pub fn strip_ordinals(value: &str) -> String {
    ORDINAL_RE.replace_all(value, "$1").into_owned()
}

/// "3 days ago" style dates, relative to `now`.
pub fn parse_relative(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RELATIVE_RE.captures(value)?;
    let amount: i64 = caps[1].parse().ok()?;
    let unit = caps[2].to_ascii_lowercase();
    match unit.as_str() {
        "sec" | "second" => now.checked_sub_signed(Duration::try_seconds(amount)?),
        "min" | "minute" => now.checked_sub_signed(Duration::try_minutes(amount)?),
        "hour" => now.checked_sub_signed(Duration::try_hours(amount)?),
        "day" => now.checked_sub_signed(Duration::try_days(amount)?),
        "week" => now.checked_sub_signed(Duration::try_weeks(amount)?),
        "month" => now.checked_sub_months(Months::new(u32::try_from(amount).ok()?)),
        "year" => now.checked_sub_months(Months::new(u32::try_from(amount.checked_mul(12)?).ok()?)),
        _ => None,
    }
}

/// A date as chapter and episode lists show it: one of `formats` in the
/// site language, else "N units ago" counted back from now.
pub fn parse_site_date(value: &str, lang: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
    parse_localized(value, lang, formats).or_else(|| parse_relative(value, Utc::now()))
}

pub fn from_unix_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

fn english_months(value: &str) -> String {
    let lower = value.to_lowercase();
    for (pt, en) in PT_MONTHS {
        if lower.contains(pt) {
            let replaced = lower.replacen(pt, en, 1);
            return replaced.replace(" de ", " ");
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn parses_dooplay_style_date() {
        let date = parse_date("Mar. 05, 2023", &["%b. %d, %Y", "%B. %d, %Y"]).unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2023, 3, 5));
    }

    #[test]
    fn parses_portuguese_month() {
        let date = parse_localized("Julho 4, 2022", "pt-BR", &["%B %d, %Y"]).unwrap();
        assert_eq!((date.month(), date.day()), (7, 4));
    }

    #[test]
    fn strips_ordinal_suffixes() {
        assert_eq!(strip_ordinals("21st of Jan, 2021"), "21 Jan, 2021");
        let date = parse_date(&strip_ordinals("2nd of Feb, 2020"), &["%d %b, %Y"]).unwrap();
        assert_eq!((date.month(), date.day()), (2, 2));
    }

    #[test]
    fn relative_dates_subtract_from_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let date = parse_relative("3 days ago", now).unwrap();
        assert_eq!(date.day(), 7);
        let date = parse_relative("1 month ago", now).unwrap();
        assert_eq!(date.month(), 4);
        assert!(parse_relative("yesterday", now).is_none());
    }

    #[test]
    fn huge_relative_amounts_are_none() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        assert!(parse_relative("99999999999999999 days ago", now).is_none());
        assert!(parse_relative("999999999999999999 years ago", now).is_none());
        assert!(parse_relative("99999999999 weeks ago", now).is_none());
    }

    #[test]
    fn site_dates_fall_back_to_relative() {
        let date = parse_site_date("Março 3, 2021", "pt-BR", &["%B %d, %Y"]).unwrap();
        assert_eq!((date.year(), date.month()), (2021, 3));
        let recent = parse_site_date("2 hours ago", "en", &["%B %d, %Y"]).unwrap();
        assert!(recent < Utc::now());
        assert!(Utc::now() - recent < Duration::hours(3));
        assert!(parse_site_date("soon", "en", &["%B %d, %Y"]).is_none());
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_date("", &["%Y-%m-%d"]).is_none());
        assert!(parse_date("not a date", &["%Y-%m-%d"]).is_none());
    }
}
