// src/ingest/text.rs
//! Small matchers shared by the HTML and ICS adapters.

use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

/// `jan`..`dec`, matched on the first three letters (so "March" and "Mar" agree).
pub fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim().to_ascii_lowercase();
    let prefix = lower.get(..3)?;
    let m = match prefix {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(m)
}

fn to_24h(hour: u32, pm: bool) -> u32 {
    match (hour, pm) {
        (12, false) => 0,
        (h, true) if h < 12 => h + 12,
        (h, _) => h,
    }
}

/// First `H[:MM] am|pm` in `s`, also accepting `a.m.` / `p.m.`.
pub fn parse_clock(s: &str) -> Option<(u32, u32)> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?\s*m\b\.?").unwrap());
    let caps = RE.captures(s)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    if !(1..=12).contains(&hour) || minute > 59 {
        return None;
    }
    let pm = caps[3].eq_ignore_ascii_case("p");
    Some((to_24h(hour, pm), minute))
}

/// `H:MM-H:MM AM|PM` where only the end carries the marker; it applies to both ends.
pub fn parse_clock_range(s: &str) -> Option<((u32, u32), (u32, u32))> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)(\d{1,2}):(\d{2})\s*-\s*(\d{1,2}):(\d{2})\s*(am|pm)").unwrap()
    });
    let caps = RE.captures(s)?;
    let nums: Vec<u32> = (1..=4)
        .map(|i| caps[i].parse::<u32>().ok())
        .collect::<Option<_>>()?;
    if nums[1] > 59 || nums[3] > 59 || !(1..=12).contains(&nums[0]) || !(1..=12).contains(&nums[2]) {
        return None;
    }
    let pm = caps[5].eq_ignore_ascii_case("pm");
    Some(((to_24h(nums[0], pm), nums[1]), (to_24h(nums[2], pm), nums[3])))
}

/// `Month Day` anywhere in `s` (e.g. "Jan 24", "March 13", "Thu Apr 16").
pub fn parse_month_day(s: &str) -> Option<(u32, u32)> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})\b")
            .unwrap()
    });
    let caps = RE.captures(s)?;
    let month = month_from_name(&caps[1])?;
    let day: u32 = caps[2].parse().ok()?;
    (1..=31).contains(&day).then_some((month, day))
}

/// Year for a month/day printed without one: this year, unless that date lies
/// more than `grace_days` behind `today`, in which case next year.
pub fn infer_year(today: NaiveDate, month: u32, day: u32, grace_days: i64) -> Option<i32> {
    use chrono::Datelike;
    let year = today.year();
    let candidate = NaiveDate::from_ymd_opt(year, month, day)?;
    if candidate < today - Duration::days(grace_days) {
        NaiveDate::from_ymd_opt(year + 1, month, day).map(|_| year + 1)
    } else {
        Some(year)
    }
}

/// Undo the iCalendar TEXT escapes the parser leaves in place (`\,` `\;`
/// `\n`). Any other backslash is literal text and is kept.
pub fn unescape_ics_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') | Some('N') => {
                chars.next();
                out.push('\n');
            }
            Some(&escaped @ (',' | ';')) => {
                chars.next();
                out.push(escaped);
            }
            _ => out.push('\\'),
        }
    }
    out
}

/// Lowercase ASCII slug: runs of anything else collapse into one `-`.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn months_by_prefix() {
        assert_eq!(month_from_name("Jan"), Some(1));
        assert_eq!(month_from_name("march"), Some(3));
        assert_eq!(month_from_name("Sept"), Some(9));
        assert_eq!(month_from_name("No"), None);
        assert_eq!(month_from_name("Thu"), None);
    }

    #[test]
    fn clock_variants() {
        assert_eq!(parse_clock("10:30 a.m."), Some((10, 30)));
        assert_eq!(parse_clock("1 p.m."), Some((13, 0)));
        assert_eq!(parse_clock("12 pm"), Some((12, 0)));
        assert_eq!(parse_clock("12:15am"), Some((0, 15)));
        assert_eq!(parse_clock("Show: 7:00 pm"), Some((19, 0)));
        assert_eq!(parse_clock("noon"), None);
        assert_eq!(parse_clock("13:00 pm"), None);
    }

    #[test]
    fn clock_ranges_share_marker() {
        assert_eq!(parse_clock_range("7:00-9:00PM"), Some(((19, 0), (21, 0))));
        assert_eq!(parse_clock_range("8:30 - 10:30 pm"), Some(((20, 30), (22, 30))));
        assert_eq!(parse_clock_range("Time TBD"), None);
    }

    #[test]
    fn month_day_in_context() {
        assert_eq!(parse_month_day("Jan 24"), Some((1, 24)));
        assert_eq!(parse_month_day("Thu Apr 16"), Some((4, 16)));
        assert_eq!(parse_month_day("March 13"), Some((3, 13)));
        assert_eq!(parse_month_day("No Show in February"), None);
    }

    #[test]
    fn year_rolls_forward_after_grace() {
        let today = NaiveDate::from_ymd_opt(2026, 11, 20).unwrap();
        assert_eq!(infer_year(today, 12, 5, 60), Some(2026));
        assert_eq!(infer_year(today, 10, 1, 60), Some(2026));
        assert_eq!(infer_year(today, 4, 16, 60), Some(2027));
        assert_eq!(infer_year(today, 2, 30, 60), None);
    }

    #[test]
    fn ics_unescape() {
        assert_eq!(unescape_ics_text(r"Haas Pavilion\, Berkeley"), "Haas Pavilion, Berkeley");
        assert_eq!(unescape_ics_text(r"a\nb\;c"), "a\nb;c");
        assert_eq!(unescape_ics_text(r"Path C:\temp\, line"), "Path C:\\temp, line");
    }

    #[test]
    fn slugs() {
        assert_eq!(slugify("  My Club's Calendar! "), "my-club-s-calendar");
        assert_eq!(slugify("SF Jazz 2026"), "sf-jazz-2026");
    }
}
