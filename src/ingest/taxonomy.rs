// src/ingest/taxonomy.rs
//! Shared event-type vocabulary and keyword inference.

use once_cell::sync::Lazy;
use regex::Regex;

/// Canonical event-type keys with their display labels.
pub const EVENT_TYPES: &[(&str, &str)] = &[
    ("lecture", "Lecture"),
    ("exhibition", "Exhibition"),
    ("performance", "Performance"),
    ("sports", "Sports"),
    ("workshop", "Workshop"),
    ("conference", "Conference"),
    ("seminar", "Seminar"),
    ("concert", "Concert"),
    ("film", "Film"),
    ("astronomy", "Astronomy"),
    ("social", "Social"),
    ("other", "Other"),
];

const EVENT_TYPE_ALIASES: &[(&str, &str)] = &[
    ("exhibit", "exhibition"),
    ("exhibits", "exhibition"),
    ("gallery", "exhibition"),
    ("art exhibit", "exhibition"),
    ("art exhibition", "exhibition"),
    ("talk", "lecture"),
    ("talks", "lecture"),
    ("presentation", "lecture"),
    ("lecture/panel", "lecture"),
    ("lecture/presentation/talk", "lecture"),
    ("performing arts", "performance"),
    ("performances", "performance"),
    ("theater", "performance"),
    ("theatre", "performance"),
    ("dance", "performance"),
    ("recital", "performance"),
    ("concerts", "concert"),
    ("music", "concert"),
    ("workshops", "workshop"),
    ("training", "workshop"),
    ("symposium", "conference"),
    ("colloquium", "conference"),
    ("forum", "conference"),
    ("seminars", "seminar"),
    ("screening", "film"),
    ("film screening", "film"),
    ("films", "film"),
    ("reception", "social"),
    ("mixer", "social"),
    ("networking", "social"),
    ("career/job", "social"),
    ("athletics", "sports"),
    ("game", "sports"),
    ("match", "sports"),
];

/// Map a free-form category string onto a canonical key.
///
/// Case-insensitive and whitespace-trimmed; unknown strings give `None`.
pub fn normalize_event_type(raw: &str) -> Option<&'static str> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    EVENT_TYPES
        .iter()
        .find(|(key, _)| *key == lower)
        .map(|(key, _)| *key)
        .or_else(|| {
            EVENT_TYPE_ALIASES
                .iter()
                .find(|(alias, _)| *alias == lower)
                .map(|(_, key)| *key)
        })
}

pub fn event_type_label(key: &str) -> Option<&'static str> {
    EVENT_TYPES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| *label)
}

/// First rule whose needles occur in `haystack` (already lowercased) wins.
pub fn first_keyword_match(haystack: &str, rules: &[(&[&str], &'static str)]) -> Option<&'static str> {
    rules
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| haystack.contains(n)))
        .map(|(_, out)| *out)
}

static RE_FAMILY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(famil(y|ies)|kids?|children|all ages)\b").unwrap());
static RE_ACADEMIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(colloquium|seminar|faculty|researchers?|ph\.?d|postdocs?|dissertation|thesis)\b")
        .unwrap()
});
static RE_STUDENTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(students?|undergraduates?|grad students)\b").unwrap());
static RE_PUBLIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(open to (the )?public|public|free admission|everyone)\b").unwrap());

/// Guess an audience from title and description text.
///
/// Checked in order family, academic, students, public; `None` when nothing
/// suggests an audience.
pub fn infer_audience(text: &str) -> Option<String> {
    let audience = if RE_FAMILY.is_match(text) {
        "family"
    } else if RE_ACADEMIC.is_match(text) {
        "academic"
    } else if RE_STUDENTS.is_match(text) {
        "students"
    } else if RE_PUBLIC.is_match(text) {
        "public"
    } else {
        return None;
    };
    Some(audience.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_keys_and_aliases() {
        assert_eq!(normalize_event_type("Lecture"), Some("lecture"));
        assert_eq!(normalize_event_type("  Exhibit "), Some("exhibition"));
        assert_eq!(normalize_event_type("Film Screening"), Some("film"));
        assert_eq!(normalize_event_type("colloquium"), Some("conference"));
        assert_eq!(normalize_event_type("Berkeley Graduate Conference"), None);
        assert_eq!(normalize_event_type(""), None);
    }

    #[test]
    fn labels_exist_for_every_alias_target() {
        for (_, key) in EVENT_TYPE_ALIASES {
            assert!(event_type_label(key).is_some(), "{key} has no label");
        }
    }

    #[test]
    fn audience_inference_order() {
        assert_eq!(infer_audience("Family Science Night for kids").as_deref(), Some("family"));
        assert_eq!(infer_audience("Physics colloquium, students welcome").as_deref(), Some("academic"));
        assert_eq!(infer_audience("Student mixer").as_deref(), Some("students"));
        assert_eq!(infer_audience("Free and open to the public").as_deref(), Some("public"));
        assert_eq!(infer_audience("Quarterly board meeting"), None);
    }

    #[test]
    fn keyword_rules_first_match_wins() {
        let rules: &[(&[&str], &'static str)] = &[
            (&["planetarium", "stars"], "astronomy"),
            (&["lecture", "talk"], "lecture"),
        ];
        assert_eq!(first_keyword_match("a talk under the stars", rules), Some("astronomy"));
        assert_eq!(first_keyword_match("evening talk", rules), Some("lecture"));
        assert_eq!(first_keyword_match("gala", rules), None);
    }
}
