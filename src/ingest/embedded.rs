// src/ingest/embedded.rs
//! Pull a JSON array out of a framework-generated script payload.

/// Slice of `text` holding the JSON array that starts at the first `[` after
/// `marker`, brackets balanced.
///
/// Brackets inside JSON string literals are ignored, as are escaped quotes.
/// Returns `None` if the marker is absent or the array never closes.
pub fn extract_balanced_json_array<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let marker_at = text.find(marker)?;
    let start = marker_at + text[marker_at..].find('[')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, b) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match (escaped, b) {
                (true, _) => escaped = false,
                (false, b'\\') => escaped = true,
                (false, b'"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Undo one level of JS string escaping (`\"` and `\\`) in a script chunk.
pub fn unescape_script_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('"') | Some('\\') => {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_array_after_marker() {
        let text = r#"junk "data":[{"a":[1,2]},{"b":3}] trailing ]"#;
        let arr = extract_balanced_json_array(text, r#""data":[{"#).unwrap();
        assert_eq!(arr, r#"[{"a":[1,2]},{"b":3}]"#);
        let v: serde_json::Value = serde_json::from_str(arr).unwrap();
        assert_eq!(v.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn ignores_brackets_inside_strings() {
        let text = r#""data":[{"name":"Live [at] Shoreline \"]\""}] tail"#;
        let arr = extract_balanced_json_array(text, r#""data":["#).unwrap();
        let v: serde_json::Value = serde_json::from_str(arr).unwrap();
        assert_eq!(v[0]["name"], "Live [at] Shoreline \"]\"");
    }

    #[test]
    fn none_when_missing_or_unbalanced() {
        assert!(extract_balanced_json_array("no marker here", "\"data\":[").is_none());
        assert!(extract_balanced_json_array(r#""data":[{"a":1}"#, "\"data\":[").is_none());
    }

    #[test]
    fn unescapes_script_quotes() {
        assert_eq!(unescape_script_string(r#"{\"a\":\"b\\\\c\"}"#), r#"{"a":"b\\c"}"#);
    }
}
