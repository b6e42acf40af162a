//! Best-effort JSON object extraction from model text.
//!
//! Small models asked for "JSON only" still wrap the object in prose or code
//! fences, or leave a trailing comma. This module digs the first usable
//! `{...}` block out of such text. It never errors: anything it cannot
//! recover is `None`.

use serde_json::Value;

/// Return the first balanced `{...}` block in `text` that parses as a JSON
/// object.
///
/// Braces inside string literals are ignored. When a balanced block fails to
/// parse even after trailing commas are removed, the scan resumes at the
/// next `{`.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let mut from = 0;
    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        if let Some(end) = find_matching_brace(text, start) {
            let candidate = &text[start..=end];
            if let Some(value) = parse_object(candidate) {
                return Some(value);
            }
        }
        from = start + 1;
    }
    None
}

fn parse_object(candidate: &str) -> Option<Value> {
    let parsed = serde_json::from_str::<Value>(candidate)
        .ok()
        .or_else(|| serde_json::from_str::<Value>(&strip_trailing_commas(candidate)).ok())?;
    parsed.is_object().then_some(parsed)
}

/// Byte index of the `}` closing the `{` at `start`.
fn find_matching_brace(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop commas that directly precede `}` or `]` (outside strings).
fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }

        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let v = extract_json_object(r#"{"tier":"simple","reason":"listing"}"#).unwrap();
        assert_eq!(v["tier"], "simple");
    }

    #[test]
    fn test_object_wrapped_in_prose_and_fences() {
        let text = "Sure! Here you go:\n```json\n{\"tier\": \"deep\", \"reason\": \"edits\"}\n```\nThanks";
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["tier"], "deep");
        assert_eq!(v["reason"], "edits");
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"{"tier":"simple","reason":"user typed } and { here"}"#;
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["reason"], "user typed } and { here");
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let text = r#"noise {"reason":"say \"hi\" }","tier":"simple"} tail"#;
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["tier"], "simple");
    }

    #[test]
    fn test_trailing_comma_repaired() {
        let v = extract_json_object(r#"{"tier":"simple","reason":"x",}"#).unwrap();
        assert_eq!(v["tier"], "simple");
    }

    #[test]
    fn test_skips_unparseable_block() {
        let text = r#"{not json} then {"tier":"deep"}"#;
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["tier"], "deep");
    }

    #[test]
    fn test_nested_object_returned_whole() {
        let v = extract_json_object(r#"{"a":{"b":1},"tier":"simple"}"#).unwrap();
        assert_eq!(v["a"]["b"], 1);
        assert_eq!(v["tier"], "simple");
    }

    #[test]
    fn test_no_object() {
        assert!(extract_json_object("").is_none());
        assert!(extract_json_object("simple").is_none());
        assert!(extract_json_object("{\"tier\": \"simple\"").is_none());
        assert!(extract_json_object("}{").is_none());
    }

    #[test]
    fn test_hebrew_text_around_object() {
        let v = extract_json_object("תשובה: {\"tier\":\"simple\",\"reason\":\"רשימה\"}").unwrap();
        assert_eq!(v["reason"], "רשימה");
    }
}
