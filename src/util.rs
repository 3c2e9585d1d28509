//! Shared text utilities: truncation, HTML stripping, JSON object scanning.

use std::sync::OnceLock;

use regex::Regex;

/// Truncate `text` to at most `max` characters, appending an ellipsis marker
/// when anything was cut. A string of exactly `max` characters is returned
/// unchanged.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

/// Keep the last `n` lines of `text`.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>").unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

/// Reduce an HTML page to plain text: drop script/style blocks first, then
/// all remaining tags, then collapse runs of whitespace to single spaces.
pub fn strip_html(html: &str) -> String {
    let without_blocks = script_style_re().replace_all(html, " ");
    let without_tags = tag_re().replace_all(&without_blocks, " ");
    without_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the first balanced JSON object starting at or after `from`.
/// Brace counting is string-aware so braces inside string values do not
/// unbalance the scan. Returns the object slice and the index just past it.
pub fn extract_json_object_from(text: &str, from: usize) -> Option<(&str, usize)> {
    let rel = text.get(from..)?.find('{')?;
    let start = from + rel;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + i + ch.len_utf8();
                    return Some((&text[start..end], end));
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the first balanced JSON object anywhere in `text`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    extract_json_object_from(text, 0).map(|(obj, _)| obj)
}

/// Extract the first balanced JSON array starting at or after `from`.
pub fn extract_json_array_from(text: &str, from: usize) -> Option<&str> {
    let rel = text.get(from..)?.find('[')?;
    let start = from + rel;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_at_limit_is_unchanged() {
        let s = "a".repeat(2500);
        assert_eq!(truncate_chars(&s, 2500), s);
    }

    #[test]
    fn truncate_past_limit_appends_ellipsis() {
        let s = "a".repeat(2501);
        let out = truncate_chars(&s, 2500);
        assert_eq!(out.chars().count(), 2501);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn tail_lines_keeps_last_n() {
        let text = (1..=30).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let tail = tail_lines(&text, 20);
        assert!(tail.starts_with("11"));
        assert!(tail.ends_with("30"));
    }

    #[test]
    fn strip_html_removes_script_and_tags() {
        let html = "<html><head><style>body{color:red}</style></head>\
                    <body><script>var x = 1;</script><p>Hello   <b>World</b></p></body></html>";
        assert_eq!(strip_html(html), "Hello World");
    }

    #[test]
    fn strip_html_collapses_whitespace() {
        assert_eq!(strip_html("<div>a\n\n  b\t c</div>"), "a b c");
    }

    #[test]
    fn extract_json_object_simple() {
        let text = r#"prefix {"key": "value"} suffix"#;
        assert_eq!(extract_json_object(text), Some(r#"{"key": "value"}"#));
    }

    #[test]
    fn extract_json_object_nested() {
        let text = r#"{"outer": {"inner": 1}}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn extract_json_object_ignores_braces_in_strings() {
        let text = r#"{"spec": "fn main() { }"} trailing"#;
        assert_eq!(extract_json_object(text), Some(r#"{"spec": "fn main() { }"}"#));
    }

    #[test]
    fn extract_json_object_unclosed_is_none() {
        assert_eq!(extract_json_object(r#"{"key": 1"#), None);
    }

    #[test]
    fn extract_json_object_from_offset_skips_earlier_objects() {
        let text = r#"{"a":1} {"b":2}"#;
        let (first, end) = extract_json_object_from(text, 0).unwrap();
        assert_eq!(first, r#"{"a":1}"#);
        let (second, _) = extract_json_object_from(text, end).unwrap();
        assert_eq!(second, r#"{"b":2}"#);
    }

    #[test]
    fn extract_json_array_handles_nested_objects() {
        let text = r#"junk [{"title":"a"},{"title":"b"}] more"#;
        assert_eq!(
            extract_json_array_from(text, 0),
            Some(r#"[{"title":"a"},{"title":"b"}]"#)
        );
    }
}
