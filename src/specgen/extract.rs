//! Structured-output extraction from free-form model text.
//!
//! Models wrap their JSON in fences, prepend reasoning blocks, or emit
//! strings with unescaped quotes. The four layers here each recover from
//! one observed pathology; their order matters and must not be collapsed
//! into a single permissive parser:
//!
//! 1. Strip code fences and `<think>…</think>` blocks.
//! 2. Direct JSON decode (missing `tasks` defaults to empty).
//! 3. Decode the first balanced `{…}` substring containing `"spec"`.
//! 4. Regex-recover `spec` between `"spec":"` and `","tasks"`, unescape,
//!    and decode or regex-scan the tasks array.

use std::sync::OnceLock;

use regex::Regex;

use crate::board::models::SpecTask;
use crate::errors::ExtractError;
use crate::util::{extract_json_array_from, extract_json_object_from};

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSpec {
    pub spec: String,
    pub tasks: Vec<SpecTask>,
}

/// Run all four layers in order.
pub fn extract_spec_output(raw: &str) -> Result<ExtractedSpec, ExtractError> {
    let cleaned = preclean(raw);
    layer_direct(&cleaned)
        .or_else(|| layer_substring(&cleaned))
        .or_else(|| layer_regex(&cleaned))
        .ok_or(ExtractError { len: raw.len() })
}

// ── Layer 1: fences and think blocks ──────────────────────────────────

fn think_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").unwrap())
}

fn preclean(raw: &str) -> String {
    let without_think = think_re().replace_all(raw, "");
    let mut text = without_think.trim();

    if text.starts_with("```") {
        text = text
            .split_once('\n')
            .map(|(_, rest)| rest)
            .unwrap_or("")
            .trim_start();
    }
    if text.ends_with("```") {
        text = text[..text.len() - 3].trim_end();
    }
    text.to_string()
}

// ── Layer 2: direct decode ────────────────────────────────────────────

fn tasks_from_value(value: &serde_json::Value) -> Vec<SpecTask> {
    let Some(items) = value.get("tasks").and_then(|t| t.as_array()) else {
        return vec![];
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

fn spec_from_value(value: &serde_json::Value) -> Option<ExtractedSpec> {
    let spec = value.get("spec")?.as_str()?.to_string();
    Some(ExtractedSpec {
        spec,
        tasks: tasks_from_value(value),
    })
}

fn layer_direct(text: &str) -> Option<ExtractedSpec> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    spec_from_value(&value)
}

// ── Layer 3: first object substring carrying "spec" ───────────────────

fn layer_substring(text: &str) -> Option<ExtractedSpec> {
    let mut from = 0;
    while let Some((candidate, end)) = extract_json_object_from(text, from) {
        if candidate.contains("\"spec\"")
            && let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate)
            && let Some(extracted) = spec_from_value(&value)
        {
            return Some(extracted);
        }
        from = end;
    }
    None
}

// ── Layer 4: regex recovery ───────────────────────────────────────────

fn spec_capture_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)"spec"\s*:\s*"(.*?)"\s*,\s*"tasks""#).unwrap())
}

fn task_pair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\s*"title"\s*:\s*"([^"]*)"\s*,\s*"details"\s*:\s*"([^"]*)"\s*\}"#).unwrap()
    })
}

fn unescape_common(s: &str) -> String {
    s.replace("\\n", "\n").replace("\\\"", "\"").replace("\\\\", "\\")
}

fn scan_tasks(text: &str) -> Vec<SpecTask> {
    task_pair_re()
        .captures_iter(text)
        .map(|cap| SpecTask {
            title: unescape_common(&cap[1]),
            details: unescape_common(&cap[2]),
        })
        .collect()
}

fn layer_regex(text: &str) -> Option<ExtractedSpec> {
    let captures = spec_capture_re().captures(text)?;
    let spec = unescape_common(&captures[1]);

    let tasks_start = captures.get(0).map(|m| m.end()).unwrap_or(0);
    let tasks = match extract_json_array_from(text, tasks_start) {
        Some(array) => match serde_json::from_str::<Vec<SpecTask>>(array) {
            Ok(tasks) => tasks,
            Err(_) => scan_tasks(array),
        },
        None => scan_tasks(&text[tasks_start..]),
    };

    Some(ExtractedSpec { spec, tasks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_decodes_directly() {
        let raw = r##"{"spec":"# Plan","tasks":[{"title":"T","details":"D"}]}"##;
        let out = extract_spec_output(raw).unwrap();
        assert_eq!(out.spec, "# Plan");
        assert_eq!(out.tasks.len(), 1);
        assert_eq!(out.tasks[0].title, "T");
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "```json\n{\"spec\":\"# X\",\"tasks\":[{\"title\":\"T\",\"details\":\"D\"}]}\n```";
        let out = extract_spec_output(raw).unwrap();
        assert_eq!(out.spec, "# X");
        assert_eq!(
            out.tasks,
            vec![SpecTask {
                title: "T".into(),
                details: "D".into()
            }]
        );
    }

    #[test]
    fn missing_tasks_defaults_to_empty() {
        let out = extract_spec_output(r#"{"spec":"only a spec"}"#).unwrap();
        assert_eq!(out.spec, "only a spec");
        assert!(out.tasks.is_empty());
    }

    #[test]
    fn surrounding_prose_handled_by_substring_layer() {
        let raw = r##"Here you go!
{"spec":"# Embedded","tasks":[]}
Hope this helps."##;
        let out = extract_spec_output(raw).unwrap();
        assert_eq!(out.spec, "# Embedded");
    }

    #[test]
    fn earlier_spec_free_object_is_skipped() {
        let raw = r##"{"note":"ignore me"} {"spec":"# Real","tasks":[]}"##;
        let out = extract_spec_output(raw).unwrap();
        assert_eq!(out.spec, "# Real");
    }

    #[test]
    fn think_block_and_unescaped_quotes_need_regex_layer() {
        let raw = "<think>let me reason about this</think>\n{\"spec\":\"# Plan\\nuse the \"builder\" pattern\",\"tasks\":[{\"title\":\"T\",\"details\":\"D\"}]}";
        let out = extract_spec_output(raw).unwrap();
        assert!(out.spec.contains("\"builder\" pattern"));
        assert!(!out.tasks.is_empty());
    }

    #[test]
    fn regex_layer_unescapes_newlines() {
        let raw = r#"garbage "spec":"line one\nline "two"","tasks":[{"title":"A","details":"B"}] trailing"#;
        let out = extract_spec_output(raw).unwrap();
        assert_eq!(out.spec, "line one\nline \"two\"");
        assert_eq!(out.tasks[0].title, "A");
    }

    #[test]
    fn broken_tasks_array_falls_back_to_pair_scan() {
        let raw = r#""spec":"S","tasks":[{"title":"A","details":"B"},{"title":"C","details":"D"} oops"#;
        let out = extract_spec_output(raw).unwrap();
        assert_eq!(out.spec, "S");
        assert_eq!(out.tasks.len(), 2);
        assert_eq!(out.tasks[1].title, "C");
    }

    #[test]
    fn hopeless_input_is_extract_error() {
        let err = extract_spec_output("the model said nothing useful").unwrap_err();
        assert!(err.to_string().contains("chars"));
    }

    #[test]
    fn malformed_task_items_are_dropped_not_fatal() {
        let raw = r#"{"spec":"S","tasks":[{"title":"ok","details":"d"},{"nope":1}]}"#;
        let out = extract_spec_output(raw).unwrap();
        assert_eq!(out.tasks.len(), 1);
    }
}
