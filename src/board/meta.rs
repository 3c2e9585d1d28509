//! Embedded agent-meta codec.
//!
//! The board CRUD has no side channel for orchestration state, so the task
//! runner carries it inside the task description after a sentinel line.
//! Everything before the first sentinel is the user-visible description;
//! the suffix is one JSON-encoded [`AgentMeta`]. All three operations are
//! pure and total: malformed suffixes decode to `None`, never to an error.

use super::models::AgentMeta;

pub const META_SENTINEL: &str = "---agent-meta---";

/// Decode the meta block, if present and well-formed.
pub fn parse(description: &str) -> Option<AgentMeta> {
    let idx = description.find(META_SENTINEL)?;
    let suffix = &description[idx + META_SENTINEL.len()..];
    serde_json::from_str(suffix.trim()).ok()
}

/// The user-visible description: the prefix before the first sentinel,
/// trimmed.
pub fn strip(description: &str) -> String {
    match description.find(META_SENTINEL) {
        Some(idx) => description[..idx].trim().to_string(),
        None => description.trim().to_string(),
    }
}

/// Re-attach `meta` to the stripped description. The result contains
/// exactly one sentinel regardless of how many the input carried.
pub fn embed(description: &str, meta: &AgentMeta) -> String {
    let visible = strip(description);
    let json = serde_json::to_string(meta).expect("AgentMeta serializes infallibly");
    if visible.is_empty() {
        format!("{}\n{}", META_SENTINEL, json)
    } else {
        format!("{}\n\n{}\n{}", visible, META_SENTINEL, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::models::MetaStatus;

    fn sample_meta() -> AgentMeta {
        AgentMeta {
            agent: Some("claude".into()),
            status: MetaStatus::Running,
            attempts: 1,
            started_at: Some("2026-02-01T10:00:00Z".into()),
            result_path: None,
            last_error: None,
            result_summary: None,
        }
    }

    #[test]
    fn parse_embed_round_trip() {
        let meta = sample_meta();
        let embedded = embed("Add OAuth login", &meta);
        assert_eq!(parse(&embedded), Some(meta));
    }

    #[test]
    fn strip_of_embed_equals_strip() {
        let meta = sample_meta();
        let original = "  Add OAuth login  ";
        let embedded = embed(original, &meta);
        assert_eq!(strip(&embedded), strip(original));
        assert_eq!(strip(&embedded), "Add OAuth login");
    }

    #[test]
    fn strip_is_idempotent() {
        let embedded = embed("desc", &sample_meta());
        assert_eq!(strip(&strip(&embedded)), strip(&embedded));
    }

    #[test]
    fn embed_produces_exactly_one_sentinel() {
        let once = embed("desc", &sample_meta());
        let twice = embed(&once, &sample_meta());
        assert_eq!(twice.matches(META_SENTINEL).count(), 1);
    }

    #[test]
    fn parse_without_sentinel_is_none() {
        assert_eq!(parse("plain description"), None);
    }

    #[test]
    fn parse_with_garbage_suffix_is_none() {
        let desc = format!("desc\n{}\nnot json at all", META_SENTINEL);
        assert_eq!(parse(&desc), None);
    }

    #[test]
    fn embed_on_empty_description() {
        let embedded = embed("", &sample_meta());
        assert!(embedded.starts_with(META_SENTINEL));
        assert_eq!(strip(&embedded), "");
        assert_eq!(parse(&embedded), Some(sample_meta()));
    }

    #[test]
    fn only_first_sentinel_counts() {
        let desc = format!(
            "visible\n{}\n{{\"status\":\"queued\",\"attempts\":0}}\n{}",
            META_SENTINEL, META_SENTINEL
        );
        // Suffix after the first sentinel contains a second sentinel, so the
        // JSON decode fails and parse returns None rather than panicking.
        assert_eq!(parse(&desc), None);
        assert_eq!(strip(&desc), "visible");
    }
}
