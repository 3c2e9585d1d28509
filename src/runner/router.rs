//! Agent selection for a task.
//!
//! Precedence: explicit meta override, then keyword scoring over title and
//! stripped description, then the default-flagged agent, then the first
//! enabled agent, then the built-in fallback.

use std::sync::Arc;

use crate::board::meta;
use crate::board::models::{AgentDef, Task};

use super::registry::{AgentRegistry, builtin_fallback_agent};

/// Count how many of the agent's keywords occur in the haystack
/// (case-insensitive substring match).
fn keyword_score(agent: &AgentDef, haystack: &str) -> usize {
    agent
        .keywords
        .iter()
        .filter(|kw| !kw.is_empty() && haystack.contains(&kw.to_lowercase()))
        .count()
}

/// Pick the agent for `task`. Always returns a definition; when the
/// registry offers nothing usable the built-in fallback is synthesized.
pub fn route(task: &Task, registry: &AgentRegistry) -> Arc<AgentDef> {
    // 1. Explicit override in the embedded meta.
    if let Some(meta) = meta::parse(&task.description)
        && let Some(ref wanted) = meta.agent
        && let Some(agent) = registry.get(wanted).filter(|a| a.enabled)
    {
        return Arc::clone(agent);
    }

    // 2. Keyword scoring; first-wins on ties preserves registry order.
    let haystack = format!("{} {}", task.title, meta::strip(&task.description)).to_lowercase();
    let mut best: Option<(&Arc<AgentDef>, usize)> = None;
    for agent in registry.enabled() {
        let score = keyword_score(agent, &haystack);
        if score > 0 && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((agent, score));
        }
    }
    if let Some((agent, _)) = best {
        return Arc::clone(agent);
    }

    // 3. Default flag, then first enabled, then the hard-coded fallback.
    if let Some(agent) = registry.enabled().find(|a| a.default) {
        return Arc::clone(agent);
    }
    if let Some(agent) = registry.enabled().next() {
        return Arc::clone(agent);
    }
    Arc::new(builtin_fallback_agent())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::models::{AgentMeta, MetaStatus};

    fn agent(id: &str, keywords: &[&str], default: bool, enabled: bool) -> AgentDef {
        AgentDef {
            id: id.into(),
            name: id.into(),
            cmd: id.into(),
            args: vec!["{prompt}".into()],
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            ram_mb: 256,
            default,
            enabled,
            note: None,
        }
    }

    fn task(title: &str, description: &str) -> Task {
        Task {
            id: "t1".into(),
            title: title.into(),
            description: description.into(),
            color: 0,
            created_at: String::new(),
            moved_at: None,
        }
    }

    fn registry(defs: Vec<AgentDef>) -> AgentRegistry {
        AgentRegistry::from_defs(defs).unwrap()
    }

    #[test]
    fn meta_override_wins_over_keywords() {
        let reg = registry(vec![
            agent("claude", &["implement"], true, true),
            agent("aider", &[], false, true),
        ]);
        let meta = AgentMeta {
            agent: Some("aider".into()),
            status: MetaStatus::Queued,
            ..AgentMeta::default()
        };
        let t = task("implement login", &meta::embed("implement it", &meta));
        assert_eq!(route(&t, &reg).id, "aider");
    }

    #[test]
    fn override_to_disabled_agent_falls_through() {
        let reg = registry(vec![
            agent("claude", &["implement"], false, true),
            agent("aider", &[], false, false),
        ]);
        let meta = AgentMeta {
            agent: Some("aider".into()),
            ..AgentMeta::default()
        };
        let t = task("implement login", &meta::embed("x", &meta));
        assert_eq!(route(&t, &reg).id, "claude");
    }

    #[test]
    fn keyword_scoring_is_case_insensitive() {
        let reg = registry(vec![
            agent("docs", &["readme", "document"], false, true),
            agent("claude", &["implement", "build"], false, true),
        ]);
        let t = task("Implement and BUILD the login", "");
        assert_eq!(route(&t, &reg).id, "claude");
    }

    #[test]
    fn keywords_match_in_stripped_description_only() {
        let reg = registry(vec![
            agent("first", &[], true, true),
            agent("sneaky", &["failed"], false, true),
        ]);
        // "failed" appears only inside the embedded meta, which must not
        // influence routing.
        let meta = AgentMeta {
            status: MetaStatus::Failed,
            last_error: Some("failed".into()),
            ..AgentMeta::default()
        };
        let t = task("neutral title", &meta::embed("neutral body", &meta));
        assert_eq!(route(&t, &reg).id, "first");
    }

    #[test]
    fn tie_breaks_by_registry_order() {
        let reg = registry(vec![
            agent("a", &["login"], false, true),
            agent("b", &["login"], false, true),
        ]);
        let t = task("login page", "");
        assert_eq!(route(&t, &reg).id, "a");
    }

    #[test]
    fn zero_score_picks_default_flagged() {
        let reg = registry(vec![
            agent("a", &["nothing"], false, true),
            agent("b", &[], true, true),
        ]);
        let t = task("unrelated", "");
        assert_eq!(route(&t, &reg).id, "b");
    }

    #[test]
    fn no_default_picks_first_enabled() {
        let reg = registry(vec![
            agent("off", &[], false, false),
            agent("on", &[], false, true),
        ]);
        let t = task("unrelated", "");
        assert_eq!(route(&t, &reg).id, "on");
    }

    #[test]
    fn empty_registry_synthesizes_fallback() {
        let reg = registry(vec![agent("off", &[], true, false)]);
        let t = task("anything", "");
        assert_eq!(route(&t, &reg).id, "claude");
    }
}
