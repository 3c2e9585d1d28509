//! Context enrichment for backlog projects.
//!
//! Pulls README, file tree, and package manifest from GitHub plus excerpts
//! of up to five attached documents, bounds everything, and composes the
//! final German generation prompt. Every fetch is best-effort: a failure
//! becomes a placeholder section, never an error.

use std::time::Duration;

use futures::future::join_all;
use serde::Deserialize;

use crate::board::models::{BacklogProject, Document};
use crate::util::{strip_html, truncate_chars};

const USER_AGENT: &str = "agentboard/0.1";
const GITHUB_TIMEOUT: Duration = Duration::from_secs(10);
const DOCUMENT_TIMEOUT: Duration = Duration::from_secs(15);

pub const README_MAX_CHARS: usize = 2_500;
pub const TREE_MAX_ENTRIES: usize = 40;
pub const DOCUMENT_MAX_CHARS: usize = 3_000;
pub const MAX_DOCUMENTS: usize = 5;

/// `owner/repo` parsed out of a project's GitHub link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubRef {
    pub owner: String,
    pub repo: String,
}

/// Accepts `github.com/owner/repo`, with optional scheme, `.git` suffix,
/// and trailing path segments.
pub fn parse_github_link(url: &str) -> Option<GithubRef> {
    let url = url.trim().trim_end_matches('/');
    let rest = &url[url.find("github.com/")? + "github.com/".len()..];
    let mut parts = rest.splitn(3, '/');
    let owner = parts.next()?.trim();
    let repo = parts.next()?.trim().trim_end_matches(".git");
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some(GithubRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

#[derive(Debug, Default)]
pub struct RepoContext {
    pub branch: Option<String>,
    pub readme: Option<String>,
    pub tree: Option<String>,
    pub manifest: Option<String>,
}

async fn fetch_ok(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Option<reqwest::Response> {
    client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .timeout(timeout)
        .send()
        .await
        .ok()
        .filter(|resp| resp.status().is_success())
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type", default)]
    kind: String,
}

/// Render the file listing, capped at [`TREE_MAX_ENTRIES`] with a summary
/// tail naming how many entries were cut.
pub fn format_tree(paths: &[String]) -> String {
    let mut lines: Vec<String> = paths
        .iter()
        .take(TREE_MAX_ENTRIES)
        .map(|p| format!("- {}", p))
        .collect();
    if paths.len() > TREE_MAX_ENTRIES {
        lines.push(format!(
            "… und {} weitere Einträge",
            paths.len() - TREE_MAX_ENTRIES
        ));
    }
    lines.join("\n")
}

/// Reduce a package.json to name, version, and dependency keys.
pub fn reduce_manifest(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let keys = |field: &str| -> Vec<String> {
        value
            .get(field)
            .and_then(|d| d.as_object())
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default()
    };
    let mut out = String::new();
    if let Some(name) = value.get("name").and_then(|v| v.as_str()) {
        out.push_str(&format!("Name: {}\n", name));
    }
    if let Some(version) = value.get("version").and_then(|v| v.as_str()) {
        out.push_str(&format!("Version: {}\n", version));
    }
    let deps = keys("dependencies");
    if !deps.is_empty() {
        out.push_str(&format!("Dependencies: {}\n", deps.join(", ")));
    }
    let dev_deps = keys("devDependencies");
    if !dev_deps.is_empty() {
        out.push_str(&format!("DevDependencies: {}\n", dev_deps.join(", ")));
    }
    if out.is_empty() { None } else { Some(out) }
}

/// Fetch README, file tree, and manifest, trying `main` then `master` and
/// stopping at the first branch whose README answers.
pub async fn fetch_repo_context(client: &reqwest::Client, gh: &GithubRef) -> RepoContext {
    let mut ctx = RepoContext::default();

    for branch in ["main", "master"] {
        let readme_url = format!(
            "https://raw.githubusercontent.com/{}/{}/{}/README.md",
            gh.owner, gh.repo, branch
        );
        let Some(resp) = fetch_ok(client, &readme_url, GITHUB_TIMEOUT).await else {
            continue;
        };
        let Ok(readme) = resp.text().await else {
            continue;
        };
        ctx.branch = Some(branch.to_string());
        ctx.readme = Some(truncate_chars(&readme, README_MAX_CHARS));

        let tree_url = format!(
            "https://api.github.com/repos/{}/{}/git/trees/{}?recursive=1",
            gh.owner, gh.repo, branch
        );
        let manifest_url = format!(
            "https://raw.githubusercontent.com/{}/{}/{}/package.json",
            gh.owner, gh.repo, branch
        );
        let (tree_resp, manifest_resp) = tokio::join!(
            fetch_ok(client, &tree_url, GITHUB_TIMEOUT),
            fetch_ok(client, &manifest_url, GITHUB_TIMEOUT),
        );

        if let Some(resp) = tree_resp
            && let Ok(parsed) = resp.json::<TreeResponse>().await
        {
            let paths: Vec<String> = parsed
                .tree
                .into_iter()
                .filter(|e| e.kind != "tree")
                .map(|e| e.path)
                .collect();
            ctx.tree = Some(format_tree(&paths));
        }
        if let Some(resp) = manifest_resp
            && let Ok(raw) = resp.text().await
        {
            ctx.manifest = reduce_manifest(&raw);
        }
        break;
    }

    ctx
}

fn looks_like_pdf(doc: &Document, content_type: &str) -> bool {
    content_type.contains("application/pdf")
        || doc
            .url
            .as_deref()
            .is_some_and(|u| u.to_lowercase().ends_with(".pdf"))
}

/// One prompt section for an attached document. Inline content wins over
/// the URL; failures produce a placeholder line.
pub async fn fetch_document_excerpt(client: &reqwest::Client, doc: &Document) -> String {
    let header = format!("### Dokument: {}", doc.name);

    if let Some(ref content) = doc.content {
        return format!("{}\n{}", header, truncate_chars(content.trim(), DOCUMENT_MAX_CHARS));
    }

    let Some(ref url) = doc.url else {
        return format!("{}\n[Kein Inhalt vorhanden]", header);
    };

    let Some(resp) = fetch_ok(client, url, DOCUMENT_TIMEOUT).await else {
        return format!("{}\n[Dokument konnte nicht geladen werden: {}]", header, url);
    };

    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    if looks_like_pdf(doc, &content_type) {
        return format!("{}\n[PDF-Dokument, siehe {}]", header, url);
    }

    let Ok(body) = resp.text().await else {
        return format!("{}\n[Dokument konnte nicht geladen werden: {}]", header, url);
    };

    let text = if content_type.contains("text/html") || body.trim_start().starts_with('<') {
        strip_html(&body)
    } else {
        body
    };
    format!("{}\n{}", header, truncate_chars(text.trim(), DOCUMENT_MAX_CHARS))
}

/// Full enrichment: repo context and document excerpts, fetched
/// concurrently and composed into prompt sections.
pub async fn enrich_project(client: &reqwest::Client, project: &BacklogProject) -> String {
    let repo_part = async {
        match project.github_link.as_deref().and_then(parse_github_link) {
            Some(gh) => Some(fetch_repo_context(client, &gh).await),
            None => None,
        }
    };
    let docs_part = join_all(
        project
            .documents
            .iter()
            .take(MAX_DOCUMENTS)
            .map(|doc| fetch_document_excerpt(client, doc)),
    );
    let (repo, docs) = tokio::join!(repo_part, docs_part);

    let mut sections = Vec::new();
    if let Some(repo) = repo {
        if let Some(ref readme) = repo.readme {
            let branch = repo.branch.as_deref().unwrap_or("main");
            sections.push(format!("### README ({})\n{}", branch, readme));
        }
        if let Some(ref tree) = repo.tree {
            sections.push(format!("### Dateistruktur\n{}", tree));
        }
        if let Some(ref manifest) = repo.manifest {
            sections.push(format!("### Paket-Manifest\n{}", manifest));
        }
    }
    sections.extend(docs);
    sections.join("\n\n")
}

const SPEC_PROMPT_HEADER: &str = "Du bist ein erfahrener Produktmanager und Solutions Architect. \
Erstelle auf Basis der folgenden Projektinformationen eine strukturierte technische \
Spezifikation und eine umsetzbare Aufgabenliste.";

const SPEC_PROMPT_CONTRACT: &str = "Antworte ausschließlich mit einem einzigen JSON-Objekt \
ohne Code-Fences und ohne weiteren Text, exakt in dieser Form:\n\
{\"spec\": \"<vollständige Spezifikation als Markdown-String>\", \
\"tasks\": [{\"title\": \"<Kurztitel>\", \"details\": \"<Umsetzungsdetails>\"}]}";

/// The complete generation prompt for one backlog project.
pub fn build_spec_prompt(project: &BacklogProject, enrichment: &str) -> String {
    let mut prompt = format!(
        "{}\n\n## Projekt\nTitel: {}\nBeschreibung: {}\n",
        SPEC_PROMPT_HEADER, project.title, project.description
    );
    if let Some(ref link) = project.github_link {
        prompt.push_str(&format!("Repository: {}\n", link));
    }
    if !enrichment.is_empty() {
        prompt.push_str(&format!("\n## Kontext\n{}\n", enrichment));
    }
    prompt.push_str(&format!("\n{}", SPEC_PROMPT_CONTRACT));
    prompt
}
