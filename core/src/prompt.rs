//! Classification prompt rendering, truncation, and cache keying.

use sha2::{Digest, Sha256};

use crate::config::CONTENT_MAX_BYTES;

/// Marker appended when content is cut at the truncation budget.
pub const TRUNCATION_MARKER: &str = "\n[truncated]";

/// Classification prompt; `{content}` is replaced with the (possibly
/// truncated) file content.
pub const VALIDATION_PROMPT: &str = r#"Analyze this SKILL.md file from GitHub.

A valid Claude Code skill file has:
1. YAML frontmatter between --- markers (at the start)
2. Markdown content after frontmatter
3. Content that extends Claude's capabilities (instructions, workflows, knowledge, or commands)

Common frontmatter fields (all optional):
- name, description, disable-model-invocation, user-invocable, allowed-tools

The content can be:
- Reference material (API conventions, patterns, style guides)
- Task instructions (step-by-step workflows like deploy, commit)
- Templates or examples
- Configuration for tools/agents

Be INCLUSIVE - if it has frontmatter + markdown content that looks skill-like, mark as valid.
Reject only if clearly not a skill (blog posts, GitHub templates, unrelated docs).

File content:
{content}

Respond with JSON only:
{"is_skill": true/false, "reason": "one sentence"}"#;

/// Substitute `content` into the validation prompt.
pub fn render_prompt(content: &str) -> String {
    VALIDATION_PROMPT.replace("{content}", content)
}

/// Truncate to [`CONTENT_MAX_BYTES`], never splitting inside a multi-byte
/// UTF-8 sequence, and append [`TRUNCATION_MARKER`].
///
/// Classification only needs the frontmatter and introduction, so the cache
/// key is a hash of the truncated form: a file edited only beyond the
/// boundary is treated as identical content.
pub fn truncate_content(content: &str) -> String {
    if content.len() <= CONTENT_MAX_BYTES {
        return content.to_string();
    }
    let mut end = CONTENT_MAX_BYTES;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{TRUNCATION_MARKER}", &content[..end])
}

/// Cache key: SHA-256 of the fully rendered prompt, hex encoded.
///
/// Pure function of the (truncated) content, stable across processes and
/// runs.
pub fn prompt_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(render_prompt(content).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn render_substitutes_content_once() {
        let rendered = render_prompt("---\nname: x\n---\nBody");
        assert!(rendered.contains("---\nname: x\n---\nBody"));
        assert!(!rendered.contains("{content}"));
        // The JSON example braces survive rendering untouched.
        assert!(rendered.contains(r#"{"is_skill": true/false"#));
    }

    #[test]
    fn short_content_is_untouched() {
        assert_eq!(truncate_content("short"), "short");
    }

    #[test]
    fn truncation_appends_marker_at_budget() {
        let content = "a".repeat(CONTENT_MAX_BYTES + 100);
        let truncated = truncate_content(&content);
        assert_eq!(
            truncated.len(),
            CONTENT_MAX_BYTES + TRUNCATION_MARKER.len()
        );
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_never_splits_a_multibyte_char() {
        // 'é' is two bytes; an odd budget lands mid-char somewhere.
        let content = "é".repeat(CONTENT_MAX_BYTES);
        let truncated = truncate_content(&content);
        let body = truncated
            .strip_suffix(TRUNCATION_MARKER)
            .expect("marker present");
        assert!(body.len() <= CONTENT_MAX_BYTES);
        assert!(body.chars().all(|c| c == 'é'));
    }

    #[test]
    fn prompt_hash_is_deterministic_and_content_sensitive() {
        let a = prompt_hash("---\nname: x\n---\n");
        let b = prompt_hash("---\nname: x\n---\n");
        let c = prompt_hash("---\nname: y\n---\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
