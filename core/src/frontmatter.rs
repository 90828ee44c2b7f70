//! Cheap structural pre-filter: YAML frontmatter check.
//!
//! Runs before cache lookup and before any remote interaction, so a
//! structurally invalid file never costs a classifier call.

/// Returns true when `content` opens with a `---` frontmatter block whose
/// header parses as YAML.
///
/// Relaxed rule: an empty or whitespace-only header is accepted (an empty
/// YAML document is a null document, not a syntax error).
pub fn has_valid_frontmatter(content: &str) -> bool {
    if !content.starts_with("---") {
        return false;
    }
    let mut parts = content.splitn(3, "---");
    parts.next(); // text before the opening delimiter (always empty here)
    let Some(header) = parts.next() else {
        return false;
    };
    if parts.next().is_none() {
        // No closing delimiter.
        return false;
    }
    header.trim().is_empty() || serde_yaml::from_str::<serde_yaml::Value>(header).is_ok()
}
