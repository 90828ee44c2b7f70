//! GitHub blob URL parsing and local content addressing.

use std::path::{Path, PathBuf};

/// Components recovered from a GitHub blob URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSourceUrl {
    pub owner: String,
    pub repo: String,
    pub git_ref: String,
    pub path: String,
}

/// Parse `https://github.com/{owner}/{repo}/blob/{ref}/{path}`.
///
/// Returns `None` when the URL does not match that shape; malformed URLs
/// are treated as out-of-corpus, not as errors.
pub fn parse_github_url(url: &str) -> Option<ParsedSourceUrl> {
    let parts: Vec<&str> = url.split('/').collect();
    if parts.len() < 8 || parts[2] != "github.com" || parts[5] != "blob" {
        return None;
    }
    Some(ParsedSourceUrl {
        owner: parts[3].to_string(),
        repo: parts[4].to_string(),
        git_ref: parts[6].to_string(),
        path: parts[7..].join("/"),
    })
}

/// Build the on-disk path for a parsed URL under `content_dir`.
///
/// Pure join, no filesystem access, so it can be checked against a
/// precomputed directory listing.
pub fn content_path(content_dir: &Path, parsed: &ParsedSourceUrl) -> PathBuf {
    let mut path = content_dir
        .join(&parsed.owner)
        .join(&parsed.repo)
        .join("blob")
        .join(&parsed.git_ref);
    for segment in parsed.path.split('/') {
        path.push(segment);
    }
    path
}
