//! Kaggle packaging metadata: `dataset-metadata.json` and the dataset
//! README.

use std::path::Path;

use serde_json::json;

use crate::Result;

/// Format a count with thousands separators, e.g. `12,345`.
fn with_separators(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Write `dataset-metadata.json` and `README.md` into `output_dir`.
pub fn write_dataset_metadata(
    output_dir: &Path,
    username: &str,
    files_count: usize,
    repos_count: usize,
) -> Result<()> {
    let files_fmt = with_separators(files_count);
    let repos_fmt = with_separators(repos_count);

    let metadata = json!({
        "title": "GitHub SKILL.md Files - Claude Code Skills",
        "id": format!("{username}/github-skill-files"),
        "licenses": [{"name": "CC0-1.0"}],
        "keywords": ["github", "claude", "skills", "ai", "automation", "claude-code"],
        "description": format!(
            "Validated SKILL.md files from {repos_fmt} GitHub repositories. \
             Contains {files_fmt} skill files with repository metadata and commit history."
        ),
        "resources": [
            {"path": "files.parquet", "description": "File URLs and basic Git info"},
            {"path": "repos.parquet", "description": "Repository metadata (stars, forks, language, topics)"},
            {"path": "history.parquet", "description": "Per-file commit history"},
        ]
    });
    std::fs::write(
        output_dir.join("dataset-metadata.json"),
        serde_json::to_string_pretty(&metadata)?,
    )?;

    let readme = format!(
        r#"# GitHub SKILL.md Files Dataset

Validated SKILL.md files from {repos_fmt} GitHub repositories.

## Contents

- **{files_fmt} validated skill files** from GitHub
- **{repos_fmt} repositories** with metadata (stars, forks, topics, language)
- **Commit history** showing when files were created and last modified

## Files

### files.parquet
- `url`: GitHub blob URL (primary key)
- `sha`: Git commit SHA
- `size_bytes`: File size in bytes
- `discovered_at`: When the file was collected
- `repo_key`: Foreign key to repos (owner/repo)
- `filename`: File name (e.g., "SKILL.md")
- `path`: Path in repository

### repos.parquet
- `repo_key`: owner/repo (primary key)
- `repo_owner`, `repo_name`: Split key components
- `stars`, `forks`, `watchers`: GitHub counters
- `language`: Primary language
- `topics`: Array of topics
- `description`, `license`, `created_at`, `updated_at`

### history.parquet
- `url`: File URL (foreign key to files)
- `commit_sha`, `commit_author`, `commit_date`, `commit_message`: One row per commit

## Data Collection

1. **Collection**: Files discovered and fetched from the GitHub API
2. **Validation**: Two-pass validation: a structural YAML frontmatter check,
   then semantic classification by Claude
3. **Export**: 3 normalized Parquet files

## License

CC0-1.0 (Public Domain)
"#
    );
    std::fs::write(output_dir.join("README.md"), readme)?;
    Ok(())
}
