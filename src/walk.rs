//! Local tree enumeration and path-to-key translation

use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::logger::Logger;

/// One unit of sync work: a local file and the bucket-relative key it maps to.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub local_path: PathBuf,
    pub key: String,
}

/// Directory names that are version-control metadata and never synced.
const VCS_DIRS: &[&str] = &[".git", ".svn", ".hg", "CVS"];

/// Conventional editor backup suffixes, skipped by default.
const BACKUP_SUFFIXES: &[&str] = &["~", ".bak", ".swp"];

/// Exclusion rules applied during the walk.
pub struct ExcludeRules {
    pub dirs: Vec<String>,
    pub file_suffixes: Vec<String>,
    pub file_patterns: Vec<String>,
}

impl Default for ExcludeRules {
    fn default() -> Self {
        Self {
            dirs: VCS_DIRS.iter().map(|s| s.to_string()).collect(),
            file_suffixes: BACKUP_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            file_patterns: Vec::new(),
        }
    }
}

impl ExcludeRules {
    /// Default rules plus extra CLI-supplied directory and file patterns.
    pub fn with_extra(exclude_dirs: &[String], exclude_files: &[String]) -> Self {
        let mut rules = Self::default();
        rules.dirs.extend(exclude_dirs.iter().cloned());
        rules.file_patterns.extend(exclude_files.iter().cloned());
        rules
    }

    fn should_include_dir(&self, path: &Path) -> bool {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        for pattern in &self.dirs {
            if glob_match(pattern, &name) {
                return false;
            }
        }
        true
    }

    fn should_include_file(&self, path: &Path) -> bool {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        for suffix in &self.file_suffixes {
            if name.ends_with(suffix.as_str()) {
                return false;
            }
        }
        for pattern in &self.file_patterns {
            if glob_match(pattern, &name) {
                return false;
            }
        }
        true
    }
}

/// Simple glob matching (supports * wildcards)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if pattern.contains('*') {
        if pattern.starts_with('*') && pattern.ends_with('*') {
            let middle = &pattern[1..pattern.len() - 1];
            return text.contains(middle);
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            return text.ends_with(suffix);
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            return text.starts_with(prefix);
        }
    }

    pattern == text
}

/// Translate a local path to its bucket-relative key: separators normalized
/// to `/`, the configured prefix stripped, no leading slash.
pub fn key_for_path(path: &Path, key_prefix: &str) -> String {
    let mut key = path.to_string_lossy().replace('\\', "/");
    if !key_prefix.is_empty() && key.starts_with(key_prefix) {
        key = key[key_prefix.len()..].to_string();
    }
    key.trim_start_matches('/').to_string()
}

/// Enumerate every file under `root` that passes the exclusion rules.
///
/// Excluded directories are pruned without descending into them. Unreadable
/// entries are logged as warnings and skipped; a single bad node never
/// aborts the walk.
pub fn walk_tree(
    root: &Path,
    key_prefix: &str,
    rules: &ExcludeRules,
    logger: &dyn Logger,
) -> Result<Vec<WorkItem>> {
    let mut items = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.file_type().is_dir() {
                rules.should_include_dir(e.path())
            } else {
                true // walk all files, filter them below
            }
        })
    {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                eprintln!("warning: cannot read {path}: {err}");
                logger.warn("walk", &format!("cannot read {path}: {err}"));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        if !rules.should_include_file(entry.path()) {
            continue;
        }

        items.push(WorkItem {
            local_path: entry.path().to_path_buf(),
            key: key_for_path(entry.path(), key_prefix),
        });
    }

    Ok(items)
}
