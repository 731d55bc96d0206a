//! Knowledge-base loader.
//!
//! Walks a directory tree and turns every file matching the include globs
//! into a [`Document`] keyed by its path. The tree is re-scanned on every
//! process start; nothing is persisted.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{HarnessError, Result};
use crate::models::Document;

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Recursively load all documents under `root` matching `include_globs`.
///
/// Returns an empty list when `root` exists but holds no matching files.
/// Documents are sorted by `source_id` so downstream ordering is stable.
pub fn load_documents(root: &Path, include_globs: &[String]) -> Result<Vec<Document>> {
    if !root.exists() {
        return Err(HarnessError::NotFound(root.to_path_buf()));
    }

    let include_set = build_globset(include_globs)?;
    let excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    let exclude_set = build_globset(&excludes)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            HarnessError::Io(std::io::Error::other(format!(
                "failed to walk {}: {}",
                root.display(),
                e
            )))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();

        if exclude_set.is_match(rel_str.as_ref()) || !include_set.is_match(rel_str.as_ref()) {
            continue;
        }

        if let Some(doc) = read_document(path) {
            documents.push(doc);
        }
    }

    documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    tracing::debug!(root = %root.display(), count = documents.len(), "loaded knowledge base");
    Ok(documents)
}

/// Load individually named files. Missing paths are skipped, not errors.
pub fn load_extra_files(paths: &[PathBuf]) -> Vec<Document> {
    paths
        .iter()
        .filter_map(|path| {
            if !path.is_file() {
                tracing::warn!(path = %path.display(), "extra file not found, skipping");
                return None;
            }
            read_document(path)
        })
        .collect()
}

fn read_document(path: &Path) -> Option<Document> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(Document::new(path.display().to_string(), content)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
            None
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| HarnessError::config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| HarnessError::config(format!("invalid glob set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn md_globs() -> Vec<String> {
        vec!["**/*.md".to_string()]
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let err = load_documents(&missing, &md_globs()).unwrap_err();
        assert!(matches!(err, HarnessError::NotFound(p) if p == missing));
    }

    #[test]
    fn test_empty_directory_yields_no_documents() {
        let tmp = TempDir::new().unwrap();
        let docs = load_documents(tmp.path(), &md_globs()).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_recursive_glob_and_sorting() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("guides/nested")).unwrap();
        fs::write(tmp.path().join("zeta.md"), "zeta").unwrap();
        fs::write(tmp.path().join("guides/nested/alpha.md"), "alpha").unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let docs = load_documents(tmp.path(), &md_globs()).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].source_id.ends_with("alpha.md"));
        assert!(docs[1].source_id.ends_with("zeta.md"));
        assert_eq!(docs[0].content, "alpha");
    }

    #[test]
    fn test_default_excludes() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("node_modules/pkg")).unwrap();
        fs::write(tmp.path().join("node_modules/pkg/README.md"), "vendored").unwrap();
        fs::write(tmp.path().join("README.md"), "ours").unwrap();

        let docs = load_documents(tmp.path(), &md_globs()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "ours");
    }

    #[test]
    fn test_non_utf8_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bad.md"), [0xffu8, 0xfe]).unwrap();
        fs::write(tmp.path().join("good.md"), "Run make setup.").unwrap();

        let docs = load_documents(tmp.path(), &md_globs()).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].source_id.ends_with("good.md"));
        assert_eq!(docs[0].content, "Run make setup.");
    }

    #[test]
    fn test_extra_files_skip_missing() {
        let tmp = TempDir::new().unwrap();
        let present = tmp.path().join("CONTRIBUTING.md");
        fs::write(&present, "Open a PR.").unwrap();

        let docs = load_extra_files(&[present.clone(), tmp.path().join("missing.md")]);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_id, present.display().to_string());
    }
}
