//! Discovering and reading documentation sources (markdown / MDX) under a docs root.
//!
//! The docs root belongs to the site; we only read it.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

const DOC_EXTENSIONS: &[&str] = &["md", "mdx"];

/// A documentation file we found: path and parsed content.
#[derive(Debug, Clone)]
pub struct Doc {
    pub path: PathBuf,
    /// Raw file content.
    pub raw: String,
    /// Content without YAML frontmatter (the markdown body).
    pub body: String,
    /// `title` from the frontmatter, if any.
    pub title: Option<String>,
}

impl Doc {
    /// Builds a doc from in-memory content, splitting off frontmatter.
    pub fn from_source(path: impl Into<PathBuf>, raw: String) -> Self {
        let (frontmatter, body) = split_frontmatter(&raw);
        let title = frontmatter.and_then(frontmatter_title);
        Self {
            path: path.into(),
            body: body.to_string(),
            raw,
            title,
        }
    }
}

/// Scans `root` for all `.md` / `.mdx` files, sorted by path.
/// Does not follow symlinks into directories (walkdir default).
pub fn scan_docs(root: &Path) -> Result<Vec<Doc>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    let mut docs = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| ScanError::Walk(e.to_string()))?;
        let path = entry.path();
        if is_doc(path) && entry.file_type().is_file() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| ScanError::Read(path.to_path_buf(), e))?;
            docs.push(Doc::from_source(path, raw));
        }
    }
    docs.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(docs)
}

fn is_doc(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| DOC_EXTENSIONS.contains(&e))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Splits an optional leading `---` YAML block from the body.
fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let s = content.trim_start();
    let Some(after_first) = s.strip_prefix("---") else {
        return (None, content);
    };
    match after_first.find("\n---") {
        Some(end) => {
            let yaml = &after_first[..end];
            let rest = &after_first[end + 4..];
            // Drop the remainder of the closing fence line.
            let rest = rest.split_once('\n').map_or("", |(_, r)| r);
            (Some(yaml), rest.trim_start())
        }
        None => (None, content),
    }
}

#[derive(Deserialize)]
struct Frontmatter {
    title: Option<String>,
}

fn frontmatter_title(yaml: &str) -> Option<String> {
    match serde_yaml::from_str::<Frontmatter>(yaml) {
        Ok(fm) => fm.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        Err(e) => {
            tracing::debug!(error = %e, "frontmatter is not a mapping, ignoring");
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("walk error: {0}")]
    Walk(String),
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_without_frontmatter_is_untouched() {
        let doc = Doc::from_source("a.md", "Hello world.".to_string());
        assert_eq!(doc.body, "Hello world.");
        assert_eq!(doc.title, None);
    }

    #[test]
    fn frontmatter_is_stripped_and_title_read() {
        let doc = Doc::from_source(
            "a.mdx",
            "---\ntitle: Getting Started\norder: 2\n---\n\nActual content here.".to_string(),
        );
        assert_eq!(doc.body, "Actual content here.");
        assert_eq!(doc.title.as_deref(), Some("Getting Started"));
    }

    #[test]
    fn unterminated_frontmatter_keeps_content() {
        let raw = "---\ntitle: Broken\n\nNo closing fence.";
        let doc = Doc::from_source("a.md", raw.to_string());
        assert_eq!(doc.body, raw);
        assert_eq!(doc.title, None);
    }

    #[test]
    fn scan_finds_md_and_mdx_skipping_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("manual")).unwrap();
        std::fs::create_dir_all(root.join(".drafts")).unwrap();
        std::fs::write(root.join("manual/xsml.mdx"), "# XSML").unwrap();
        std::fs::write(root.join("intro.md"), "# Intro").unwrap();
        std::fs::write(root.join("notes.txt"), "not a doc").unwrap();
        std::fs::write(root.join(".drafts/wip.md"), "# WIP").unwrap();

        let docs = scan_docs(root).unwrap();
        let names: Vec<_> = docs
            .iter()
            .map(|d| d.path.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![PathBuf::from("intro.md"), PathBuf::from("manual/xsml.mdx")]
        );
    }

    #[test]
    fn scan_rejects_files() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            scan_docs(file.path()),
            Err(ScanError::NotADirectory(_))
        ));
    }
}
