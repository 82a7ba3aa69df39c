//! `.lineignore` matcher.
//!
//! Patterns use gitignore semantics: negation, directory patterns, `**`
//! globs, `#` comments. The driver asks one question: did this commit change
//! only ignored files?

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use thiserror::Error;

/// Name of the ignore file at the repository root.
pub const IGNORE_FILE: &str = ".lineignore";

/// Error loading `.lineignore`.
#[derive(Debug, Error)]
#[error("loading .lineignore: {0}")]
pub struct IgnoreError(#[from] ignore::Error);

/// Compiled `.lineignore` patterns. Matches nothing when no file exists.
pub struct LineIgnore {
    matcher: Option<Gitignore>,
}

/// Load `.lineignore` from the repository root.
pub fn load(repo: &Path) -> Result<LineIgnore, IgnoreError> {
    let path = repo.join(IGNORE_FILE);
    if !path.exists() {
        return Ok(LineIgnore { matcher: None });
    }

    let mut builder = GitignoreBuilder::new(repo);
    if let Some(err) = builder.add(&path) {
        return Err(err.into());
    }
    Ok(LineIgnore {
        matcher: Some(builder.build()?),
    })
}

impl LineIgnore {
    /// Whether a single repo-relative path matches the ignore patterns.
    pub fn is_ignored(&self, file: &str) -> bool {
        let Some(matcher) = &self.matcher else {
            return false;
        };
        matcher
            .matched_path_or_any_parents(Path::new(file), false)
            .is_ignore()
    }

    /// True only when at least one file changed *and* every changed file
    /// matches the patterns.
    pub fn all_ignored(&self, files: &[String]) -> bool {
        if files.is_empty() {
            return false;
        }
        files.iter().all(|file| self.is_ignored(file))
    }
}
