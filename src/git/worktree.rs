//! Per-station worktree management.
//!
//! Each station executes in a disposable worktree so the user's working tree
//! is never touched while the pipeline runs. Worktrees live under a
//! deterministic base directory derived from the repository path:
//!
//! ```text
//! $TMPDIR/line-<sha256(canonical-abs-repo-path)[..8]>/<station>
//! ```
//!
//! The deterministic path means different repositories never collide and a
//! crashed run's leftovers can be removed without ambiguity.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{run_git, GitResult};

/// Deterministic worktree base directory for a repository.
///
/// The repository path is canonicalized first (resolving symlinks, e.g.
/// `/var` vs `/private/var` on macOS) so the same repository always hashes
/// identically.
pub fn base_dir(repo: &Path) -> GitResult<PathBuf> {
    let canonical = repo.canonicalize()?;
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    let tag = format!("{digest:x}");
    Ok(std::env::temp_dir().join(format!("line-{}", &tag[..8])))
}

/// Worktree path for a single station.
pub fn station_path(repo: &Path, station: &str) -> GitResult<PathBuf> {
    Ok(base_dir(repo)?.join(station))
}

/// Create a worktree at `path` with `branch` checked out.
pub fn add(repo: &Path, path: &Path, branch: &str) -> GitResult<()> {
    let path_str = path.to_string_lossy();
    run_git(repo, &["worktree", "add", path_str.as_ref(), branch])?;
    Ok(())
}

/// Force-remove a worktree entry.
pub fn remove(repo: &Path, path: &Path) -> GitResult<()> {
    let path_str = path.to_string_lossy();
    run_git(repo, &["worktree", "remove", "--force", path_str.as_ref()])?;
    Ok(())
}

/// Prune stale worktree bookkeeping entries.
pub fn prune(repo: &Path) -> GitResult<()> {
    run_git(repo, &["worktree", "prune"])?;
    Ok(())
}
