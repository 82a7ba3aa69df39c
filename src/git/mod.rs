//! Git adapter: shell `git` wrappers used by the pipeline.
//!
//! Every command runs with the hook-inherited Git environment scrubbed. When
//! the engine is invoked from a post-commit hook, git sets `GIT_DIR` and
//! friends relative to the repository that fired the hook. If these leak into
//! commands that target a worktree, `GIT_DIR=.git` resolves to a *file* (not
//! a directory) inside the worktree and git fails with "index file open
//! failed: Not a directory".
//!
//! Failures whose stderr matches a known-transient pattern (index lock
//! contention, ref lock contention, stale index) are retried with bounded
//! backoff; everything else surfaces immediately.

pub mod retry;
pub mod worktree;

use std::path::Path;
use std::process::{Command, Output};

use thiserror::Error;

use retry::RetryConfig;

/// Git environment variables that must not leak from the invoking hook into
/// child commands.
const SCRUBBED_ENV_VARS: [&str; 6] = [
    "GIT_DIR",
    "GIT_WORK_TREE",
    "GIT_INDEX_FILE",
    "GIT_OBJECT_DIRECTORY",
    "GIT_ALTERNATE_OBJECT_DIRECTORIES",
    "GIT_COMMON_DIR",
];

/// Identity used for station commits, passed via `-c` flags so commits
/// succeed even when the repository has no user configuration.
const COMMIT_USER_NAME: &str = "user.name=assembly-line";
const COMMIT_USER_EMAIL: &str = "user.email=assembly-line@localhost";

/// Errors from git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command exited non-zero (after any transient retries).
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// IO error launching git or resolving a path.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Create a git Command with the hook environment scrubbed and terminal
/// prompts disabled.
pub(crate) fn git_command(workdir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);

    for var in SCRUBBED_ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    // Hooks spawned by git children (e.g. the worktree commit's post-commit
    // hook) must see the re-entry guard.
    cmd.env(crate::proc::RUNNING_ENV_VAR, "1");

    cmd
}

fn command_line(args: &[&str]) -> String {
    format!("git {}", args.join(" "))
}

/// Run a git command in the given working directory, retrying transient
/// failures with bounded backoff.
pub fn run_git(workdir: &Path, args: &[&str]) -> GitResult<Output> {
    let config = RetryConfig::default();
    let mut attempt = 0;
    loop {
        let output = git_command(workdir).args(args).output()?;
        if output.status.success() {
            return Ok(output);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if attempt < config.max_retries && retry::is_transient(&stderr) {
            let delay = config.delay_for_attempt(attempt);
            tracing::debug!(
                command = %command_line(args),
                stderr = %stderr,
                delay_ms = delay.as_millis() as u64,
                "transient git failure, retrying"
            );
            std::thread::sleep(delay);
            attempt += 1;
            continue;
        }

        return Err(GitError::CommandFailed {
            command: command_line(args),
            stderr,
        });
    }
}

/// Run a git command and return its trimmed stdout.
pub fn run_git_stdout(workdir: &Path, args: &[&str]) -> GitResult<String> {
    let output = run_git(workdir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Return the current branch name.
pub fn current_branch(repo: &Path) -> GitResult<String> {
    run_git_stdout(repo, &["rev-parse", "--abbrev-ref", "HEAD"])
}

/// Resolve a revision to its full SHA.
pub fn rev_parse(repo: &Path, rev: &str) -> GitResult<String> {
    run_git_stdout(repo, &["rev-parse", rev])
}

/// Check whether a branch exists.
///
/// A missing ref is a normal outcome here, not an error, so this bypasses the
/// retry machinery entirely.
pub fn branch_exists(repo: &Path, branch: &str) -> bool {
    git_command(repo)
        .args(["rev-parse", "--verify", "--quiet", branch])
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Create a branch at the given start point.
pub fn create_branch(repo: &Path, branch: &str, start_point: &str) -> GitResult<()> {
    run_git(repo, &["branch", branch, start_point])?;
    Ok(())
}

/// Check if one revision is an ancestor of another.
pub fn is_ancestor(repo: &Path, ancestor: &str, descendant: &str) -> GitResult<bool> {
    let output = git_command(repo)
        .args(["merge-base", "--is-ancestor", ancestor, descendant])
        .output()?;

    // Exit 0 = is ancestor, exit 1 = not ancestor, other = error
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => Err(GitError::CommandFailed {
            command: format!("git merge-base --is-ancestor {ancestor} {descendant}"),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
    }
}

/// Count the commits reachable from a revision or range.
pub fn rev_list_count(repo: &Path, rev: &str) -> GitResult<u64> {
    let out = run_git_stdout(repo, &["rev-list", "--count", rev])?;
    Ok(out.parse().unwrap_or(0))
}

/// Return the subject of the most recent commit.
pub fn last_commit_subject(repo: &Path) -> GitResult<String> {
    run_git_stdout(repo, &["log", "-1", "--format=%s"])
}

/// Return the subjects of every commit in `from..to`, newest first.
pub fn subjects_between(repo: &Path, from: &str, to: &str) -> GitResult<Vec<String>> {
    let range = format!("{from}..{to}");
    let out = run_git_stdout(repo, &["log", "--format=%s", &range])?;
    if out.is_empty() {
        return Ok(Vec::new());
    }
    Ok(out.lines().map(String::from).collect())
}

/// Return the paths changed between two revisions.
pub fn diff_files(repo: &Path, from: &str, to: &str) -> GitResult<Vec<String>> {
    let out = run_git_stdout(repo, &["diff", "--name-only", from, to])?;
    if out.is_empty() {
        return Ok(Vec::new());
    }
    Ok(out.lines().map(String::from).collect())
}

/// Rebase the current branch onto the given revision.
///
/// Carries the engine identity: replayed commits need a committer even when
/// the repository has none configured.
pub fn rebase(workdir: &Path, onto: &str) -> GitResult<()> {
    run_git(
        workdir,
        &[
            "-c",
            COMMIT_USER_NAME,
            "-c",
            COMMIT_USER_EMAIL,
            "rebase",
            onto,
        ],
    )?;
    Ok(())
}

/// Abort an in-progress rebase.
pub fn rebase_abort(workdir: &Path) -> GitResult<()> {
    run_git(workdir, &["rebase", "--abort"])?;
    Ok(())
}

/// Hard-reset the current branch to the given revision.
pub fn reset_hard(workdir: &Path, target: &str) -> GitResult<()> {
    run_git(workdir, &["reset", "--hard", target])?;
    Ok(())
}

/// Stage all changes and commit them with the given message.
///
/// The `.line/` directory is unstaged first: runtime state must not pollute
/// history. Returns `false` (without committing) when nothing changed.
pub fn commit_all(workdir: &Path, message: &str) -> GitResult<bool> {
    run_git(workdir, &["add", "-A"])?;
    let _ = run_git(workdir, &["reset", "--", ".line/"]);

    let status = run_git_stdout(workdir, &["status", "--porcelain"])?;
    if status.is_empty() {
        return Ok(false);
    }

    run_git(
        workdir,
        &[
            "-c",
            COMMIT_USER_NAME,
            "-c",
            COMMIT_USER_EMAIL,
            "commit",
            "-m",
            message,
        ],
    )?;
    Ok(true)
}

/// Repair `core.bare=true`, a known corruption caused by concurrent writes
/// between editor git integrations and the engine. Silent when the setting is
/// already sane.
pub fn repair_core_bare(repo: &Path) {
    let Ok(output) = git_command(repo).args(["config", "core.bare"]).output() else {
        return;
    };
    if !output.status.success() {
        return; // not set, nothing to repair
    }
    if String::from_utf8_lossy(&output.stdout).trim() != "true" {
        return;
    }

    match run_git(repo, &["config", "core.bare", "false"]) {
        Ok(_) => tracing::info!("repaired corrupted core.bare=true"),
        Err(err) => tracing::warn!(error = %err, "failed to repair core.bare=true"),
    }
}
