//! Pipeline driver: the top-level orchestrator for one engine run.
//!
//! A run is a short-lived process fired by the post-commit hook. It checks
//! the entry guards, preempts any in-flight predecessor run, takes the
//! exclusive run lock, then executes the configured stations in order. Each
//! station's predecessor is the watched branch for the first station and the
//! previous station's output branch after that.
//!
//! Clean skips (guards, lock held by a sibling) are successes: the hook that
//! invoked the engine must never fail because the engine chose not to run.

mod signal;

#[cfg(test)]
mod driver_tests;

use std::fs;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::config::Config;
use crate::git::{self, worktree};
use crate::ignore;
use crate::markers;
use crate::proc;
use crate::state::{self, lock::LockError, lock::RunLock};
use crate::station::run_station;

/// Lock acquisition attempts after preempting a predecessor run. The old
/// process may still be tearing down; each retry waits 100ms.
const PREEMPTION_LOCK_ATTEMPTS: u32 = 20;

/// Errors from the pipeline driver. These are internal failures; guarded
/// skips and sibling locks are not errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A git operation failed.
    #[error(transparent)]
    Git(#[from] git::GitError),

    /// Acquiring the run lock failed for a reason other than contention.
    #[error("acquiring run lock: {0}")]
    Lock(LockError),

    /// Writing run state failed.
    #[error("run state: {0}")]
    State(#[from] std::io::Error),
}

/// Removes the run's on-disk footprint when the run ends: PID file, worktree
/// base directory, stale worktree bookkeeping.
struct RunGuard<'a> {
    repo: &'a Path,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        signal::disarm();
        let _ = state::remove_run_pid(self.repo);
        if let Ok(base) = worktree::base_dir(self.repo) {
            let _ = fs::remove_dir_all(&base);
        }
        let _ = worktree::prune(self.repo);
    }
}

/// Execute one engine run against the repository.
///
/// Returns `Ok(())` on every clean path, including guarded skips and a lock
/// held by a concurrent sibling.
pub fn run(repo: &Path, config: &Config) -> Result<(), PipelineError> {
    // Re-entry guard: stations that commit from inside their worktree fire
    // the post-commit hook again; the nested engine must bow out.
    if std::env::var(proc::RUNNING_ENV_VAR).as_deref() == Ok("1") {
        tracing::info!("skipping: pipeline already running (LINE_RUNNING=1)");
        return Ok(());
    }

    git::repair_core_bare(repo);

    let current = git::current_branch(repo)?;
    if current != config.settings.watches {
        tracing::info!(
            current = %current,
            watches = %config.settings.watches,
            "skipping: not on watched branch"
        );
        return Ok(());
    }

    let subject = git::last_commit_subject(repo)?;
    if markers::contains_skip_marker(&subject) {
        tracing::info!(subject = %subject, "skipping: commit carries a skip marker");
        return Ok(());
    }

    // Root commits have no HEAD~1; nothing to filter on then.
    let changed = git::diff_files(repo, "HEAD~1", "HEAD").unwrap_or_default();
    if !changed.is_empty() {
        match ignore::load(repo) {
            Ok(matcher) if matcher.all_ignored(&changed) => {
                tracing::info!("skipping: all changed files match .lineignore");
                return Ok(());
            }
            Err(err) => tracing::warn!(error = %err, "could not load .lineignore"),
            Ok(_) => {}
        }
    }

    if caught_up_with_terminal(repo, config)? {
        tracing::info!("skipping: watched branch adds only skip-marked station commits");
        return Ok(());
    }

    // Preemption: a live predecessor run is killed, station agents first.
    // The agents run in their own process groups and would survive a signal
    // to the runner's group alone.
    let previous = state::read_run_pid(repo);
    let preempted =
        previous > 0 && previous != std::process::id() && proc::is_running(previous);
    if preempted {
        tracing::info!(pid = previous, "terminating previous run");
        state::kill_all_station_agents(repo);
        proc::kill_group(previous);
    }

    let attempts = if preempted { PREEMPTION_LOCK_ATTEMPTS } else { 1 };
    let _lock = match acquire_lock(repo, attempts)? {
        Some(lock) => lock,
        None => {
            tracing::info!("skipping: another run holds the lock");
            return Ok(());
        }
    };

    state::write_run_pid(repo, std::process::id())?;
    signal::arm(repo);
    let _run_guard = RunGuard { repo };

    // Pre-cleanup handles a crashed predecessor's leftovers; the guard's
    // post-cleanup handles the happy path.
    if let Ok(base) = worktree::base_dir(repo) {
        let _ = fs::remove_dir_all(&base);
    }
    let _ = worktree::prune(repo);

    let mut predecessor = config.settings.watches.clone();
    for station in &config.stations {
        tracing::info!(station = %station.name, predecessor = %predecessor, "running station");
        if let Err(err) = run_station(repo, config, station, &predecessor) {
            tracing::error!(station = %station.name, error = %err, "station failed, halting pipeline");
            break;
        }
        predecessor = config.station_branch(&station.name);
    }

    Ok(())
}

/// Cycle-prevention check for the post-rebase case.
///
/// After the user rebases the watched branch onto the terminal station
/// branch, the watched HEAD descends from the terminal tip via station
/// commits only. Re-running then would manufacture work out of the
/// pipeline's own output; skip unless some commit past the terminal tip is
/// not skip-marked.
fn caught_up_with_terminal(repo: &Path, config: &Config) -> Result<bool, PipelineError> {
    let Some(terminal) = config.stations.last() else {
        return Ok(false);
    };
    let branch = config.station_branch(&terminal.name);
    if !git::branch_exists(repo, &branch) {
        return Ok(false);
    }
    if !git::is_ancestor(repo, &branch, "HEAD")? {
        return Ok(false);
    }

    let subjects = git::subjects_between(repo, &branch, "HEAD")?;
    if subjects.is_empty() {
        // HEAD is the terminal tip itself.
        return Ok(true);
    }
    Ok(markers::all_skip_marked(&subjects))
}

/// Non-blocking lock acquisition with a bounded number of attempts.
/// `Ok(None)` means the lock is held by someone else after all attempts.
fn acquire_lock(repo: &Path, attempts: u32) -> Result<Option<RunLock>, PipelineError> {
    let mut attempt = 0;
    loop {
        match RunLock::acquire(repo) {
            Ok(lock) => return Ok(Some(lock)),
            Err(LockError::Held) => {
                attempt += 1;
                if attempt >= attempts {
                    return Ok(None);
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(err) => return Err(PipelineError::Lock(err)),
        }
    }
}
