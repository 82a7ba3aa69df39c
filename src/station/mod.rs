//! Station executor: one agent invocation in an isolated worktree.
//!
//! A station run is: ensure the output branch, materialize a fresh worktree
//! on it, catch up on the predecessor (rebase, or reset on conflict), run the
//! agent, then commit whatever the agent wrote. The worktree is removed on
//! every exit path; the user's working tree is never touched.

pub mod context;
pub mod permissions;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::config::{Config, Station};
use crate::git::{self, worktree, GitError};
use crate::markers;
use crate::proc;
use crate::state;

/// Errors from executing a station.
#[derive(Debug, Error)]
pub enum StationError {
    /// A git operation failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// The agent executable could not be started.
    #[error("starting agent {command:?}: {source}")]
    AgentSpawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Waiting on the agent failed.
    #[error("waiting for agent: {0}")]
    AgentWait(io::Error),

    /// The agent exited non-zero. The failure marker has been written.
    #[error("agent exited with {status}")]
    AgentFailed { status: std::process::ExitStatus },

    /// Writing station state or worktree scaffolding failed.
    #[error("station state: {0}")]
    State(#[from] io::Error),
}

/// Removes the station worktree on every exit path, including panics and
/// early returns: entry, directory, then stale bookkeeping.
struct WorktreeGuard<'a> {
    repo: &'a Path,
    path: PathBuf,
}

impl Drop for WorktreeGuard<'_> {
    fn drop(&mut self) {
        let _ = worktree::remove(self.repo, &self.path);
        if self.path.exists() {
            let _ = fs::remove_dir_all(&self.path);
        }
        let _ = worktree::prune(self.repo);
    }
}

/// Execute one station against its predecessor branch.
///
/// On success the station's output branch ends at a commit whose subject
/// carries the skip marker (when the agent produced changes) or at the
/// rebased predecessor (when it did not).
pub fn run_station(
    repo: &Path,
    config: &Config,
    station: &Station,
    predecessor: &str,
) -> Result<(), StationError> {
    let resolved = config.resolve_station(station);
    let branch = config.station_branch(&station.name);

    if !git::branch_exists(repo, &branch) {
        git::create_branch(repo, &branch, predecessor)?;
    }

    // The Triggered-By target: the predecessor HEAD observed at station start.
    let predecessor_head = git::rev_parse(repo, predecessor)?;

    let path = worktree::station_path(repo, &station.name)?;

    // Crash recovery: a previous run may have left a registered worktree or a
    // bare directory at this path.
    let _ = worktree::remove(repo, &path);
    if path.exists() {
        fs::remove_dir_all(&path)?;
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    worktree::add(repo, &path, &branch)?;
    let _guard = WorktreeGuard { repo, path: path.clone() };

    // Catch up on the predecessor. A conflict is resolved by discarding the
    // station's local lineage: the branch stays a moving summary of "what the
    // agent would do given the current predecessor", and the old tip remains
    // reachable from the reflog.
    if let Err(err) = git::rebase(&path, predecessor) {
        tracing::warn!(
            station = %station.name,
            error = %err,
            "rebase conflict, resetting to predecessor"
        );
        let _ = git::rebase_abort(&path);
        git::reset_hard(&path, predecessor)?;
    }

    if let Some(permissions) = &config.permissions {
        permissions::write_permissions(&path, permissions)?;
    }

    let prompt = context::assemble_prompt(config, station);
    let mut agent = proc::start_agent(&path, &resolved.command, &resolved.args, &prompt)
        .map_err(|source| StationError::AgentSpawn {
            command: resolved.command.clone(),
            source,
        })?;

    if let Err(err) = state::write_station_pid(repo, &station.name, agent.pid(), Utc::now()) {
        tracing::warn!(station = %station.name, error = %err, "could not write station process file");
    }

    let wait_result = agent.wait();
    let _ = state::remove_station_pid(repo, &station.name);

    let status = wait_result.map_err(StationError::AgentWait)?;
    if !status.success() {
        let _ = state::write_station_failed(repo, &station.name);
        return Err(StationError::AgentFailed { status });
    }
    let _ = state::remove_station_failed(repo, &station.name);

    let subject = format!(
        "[{}] Agent changes {}",
        station.name.to_uppercase(),
        markers::COMMIT_SKIP_MARKER
    );
    let message = format!("{subject}\n\nTriggered-By: {predecessor_head}");
    if git::commit_all(&path, &message)? {
        tracing::info!(station = %station.name, branch = %branch, "committed agent changes");
    }

    Ok(())
}
