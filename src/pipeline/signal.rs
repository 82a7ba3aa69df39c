//! SIGINT/SIGTERM teardown for an active run.
//!
//! The handler kills the in-flight station agent (its process file is on
//! disk), drops the run's PID file and worktrees, then exits. The flock on
//! `run.lock` is released by the OS on process exit. No failure marker is
//! written: a cancelled run is not a failed station.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use crate::git::worktree;
use crate::state;

static ACTIVE_REPO: Mutex<Option<PathBuf>> = Mutex::new(None);
static INSTALL: Once = Once::new();

/// Register `repo` as the run to tear down when the process is signalled.
pub fn arm(repo: &Path) {
    if let Ok(mut active) = ACTIVE_REPO.lock() {
        *active = Some(repo.to_path_buf());
    }
    INSTALL.call_once(|| {
        if let Err(err) = ctrlc::set_handler(handle_signal) {
            tracing::warn!(error = %err, "could not install signal handler");
        }
    });
}

/// Clear the registered run once it has finished cleanly.
pub fn disarm() {
    if let Ok(mut active) = ACTIVE_REPO.lock() {
        *active = None;
    }
}

fn handle_signal() {
    let repo = ACTIVE_REPO.lock().ok().and_then(|active| active.clone());
    if let Some(repo) = repo {
        tracing::info!("interrupted, tearing down run");
        state::kill_all_station_agents(&repo);
        let _ = state::remove_run_pid(&repo);
        if let Ok(base) = worktree::base_dir(&repo) {
            let _ = std::fs::remove_dir_all(&base);
        }
    }
    std::process::exit(0);
}
