//! Shared test helpers: temporary repositories and configurations.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tempfile::TempDir;

use crate::config::{Agent, Config, Settings, Station};
use crate::git::{run_git, run_git_stdout};

/// Guards process-global environment variables across parallel tests.
///
/// Tests that *mutate* the environment (re-entry guard, poisoned hook vars)
/// take the write side; tests whose behavior merely *depends* on it take the
/// read side, so mutators never overlap them.
static ENV_LOCK: RwLock<()> = RwLock::new(());

/// Shared access for tests that read the process environment.
pub fn env_read() -> RwLockReadGuard<'static, ()> {
    ENV_LOCK.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Exclusive access for tests that mutate the process environment.
pub fn env_write() -> RwLockWriteGuard<'static, ()> {
    ENV_LOCK.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Create a temporary repository on `main` with one initial commit.
///
/// `.line/` is gitignored, as the installer arranges in a real repository.
/// The returned path is canonicalized so worktree hashing sees the same path
/// the engine will.
pub fn init_repo() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let repo = temp.path().canonicalize().unwrap();

    run_git(&repo, &["init", "-b", "main"]).unwrap();
    run_git(&repo, &["config", "user.email", "test@test.com"]).unwrap();
    run_git(&repo, &["config", "user.name", "Test"]).unwrap();

    fs::write(repo.join(".gitignore"), ".line/\n").unwrap();
    fs::write(repo.join("README.md"), "# Test\n").unwrap();
    run_git(&repo, &["add", "."]).unwrap();
    run_git(&repo, &["commit", "-m", "Initial commit"]).unwrap();

    (temp, repo)
}

/// Write a file and commit it with the given message.
pub fn commit_file(repo: &Path, name: &str, contents: &str, message: &str) {
    let path = repo.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
    run_git(repo, &["add", "."]).unwrap();
    run_git(repo, &["commit", "-m", message]).unwrap();
}

/// Run git and return trimmed stdout, panicking on failure.
pub fn stdout(repo: &Path, args: &[&str]) -> String {
    run_git_stdout(repo, args).unwrap()
}

/// A station whose agent is a shell one-liner.
pub fn shell_station(name: &str, script: &str) -> Station {
    Station {
        name: name.to_string(),
        prompt: format!("Run the {name} station"),
        command: Some("sh".to_string()),
        args: Some(vec!["-c".to_string(), script.to_string()]),
        preamble: None,
    }
}

/// A config watching `main` with the default branch prefix.
pub fn config_with_stations(stations: Vec<Station>) -> Config {
    Config {
        agent: Agent {
            command: Some("sh".to_string()),
            args: Some(vec!["-c".to_string(), "true".to_string()]),
        },
        settings: Settings {
            watches: "main".to_string(),
            branch_prefix: "line/stn/".to_string(),
        },
        preamble: None,
        permissions: None,
        gates: Vec::new(),
        stations,
    }
}
