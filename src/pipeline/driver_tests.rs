//! End-to-end driver scenarios against real repositories.
//!
//! Each test builds a throwaway repository, runs the pipeline in-process with
//! shell one-liners standing in for agents, and asserts on the resulting
//! branch topology and `.line/` state.

use std::fs;
use std::path::Path;

use super::run;
use crate::config::Config;
use crate::git::{self, worktree};
use crate::proc;
use crate::state;
use crate::test_utils::{
    commit_file, config_with_stations, env_read, env_write, init_repo, shell_station, stdout,
};

/// Run the pipeline under the shared environment guard, so tests that mutate
/// process-global variables can never overlap an in-flight run.
fn run_pipeline(repo: &Path, config: &Config) {
    let _env = env_read();
    run(repo, config).unwrap();
}

#[test]
fn single_station_single_commit() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");
    let main_head = stdout(&repo, &["rev-parse", "main"]);

    let config = config_with_stations(vec![shell_station(
        "security",
        "echo reviewed > review.txt",
    )]);
    run_pipeline(&repo, &config);

    assert!(git::branch_exists(&repo, "line/stn/security"));

    let subject = stdout(&repo, &["log", "-1", "--format=%s", "line/stn/security"]);
    assert!(subject.starts_with("[SECURITY]"));
    assert!(subject.contains("[skip line]"));

    let body = stdout(&repo, &["log", "-1", "--format=%B", "line/stn/security"]);
    assert!(body.contains(&format!("Triggered-By: {main_head}")));

    assert_eq!(
        stdout(&repo, &["show", "line/stn/security:review.txt"]),
        "reviewed"
    );

    // The watched branch never moves.
    assert_eq!(stdout(&repo, &["rev-parse", "main"]), main_head);
}

#[test]
fn chained_stations_inherit_upstream_output() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");

    let config = config_with_stations(vec![
        shell_station("upstream", "echo line >> out.txt"),
        shell_station("downstream", "echo line >> out.txt"),
    ]);
    run_pipeline(&repo, &config);

    assert!(git::branch_exists(&repo, "line/stn/upstream"));
    assert!(git::branch_exists(&repo, "line/stn/downstream"));

    // Downstream sees upstream's line and appends its own.
    let out = stdout(&repo, &["show", "line/stn/downstream:out.txt"]);
    assert_eq!(out.lines().count(), 2);

    // History is linear: rebases, never merges.
    let merges = stdout(
        &repo,
        &["log", "--merges", "--format=%H", "main..line/stn/downstream"],
    );
    assert!(merges.is_empty());
}

#[test]
fn rerun_without_new_commits_is_idempotent() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");

    let config = config_with_stations(vec![shell_station(
        "security",
        "echo reviewed > review.txt",
    )]);
    run_pipeline(&repo, &config);
    let count_first = git::rev_list_count(&repo, "line/stn/security").unwrap();

    run_pipeline(&repo, &config);
    let count_second = git::rev_list_count(&repo, "line/stn/security").unwrap();

    assert_eq!(count_first, count_second);
}

#[test]
fn rebase_onto_terminal_branch_does_not_retrigger() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");

    let config = config_with_stations(vec![
        shell_station("upstream", "echo line >> out.txt"),
        shell_station("downstream", "echo line >> out.txt"),
    ]);
    run_pipeline(&repo, &config);

    let upstream_count = stdout(&repo, &["rev-list", "--count", "line/stn/upstream"]);
    let downstream_count = stdout(&repo, &["rev-list", "--count", "line/stn/downstream"]);

    // The user adopts the terminal branch's work.
    stdout(&repo, &["rebase", "line/stn/downstream"]);

    run_pipeline(&repo, &config);

    assert_eq!(
        stdout(&repo, &["rev-list", "--count", "line/stn/upstream"]),
        upstream_count
    );
    assert_eq!(
        stdout(&repo, &["rev-list", "--count", "line/stn/downstream"]),
        downstream_count
    );
}

#[test]
fn new_user_commit_after_rebase_retriggers() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");

    let config = config_with_stations(vec![shell_station("docs", "echo doc >> doc.txt")]);
    run_pipeline(&repo, &config);
    let count_first: u64 = stdout(&repo, &["rev-list", "--count", "line/stn/docs"])
        .parse()
        .unwrap();

    stdout(&repo, &["rebase", "line/stn/docs"]);
    commit_file(&repo, "feature.txt", "new feature\n", "Add new feature");

    run_pipeline(&repo, &config);
    let count_second: u64 = stdout(&repo, &["rev-list", "--count", "line/stn/docs"])
        .parse()
        .unwrap();

    assert!(count_second > count_first);
    let feature = stdout(&repo, &["show", "line/stn/docs:feature.txt"]);
    assert_eq!(feature, "new feature");
}

#[test]
fn failed_station_halts_the_pipeline() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");

    let config = config_with_stations(vec![
        shell_station("flaky", "exit 1"),
        shell_station("after", "echo later > later.txt"),
    ]);
    run_pipeline(&repo, &config);

    assert!(state::station_failed(&repo, "flaky"));
    assert!(!git::branch_exists(&repo, "line/stn/after"));
}

#[test]
fn skip_marked_commit_does_not_trigger() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "notes.txt", "notes\n", "Update notes [skip ci]");

    let config = config_with_stations(vec![shell_station("security", "echo x > x.txt")]);
    run_pipeline(&repo, &config);

    assert!(!git::branch_exists(&repo, "line/stn/security"));
}

#[test]
fn fully_ignored_commit_does_not_trigger() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, ".lineignore", "docs/**\n", "Add lineignore");
    commit_file(&repo, "docs/note.md", "note\n", "Add note");

    let config = config_with_stations(vec![shell_station("security", "echo x > x.txt")]);
    run_pipeline(&repo, &config);

    assert!(!git::branch_exists(&repo, "line/stn/security"));
}

#[test]
fn partially_ignored_commit_still_triggers() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, ".lineignore", "docs/**\n", "Add lineignore");
    fs::create_dir_all(repo.join("docs")).unwrap();
    fs::write(repo.join("docs/note.md"), "note\n").unwrap();
    fs::write(repo.join("code.go"), "package main\n").unwrap();
    stdout(&repo, &["add", "."]);
    stdout(&repo, &["commit", "-m", "Add note and code"]);

    let config = config_with_stations(vec![shell_station("security", "echo x > x.txt")]);
    run_pipeline(&repo, &config);

    assert!(git::branch_exists(&repo, "line/stn/security"));
}

#[test]
fn other_branches_do_not_trigger() {
    let (_tmp, repo) = init_repo();
    stdout(&repo, &["checkout", "-b", "feature"]);
    commit_file(&repo, "code.go", "package main\n", "Add code");

    let config = config_with_stations(vec![shell_station("security", "echo x > x.txt")]);
    run_pipeline(&repo, &config);

    assert!(!git::branch_exists(&repo, "line/stn/security"));
}

#[test]
fn reentry_guard_skips_nested_runs() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");

    let _env = env_write();
    std::env::set_var(proc::RUNNING_ENV_VAR, "1");
    let config = config_with_stations(vec![shell_station("security", "echo x > x.txt")]);
    let result = run(&repo, &config);
    std::env::remove_var(proc::RUNNING_ENV_VAR);

    result.unwrap();
    assert!(!git::branch_exists(&repo, "line/stn/security"));
}

#[test]
fn run_survives_poisoned_hook_environment() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");

    let _env = env_write();
    std::env::set_var("GIT_DIR", "/nonexistent/bogus/.git");
    std::env::set_var("GIT_WORK_TREE", "/nonexistent/bogus");
    let config = config_with_stations(vec![shell_station("security", "echo x > x.txt")]);
    let result = run(&repo, &config);
    std::env::remove_var("GIT_DIR");
    std::env::remove_var("GIT_WORK_TREE");

    result.unwrap();
    assert!(git::branch_exists(&repo, "line/stn/security"));
}

#[test]
fn sibling_holding_the_lock_wins() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");

    let _sibling = state::lock::RunLock::acquire(&repo).unwrap();

    let config = config_with_stations(vec![shell_station("security", "echo x > x.txt")]);
    run_pipeline(&repo, &config);

    assert!(!git::branch_exists(&repo, "line/stn/security"));
}

#[test]
fn run_leaves_the_main_worktree_untouched() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");
    let head_before = stdout(&repo, &["rev-parse", "HEAD"]);

    let config = config_with_stations(vec![shell_station("security", "echo x > x.txt")]);
    run_pipeline(&repo, &config);

    assert_eq!(stdout(&repo, &["rev-parse", "HEAD"]), head_before);
    assert_eq!(stdout(&repo, &["status", "--porcelain"]), "");
    assert!(!repo.join("x.txt").exists());
}

#[test]
fn process_files_are_absent_after_a_run() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");

    let config = config_with_stations(vec![shell_station("security", "echo x > x.txt")]);
    run_pipeline(&repo, &config);

    assert_eq!(state::read_run_pid(&repo), 0);
    assert_eq!(state::read_station_pid(&repo, "security").pid, 0);
    assert!(!worktree::base_dir(&repo).unwrap().exists());
}

#[cfg(unix)]
#[test]
fn preemption_kills_the_previous_run_and_its_agents() {
    use std::os::unix::process::ExitStatusExt;

    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");

    // Stand-ins for the previous run: a runner and its in-flight agent, each
    // in its own process group exactly as the engine arranges.
    let sleep_args = vec!["-c".to_string(), "sleep 30".to_string()];
    let mut old_runner = proc::start_agent(&repo, "sh", &sleep_args, "unused").unwrap();
    let mut old_agent = proc::start_agent(&repo, "sh", &sleep_args, "unused").unwrap();
    state::write_run_pid(&repo, old_runner.pid()).unwrap();
    state::write_station_pid(&repo, "slow", old_agent.pid(), chrono::Utc::now()).unwrap();

    assert!(proc::is_running(old_agent.pid()));

    let config = config_with_stations(vec![shell_station("quick", "echo done > done.txt")]);
    run_pipeline(&repo, &config);

    // Both were terminated, agents first; wait() reaps and reports the signal.
    assert_eq!(old_agent.wait().unwrap().signal(), Some(libc::SIGTERM));
    assert_eq!(old_runner.wait().unwrap().signal(), Some(libc::SIGTERM));

    // The successor still did its work.
    assert!(git::branch_exists(&repo, "line/stn/quick"));
    assert_eq!(state::read_run_pid(&repo), 0);
}

#[test]
fn dead_predecessor_pid_is_ignored() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");

    // A stale PID from a crashed run; nothing to kill.
    state::write_run_pid(&repo, 0).unwrap();

    let config = config_with_stations(vec![shell_station("security", "echo x > x.txt")]);
    run_pipeline(&repo, &config);

    assert!(git::branch_exists(&repo, "line/stn/security"));
}

#[test]
fn station_commit_subjects_never_retrigger() {
    let (_tmp, repo) = init_repo();
    commit_file(&repo, "code.go", "package main\n", "Add code");

    let config = config_with_stations(vec![shell_station("docs", "echo doc > doc.txt")]);
    run_pipeline(&repo, &config);

    // Every commit unique to the station branch is skip-marked, so adopting
    // it wholesale can never start a new run.
    let subjects = git::subjects_between(&repo, "main", "line/stn/docs").unwrap();
    assert!(!subjects.is_empty());
    assert!(crate::markers::all_skip_marked(&subjects));
}
