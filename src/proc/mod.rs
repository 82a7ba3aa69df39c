//! Subprocess supervision for station agents.
//!
//! Agents run in their own process group so a preempting run can tear one
//! down without touching (or waiting on) the runner that started it. The
//! child environment is the current environment minus the scrub list, plus
//! `LINE_RUNNING=1` so re-entry guards can detect nesting.

use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus};

/// Environment variable marking that the pipeline is running. The primary
/// re-entry guard.
pub const RUNNING_ENV_VAR: &str = "LINE_RUNNING";

/// Variables the agent must not see. A nested assistant process that inherits
/// `CLAUDECODE` refuses to start a fresh session.
const SCRUBBED_ENV_VARS: [&str; 1] = ["CLAUDECODE"];

/// A running station agent subprocess.
pub struct AgentProcess {
    child: Child,
}

/// Launch an agent in `workdir` with the prompt appended as the final
/// argument. stdout/stderr are inherited so agent output reaches the hook's
/// terminal.
pub fn start_agent(
    workdir: &Path,
    command: &str,
    args: &[String],
    prompt: &str,
) -> io::Result<AgentProcess> {
    let mut cmd = Command::new(command);
    cmd.args(args).arg(prompt).current_dir(workdir);

    for var in SCRUBBED_ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env(RUNNING_ENV_VAR, "1");

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Fresh process group: the agent must be killable independently of
        // the runner's group.
        cmd.process_group(0);
    }

    let child = cmd.spawn()?;
    Ok(AgentProcess { child })
}

impl AgentProcess {
    /// PID of the agent (also its process group id on Unix).
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Block until the agent exits.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }
}

/// Zero-signal liveness probe.
#[cfg(unix)]
pub fn is_running(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Best-effort liveness check where no zero-signal probe exists: a recorded
/// PID is conservatively assumed alive.
#[cfg(not(unix))]
pub fn is_running(pid: u32) -> bool {
    pid != 0
}

/// Send SIGTERM to the process group of `pid`, falling back to the process
/// itself when it is not a group leader (e.g. a runner started from a hook
/// without a new session).
#[cfg(unix)]
pub fn kill_group(pid: u32) {
    if pid == 0 {
        return;
    }
    unsafe {
        if libc::kill(-(pid as libc::pid_t), libc::SIGTERM) != 0 {
            let _ = libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

/// Process groups are unavailable here; kill the process tree directly.
#[cfg(not(unix))]
pub fn kill_group(pid: u32) {
    if pid == 0 {
        return;
    }
    let _ = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .status();
}
