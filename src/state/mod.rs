//! Flat-file run state under `<repo>/.line/`.
//!
//! Layout:
//!
//! ```text
//! .line/run.pid              ASCII decimal PID of the current run
//! .line/run.lock             advisory flock handle (see `lock`)
//! .line/stations/<name>.pid  "<pid> <rfc3339>" while the agent runs
//! .line/stations/<name>.failed  presence flag, contents "1"
//! ```
//!
//! Writes are whole-file replacements with mode 0o644. Reads of a missing
//! file return the distinguished absent value (PID 0, no timestamp, false)
//! rather than an error.

pub mod lock;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::proc;

/// Name of the state directory inside the repository.
pub const STATE_DIR: &str = ".line";

const RUN_PID_FILE: &str = "run.pid";
const STATIONS_DIR: &str = "stations";

/// The `.line` directory for a repository.
pub fn line_dir(repo: &Path) -> PathBuf {
    repo.join(STATE_DIR)
}

fn stations_dir(repo: &Path) -> PathBuf {
    line_dir(repo).join(STATIONS_DIR)
}

fn run_pid_path(repo: &Path) -> PathBuf {
    line_dir(repo).join(RUN_PID_FILE)
}

fn station_pid_path(repo: &Path, station: &str) -> PathBuf {
    stations_dir(repo).join(format!("{station}.pid"))
}

fn station_failed_path(repo: &Path, station: &str) -> PathBuf {
    stations_dir(repo).join(format!("{station}.failed"))
}

fn write_file(path: &Path, contents: &str) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(path)?;
        file.write_all(contents.as_bytes())
    }
    #[cfg(not(unix))]
    {
        fs::write(path, contents)
    }
}

fn remove_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Write the current run's PID file.
pub fn write_run_pid(repo: &Path, pid: u32) -> io::Result<()> {
    fs::create_dir_all(line_dir(repo))?;
    write_file(&run_pid_path(repo), &pid.to_string())
}

/// Read the recorded run PID. Returns 0 when absent or unreadable.
pub fn read_run_pid(repo: &Path) -> u32 {
    match fs::read_to_string(run_pid_path(repo)) {
        Ok(contents) => contents.trim().parse().unwrap_or(0),
        Err(_) => 0,
    }
}

/// Remove the run PID file.
pub fn remove_run_pid(repo: &Path) -> io::Result<()> {
    remove_file(&run_pid_path(repo))
}

/// A station agent's recorded process: PID plus start timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationProcess {
    pub pid: u32,
    pub started_at: Option<DateTime<Utc>>,
}

impl StationProcess {
    /// The absent value returned when no process file exists.
    pub fn absent() -> Self {
        StationProcess {
            pid: 0,
            started_at: None,
        }
    }
}

/// Record a station agent's PID and start time.
pub fn write_station_pid(
    repo: &Path,
    station: &str,
    pid: u32,
    started_at: DateTime<Utc>,
) -> io::Result<()> {
    fs::create_dir_all(stations_dir(repo))?;
    let stamp = started_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    write_file(&station_pid_path(repo, station), &format!("{pid} {stamp}"))
}

/// Read a station agent's recorded process. Absent file yields PID 0.
pub fn read_station_pid(repo: &Path, station: &str) -> StationProcess {
    let Ok(contents) = fs::read_to_string(station_pid_path(repo, station)) else {
        return StationProcess::absent();
    };
    let trimmed = contents.trim();
    let mut parts = trimmed.splitn(2, ' ');
    let pid = parts
        .next()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);
    let started_at = parts
        .next()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|stamp| stamp.with_timezone(&Utc));
    StationProcess { pid, started_at }
}

/// Remove a station's process file.
pub fn remove_station_pid(repo: &Path, station: &str) -> io::Result<()> {
    remove_file(&station_pid_path(repo, station))
}

/// Write a station's failure marker.
pub fn write_station_failed(repo: &Path, station: &str) -> io::Result<()> {
    fs::create_dir_all(stations_dir(repo))?;
    write_file(&station_failed_path(repo, station), "1")
}

/// Whether a station's last execution failed.
pub fn station_failed(repo: &Path, station: &str) -> bool {
    station_failed_path(repo, station).exists()
}

/// Clear a station's failure marker.
pub fn remove_station_failed(repo: &Path, station: &str) -> io::Result<()> {
    remove_file(&station_failed_path(repo, station))
}

/// Kill every recorded station agent and remove its process file.
///
/// Agents run in their own process groups, so killing the runner's group
/// never reaches them; each must be signalled via its own group.
pub fn kill_all_station_agents(repo: &Path) {
    let Ok(entries) = fs::read_dir(stations_dir(repo)) else {
        return;
    };
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(station) = file_name.to_str().and_then(|name| name.strip_suffix(".pid")) else {
            continue;
        };
        let process = read_station_pid(repo, station);
        if process.pid > 0 && proc::is_running(process.pid) {
            tracing::info!(station, pid = process.pid, "killing station agent");
            proc::kill_group(process.pid);
        }
        let _ = remove_station_pid(repo, station);
    }
}
