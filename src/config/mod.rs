//! `line.yaml` loading and validation.
//!
//! The engine consumes a validated [`Config`]; invalid configuration means
//! the engine is never invoked. Stations inherit the top-level agent
//! command/args unless they override them, and the pipeline order is the
//! declaration order: the first station's predecessor is the watched branch,
//! every later station's predecessor is the previous station's output branch.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default prefix applied to a station name to derive its output branch.
pub const DEFAULT_BRANCH_PREFIX: &str = "line/stn/";

/// Errors loading `line.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The YAML could not be parsed into the config shape.
    #[error("parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// `settings.watches` is missing or empty.
    #[error("config: settings.watches is required")]
    MissingWatches,
}

/// Default agent command and arguments inherited by all stations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Agent {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
}

/// Global settings for the line.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// The branch whose new commits trigger the pipeline.
    pub watches: String,

    /// Prefix applied to a station name to derive its output branch.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_branch_prefix() -> String {
    DEFAULT_BRANCH_PREFIX.to_string()
}

/// A single agent invocation stage.
#[derive(Debug, Clone, Deserialize)]
pub struct Station {
    /// Unique station name; maps directly to the output branch
    /// `<branch_prefix><name>`.
    pub name: String,

    /// Prompt passed to the agent as its final argument.
    pub prompt: String,

    /// Executable overriding `agent.command`.
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments overriding `agent.args`.
    #[serde(default)]
    pub args: Option<Vec<String>>,

    /// Preamble overriding the global (and default) preamble.
    #[serde(default)]
    pub preamble: Option<String>,
}

/// Tool permissions forwarded verbatim into `.claude/settings.json` inside
/// each worktree. Opaque to the engine.
#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct Permissions {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// A pre-commit gate. Carried through the loader for validation; gates are
/// executed by a separate pre-commit program, never by this engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Gate {
    pub name: String,
    pub run: String,
}

/// The full `line.yaml` configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: Agent,

    pub settings: Settings,

    /// Global preamble overriding the built-in default.
    #[serde(default)]
    pub preamble: Option<String>,

    #[serde(default)]
    pub permissions: Option<Permissions>,

    #[serde(default)]
    pub gates: Vec<Gate>,

    #[serde(default)]
    pub stations: Vec<Station>,
}

/// A station with its command and args resolved against the agent defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStation {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub prompt: String,
}

impl Config {
    /// Resolve a station's command and args, falling back to the top-level
    /// agent defaults.
    pub fn resolve_station(&self, station: &Station) -> ResolvedStation {
        let command = station
            .command
            .clone()
            .or_else(|| self.agent.command.clone())
            .unwrap_or_default();
        let args = station
            .args
            .clone()
            .or_else(|| self.agent.args.clone())
            .unwrap_or_default();
        ResolvedStation {
            name: station.name.clone(),
            command,
            args,
            prompt: station.prompt.clone(),
        }
    }

    /// The output branch for a station name.
    pub fn station_branch(&self, name: &str) -> String {
        format!("{}{}", self.settings.branch_prefix, name)
    }
}

/// Load and parse `line.yaml`, requiring `settings.watches`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: Config = serde_yaml::from_str(&data)?;
    if config.settings.watches.is_empty() {
        return Err(ConfigError::MissingWatches);
    }
    Ok(config)
}

/// Check a loaded config for semantic errors beyond what [`load`] catches.
/// Returns one human-readable message per issue.
pub fn validate(config: &Config) -> Vec<String> {
    let mut errors = Vec::new();

    let mut seen = std::collections::HashSet::new();
    for (i, station) in config.stations.iter().enumerate() {
        if station.name.is_empty() {
            errors.push(format!("stations[{i}].name: required field is empty"));
        } else if !seen.insert(station.name.as_str()) {
            errors.push(format!(
                "stations[{i}].name: duplicate station name {:?}",
                station.name
            ));
        }

        if station.prompt.is_empty() {
            errors.push(format!("stations[{i}].prompt: required field is empty"));
        }

        if station.command.is_none() && config.agent.command.is_none() {
            errors.push(format!(
                "stations[{i}]: no resolvable command (set station command or agent.command)"
            ));
        }
    }

    for (i, gate) in config.gates.iter().enumerate() {
        if gate.name.is_empty() {
            errors.push(format!("gates[{i}].name: required field is empty"));
        }
        if gate.run.is_empty() {
            errors.push(format!("gates[{i}].run: required field is empty"));
        }
    }

    errors
}
