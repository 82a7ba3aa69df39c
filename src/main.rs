//! Assembly Line CLI - `line`.
//!
//! `line run` is the post-commit hook entry point: it loads `line.yaml`,
//! resolves the repository root, and drives the station pipeline once.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use assembly_line::{config, pipeline};

#[derive(Parser)]
#[command(name = "line", about = "Git-native agent pipeline runner", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the station pipeline for the current commit.
    Run {
        /// Process pending commits once and exit (the default for
        /// post-commit hooks).
        #[arg(long)]
        once: bool,

        /// Path to the configuration file.
        #[arg(long, value_name = "CONFIG", default_value = "line.yaml")]
        path: PathBuf,
    },

    /// Validate the configuration file and exit.
    Validate {
        /// Path to the configuration file.
        #[arg(long, value_name = "CONFIG", default_value = "line.yaml")]
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "assembly_line=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        // Without a daemon there is nothing to keep running: every
        // invocation processes pending commits once, `--once` or not.
        Command::Run { once: _, path } => run(&path),
        Command::Validate { path } => validate(&path),
    }
}

fn run(config_path: &Path) -> ExitCode {
    let Some((config, repo)) = load_config_and_repo(config_path) else {
        return ExitCode::FAILURE;
    };

    match pipeline::run(&repo, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn validate(config_path: &Path) -> ExitCode {
    let config = match config::load(config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let errors = config::validate(&config);
    if errors.is_empty() {
        eprintln!("{} is valid", config_path.display());
        return ExitCode::SUCCESS;
    }
    for error in &errors {
        eprintln!("Error: {error}");
    }
    ExitCode::FAILURE
}

fn load_config_and_repo(config_path: &Path) -> Option<(config::Config, PathBuf)> {
    let config = match config::load(config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return None;
        }
    };

    let errors = config::validate(&config);
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("Error: {error}");
        }
        return None;
    }

    let Some(repo) = find_git_root(config_path) else {
        eprintln!(
            "Error: no git repository found above {}",
            config_path.display()
        );
        return None;
    };

    Some((config, repo))
}

/// Walk up from the config file's directory looking for `.git`.
fn find_git_root(config_path: &Path) -> Option<PathBuf> {
    let absolute = config_path.canonicalize().ok()?;
    let mut dir = absolute.parent()?;
    loop {
        if dir.join(".git").exists() {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}
