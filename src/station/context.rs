//! Prompt assembly for station agents.
//!
//! The composed prompt is: effective preamble, a `# Station: <name>` header,
//! then the station's configured prompt. The preamble resolution order is
//! per-station, then global, then the built-in default.

use crate::config::{Config, Station};

/// The built-in preamble. The no-commit instruction is a contract the engine
/// relies on: the engine commits whatever files the agent writes, so an agent
/// that commits on its own would race the engine's own commit.
pub const DEFAULT_PREAMBLE: &str = "You are running non-interactively as part of an automated \
pipeline. Do not ask questions or wait for user input. IMPORTANT: Do NOT commit any changes. \
Do NOT run git commit. Make file changes only; the system will handle committing.";

/// The preamble in effect for a station.
pub fn effective_preamble<'a>(config: &'a Config, station: &'a Station) -> &'a str {
    station
        .preamble
        .as_deref()
        .or(config.preamble.as_deref())
        .unwrap_or(DEFAULT_PREAMBLE)
}

/// Compose the full prompt delivered to the agent.
pub fn assemble_prompt(config: &Config, station: &Station) -> String {
    format!(
        "{}\n\n# Station: {}\n\n{}",
        effective_preamble(config, station),
        station.name,
        station.prompt
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_preambles(global: Option<&str>, station: Option<&str>) -> (Config, Station) {
        let station = Station {
            name: "security".to_string(),
            prompt: "Review for security issues".to_string(),
            command: None,
            args: None,
            preamble: station.map(String::from),
        };
        let config: Config = serde_yaml::from_str("settings:\n  watches: main\n").unwrap();
        let config = Config {
            preamble: global.map(String::from),
            ..config
        };
        (config, station)
    }

    #[test]
    fn default_preamble_applies_when_nothing_is_configured() {
        let (config, station) = config_with_preambles(None, None);
        let prompt = assemble_prompt(&config, &station);

        assert!(prompt.contains("non-interactively"));
        assert!(prompt.contains("# Station: security"));
        assert!(prompt.ends_with("Review for security issues"));
    }

    #[test]
    fn global_preamble_overrides_the_default() {
        let (config, station) = config_with_preambles(Some("Global override."), None);
        let prompt = assemble_prompt(&config, &station);

        assert!(prompt.starts_with("Global override."));
        assert!(!prompt.contains("non-interactively"));
    }

    #[test]
    fn station_preamble_overrides_the_global_one() {
        let (config, station) =
            config_with_preambles(Some("Global override."), Some("Station override."));
        let prompt = assemble_prompt(&config, &station);

        assert!(prompt.starts_with("Station override."));
        assert!(!prompt.contains("Global override."));
    }

    #[test]
    fn header_sits_between_preamble_and_prompt() {
        let (config, station) = config_with_preambles(Some("P."), None);
        assert_eq!(
            assemble_prompt(&config, &station),
            "P.\n\n# Station: security\n\nReview for security issues"
        );
    }
}
