//! Command-line arguments for the `parley` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PARLEY_CONFIG";

/// Parley: ask questions by text or voice, get answers grounded in live web
/// search.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Never speak answers aloud.
    #[arg(long = "no-voice")]
    pub no_voice: bool,

    /// Stream answers as they are generated.
    #[arg(long = "stream")]
    pub stream: bool,

    /// Answer one query, print it, and exit.
    #[arg(short = 'q', long = "query")]
    pub query: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PARLEY_CONFIG env var > ~/.parley/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        pick_config_path(
            self.config.as_deref(),
            std::env::var(CONFIG_ENV).ok(),
            std::env::var("HOME").ok(),
        )
    }

    /// Resolve the base log filter.
    ///
    /// Priority: --log-level flag > config file value > "info". `RUST_LOG`
    /// still wins over all of these when the subscriber is built.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if !config_level.trim().is_empty() {
            return config_level.trim().to_string();
        }
        "info".to_string()
    }
}

fn pick_config_path(flag: Option<&Path>, env: Option<String>, home: Option<String>) -> PathBuf {
    if let Some(p) = flag {
        return p.to_path_buf();
    }
    if let Some(p) = env.filter(|p| !p.is_empty()) {
        return PathBuf::from(p);
    }
    if let Some(home) = home {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::try_parse_from([
            "parley",
            "-c",
            "/etc/parley.toml",
            "--no-voice",
            "--stream",
            "-q",
            "capital of France",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/parley.toml")));
        assert!(args.no_voice);
        assert!(args.stream);
        assert_eq!(args.query.as_deref(), Some("capital of France"));
    }

    #[test]
    fn test_config_path_precedence() {
        let flag = Path::new("/flag.toml");
        assert_eq!(
            pick_config_path(Some(flag), Some("/env.toml".into()), Some("/home/u".into())),
            PathBuf::from("/flag.toml")
        );
        assert_eq!(
            pick_config_path(None, Some("/env.toml".into()), Some("/home/u".into())),
            PathBuf::from("/env.toml")
        );
        assert_eq!(
            pick_config_path(None, Some(String::new()), Some("/home/u".into())),
            PathBuf::from("/home/u/.parley/config.toml")
        );
        assert_eq!(pick_config_path(None, None, None), PathBuf::from("config.toml"));
    }

    #[test]
    fn test_log_level_precedence() {
        let mut args = CliArgs::try_parse_from(["parley"]).unwrap();
        assert_eq!(args.resolve_log_level(""), "info");
        assert_eq!(args.resolve_log_level("debug"), "debug");

        args.log_level = Some("trace".to_string());
        assert_eq!(args.resolve_log_level("debug"), "trace");
    }
}
