//! Argument and environment helpers shared by the binaries.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::EngineConfig;

pub const DEFAULT_LOG_FILTER: &str = "season_metrics=info,warn";

pub fn load_env() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

/// Logs go to stderr so stdout stays machine-readable.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Every value given for `name`, as `--name value` or `--name=value`.
pub fn arg_values(args: &[String], name: &str) -> Vec<String> {
    let prefix = format!("{name}=");
    let mut out = Vec::new();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix(&prefix)
            && !v.trim().is_empty()
        {
            out.push(v.trim().to_string());
            continue;
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            out.push(next.trim().to_string());
        }
    }
    out
}

/// Last value given for `name`.
pub fn arg_value(args: &[String], name: &str) -> Option<String> {
    arg_values(args, name).pop()
}

pub fn arg_path(args: &[String], name: &str) -> Option<PathBuf> {
    arg_value(args, name).map(PathBuf::from)
}

pub fn parse_u32_arg(args: &[String], name: &str) -> Option<u32> {
    arg_value(args, name).and_then(|v| v.parse::<u32>().ok())
}

pub fn parse_usize_arg(args: &[String], name: &str) -> Option<usize> {
    arg_value(args, name).and_then(|v| v.parse::<usize>().ok())
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

/// Defaults, then the optional JSON file, then `SEASON_METRICS_*` variables.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let base = match path {
        Some(p) => EngineConfig::load(p)?,
        None => EngineConfig::default(),
    };
    Ok(base.with_env_overrides())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn both_spellings_and_repeats_are_collected() {
        let a = args(&["--window", "season", "--window=last:5", "--asc", "--limit", "3"]);
        assert_eq!(arg_values(&a, "--window"), vec!["season", "last:5"]);
        assert_eq!(parse_usize_arg(&a, "--limit"), Some(3));
        assert!(has_flag(&a, "--asc"));
        assert_eq!(arg_value(&a, "--team"), None);
    }

    #[test]
    fn flag_followed_by_flag_has_no_value() {
        let a = args(&["--team", "--asc"]);
        assert!(arg_values(&a, "--team").is_empty());
    }
}
