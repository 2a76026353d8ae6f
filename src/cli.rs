// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `logictree`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "logictree",
    version,
    about = "Evaluate a tree of checks as a tri-state logical expression.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "LogicTree.toml")]
    pub config: PathBuf,

    /// Build the tree from this job instead of `[config].root_job`.
    #[arg(long, value_name = "NAME")]
    pub job: Option<String>,

    /// Run the root once and exit when it finished.
    #[arg(long)]
    pub once: bool,

    /// Parse, validate and build the tree, print it, but run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `LOGICTREE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Write a JSON snapshot of the tree here on exit (overrides
    /// `[config].snapshot_path`).
    #[arg(long, value_name = "PATH")]
    pub snapshot_out: Option<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = CliArgs::parse_from([
            "logictree",
            "--config",
            "jobs/prod.toml",
            "--job",
            "Db",
            "--once",
            "--log-level",
            "debug",
            "--snapshot-out",
            "out.json",
        ]);
        assert_eq!(args.config, PathBuf::from("jobs/prod.toml"));
        assert_eq!(args.job.as_deref(), Some("Db"));
        assert!(args.once);
        assert!(!args.dry_run);
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert_eq!(args.snapshot_out, Some(PathBuf::from("out.json")));

        let defaults = CliArgs::parse_from(["logictree"]);
        assert_eq!(defaults.config, PathBuf::from("LogicTree.toml"));
        assert_eq!(defaults.log_level, None);
    }
}
