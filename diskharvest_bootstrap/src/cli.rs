// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling: parse with clap, then validate into a
//! [`ValidatedCli`] the application layer can trust. Any parse or
//! validation failure is an invalid invocation and maps to exit code 3 -
//! clap's own exit path is intercepted so usage errors keep that code
//! while `--help`/`--version` still exit 0.
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. Cli::try_parse()                │  Parse argv with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validate()                      │  Range/shape checks
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                    │  Safe, validated invocation
//! └─────────────────────────────────────┘
//! ```

use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

/// CLI parse/validation failure. Maps to exit code 3.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}")]
    Usage(String),
    #[error("invalid value for --{arg}: {reason}")]
    InvalidValue { arg: String, reason: String },
}

/// Raw clap surface of the single executable.
#[derive(Debug, Parser)]
#[command(
    name = "diskharvest",
    version,
    about = "Forensic volume capture from a live rescue environment",
    long_about = "Discovers block devices, activates composite storage read-only, mounts \
                  candidate filesystems defensively, and streams each one as a chunked, \
                  hashed, compressed archive to a remote target. Never writes to source \
                  media; never touches encrypted volumes."
)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enumerate volumes and print the plan with skip reasons; no mounts,
    /// no archives
    #[arg(long)]
    pub list: bool,

    /// Plan the run and print every command without executing mutating ones
    #[arg(long)]
    pub dry_run: bool,

    /// Override the configured worker count
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Restrict the run to these devices (comma-separated)
    #[arg(long, value_name = "DEV[,DEV...]", value_delimiter = ',')]
    pub only: Vec<String>,

    /// Skip these devices (comma-separated)
    #[arg(long = "exclude-dev", value_name = "DEV[,DEV...]", value_delimiter = ',')]
    pub exclude_dev: Vec<String>,

    /// Verbose (debug-level) logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit human-readable logs instead of JSON lines
    #[arg(long)]
    pub plain_logs: bool,
}

/// Validated CLI invocation handed to the application layer.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub config: Option<PathBuf>,
    pub list: bool,
    pub dry_run: bool,
    pub workers: Option<usize>,
    pub only: Vec<String>,
    pub exclude_dev: Vec<String>,
    pub verbose: bool,
    pub plain_logs: bool,
}

/// Parse and validate the process argv.
///
/// `--help` and `--version` print and exit 0 here; every other clap error
/// becomes [`ParseError::Usage`].
pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) =>
        {
            let _ = err.print();
            std::process::exit(0);
        }
        Err(err) => return Err(ParseError::Usage(err.to_string())),
    };
    validate(cli)
}

/// Apply range and shape checks to a parsed invocation.
pub fn validate(cli: Cli) -> Result<ValidatedCli, ParseError> {
    if let Some(workers) = cli.workers {
        if workers == 0 || workers > 128 {
            return Err(ParseError::InvalidValue {
                arg: "workers".to_string(),
                reason: "must be between 1 and 128".to_string(),
            });
        }
    }

    let only = normalize_devices("only", &cli.only)?;
    let exclude_dev = normalize_devices("exclude-dev", &cli.exclude_dev)?;

    Ok(ValidatedCli {
        config: cli.config,
        list: cli.list,
        dry_run: cli.dry_run,
        workers: cli.workers,
        only,
        exclude_dev,
        verbose: cli.verbose,
        plain_logs: cli.plain_logs,
    })
}

/// Normalize device arguments: bare names become `/dev/<name>`, and the
/// values must look like device paths (no whitespace, no traversal).
fn normalize_devices(arg: &str, devices: &[String]) -> Result<Vec<String>, ParseError> {
    devices
        .iter()
        .map(|raw| {
            let raw = raw.trim();
            if raw.is_empty()
                || raw.contains(char::is_whitespace)
                || raw.contains("..")
            {
                return Err(ParseError::InvalidValue {
                    arg: arg.to_string(),
                    reason: format!("'{}' is not a device path", raw),
                });
            }
            if raw.starts_with("/dev/") {
                Ok(raw.to_string())
            } else if raw.starts_with('/') {
                Err(ParseError::InvalidValue {
                    arg: arg.to_string(),
                    reason: format!("'{}' is outside /dev", raw),
                })
            } else {
                Ok(format!("/dev/{}", raw))
            }
        })
        .collect()
}
