// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Structured Logging Initialization
//!
//! One tracing subscriber for the whole process, installed once at startup.
//! The default format is JSON lines on stderr so a rescue-session harness
//! can collect machine-readable events; `--plain-logs` switches to the
//! compact human format for interactive use.
//!
//! The subscriber is the only shared mutable sink in the process; the
//! tracing machinery serializes writes internally, so workers and the
//! signal task log concurrently without coordination.
//!
//! `RUST_LOG` overrides the level when set; otherwise `--verbose` selects
//! debug and the default is info.

use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines, one event per line (default)
    Json,
    /// Compact human-readable output
    Plain,
}

/// Install the global tracing subscriber.
///
/// Safe to call once per process; later calls are ignored (the first
/// subscriber wins), which keeps tests that initialize logging from
/// tripping over each other.
pub fn init(format: LogFormat, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let result = match format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Plain => builder.compact().try_init(),
    };

    if result.is_err() {
        tracing::debug!("logging already initialized, keeping existing subscriber");
    }
}
