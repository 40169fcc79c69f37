// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Bootstrap Module
//!
//! The bootstrap module sits **outside** the enterprise application layers
//! (domain, application, infrastructure) and owns the process edge:
//!
//! - **Entry point support** - CLI parsing and validation
//! - **Exit codes** - the 0/1/2/3 contract of the executable
//! - **Logging** - the one global tracing subscriber (JSON by default)
//! - **Platform facts** - CPU count, hostname, machine-id, PATH overlay
//! - **Signal handling** - SIGINT/SIGTERM to graceful drain
//! - **Shutdown coordination** - cancellation token + bounded grace period
//!
//! ## Architecture Position
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │          BOOTSTRAP (This Module)            │
//! │  - CLI Parsing & Validation                 │
//! │  - Logging / Signals / Shutdown             │
//! │  - Platform Facts & PATH Overlay            │
//! └─────────────────────┬───────────────────────┘
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │   APPLICATION + INFRASTRUCTURE (diskharvest)│
//! └─────────────────────┬───────────────────────┘
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │        DOMAIN (diskharvest-domain)          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Bootstrap can see every layer. The only things that flow downward are
//! capabilities it hands out at wiring time: the cancellation token the
//! worker pipeline polls, and the installed tracing subscriber.

pub mod cli;
pub mod exit_code;
pub mod logger;
pub mod platform;
pub mod shutdown;
pub mod signals;

pub use cli::{parse_and_validate, ParseError, ValidatedCli};
pub use exit_code::ExitCode;
pub use shutdown::{CancellationToken, ShutdownCoordinator};

/// Bootstrap the CLI: parse argv and validate it.
///
/// The caller maps `Err` to exit code 3 and runs the application on `Ok`.
pub fn bootstrap_cli() -> Result<ValidatedCli, ParseError> {
    cli::parse_and_validate()
}
