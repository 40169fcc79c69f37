// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Harvest Error Types
//!
//! The single typed error for the whole capture pipeline. Every stage
//! returns `Result<_, HarvestError>`; the orchestrator treats volume-scoped
//! errors as data (they become `failed{kind, detail}` entries in the run
//! record) and never as control flow that aborts the run.
//!
//! ## Error Categories
//!
//! - **Config** - fatal at startup, maps to exit code 2
//! - **ExecSpawn / ExecTimeout / ExecNonZero** - shell executor failures
//! - **Inspection** - advisory; the affected volume is skipped
//! - **LayerActivation** - warning only; layer volumes simply never appear
//! - **HelperMissing / Mount** - volume-scoped mount failures
//! - **Archive / CompressorMissing** - volume-scoped pipeline failures
//! - **Transport / IntegrityMismatch** - volume-scoped shipping failures
//! - **Cancelled** - shutdown requested while a volume was in flight
//!
//! ## Usage
//!
//! ```rust
//! use diskharvest_domain::{FailureKind, HarvestError};
//!
//! let err = HarvestError::HelperMissing {
//!     helper: "ntfs-3g".to_string(),
//! };
//! assert_eq!(err.failure_kind(), FailureKind::Mount);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stage of the archive pipeline where a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStage {
    /// The tar producer walking the mounted tree
    TarProducer,
    /// The external compressor child process
    Compressor,
    /// The splitter writing chunk files to the spool
    Splitter,
    /// Digest bookkeeping (sidecars, whole-stream file)
    Digest,
    /// Writing or fsyncing the manifest
    Manifest,
}

impl std::fmt::Display for ArchiveStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ArchiveStage::TarProducer => "tar_producer",
            ArchiveStage::Compressor => "compressor",
            ArchiveStage::Splitter => "splitter",
            ArchiveStage::Digest => "digest",
            ArchiveStage::Manifest => "manifest",
        };
        write!(f, "{}", label)
    }
}

/// Transport failure classification for the remote shipper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Network,
    Auth,
    RemoteFs,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransportErrorKind::Network => "network",
            TransportErrorKind::Auth => "auth",
            TransportErrorKind::RemoteFs => "remote_fs",
        };
        write!(f, "{}", label)
    }
}

/// Coarse failure classification recorded per volume in the run summary.
///
/// This is the `reason` tag the run record carries for a `failed` volume;
/// the free-form detail string travels alongside it, never inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Mount,
    Archive,
    Transport,
    Integrity,
    Cancelled,
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureKind::Mount => "mount",
            FailureKind::Archive => "archive",
            FailureKind::Transport => "transport",
            FailureKind::Integrity => "integrity",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        };
        write!(f, "{}", label)
    }
}

/// Typed error for every fallible operation in the capture pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HarvestError {
    /// Configuration is missing, malformed, or fails validation. Fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// A child process could not be spawned.
    #[error("command '{command}' failed to spawn: {detail}")]
    ExecSpawn { command: String, detail: String },

    /// A child process exceeded its timeout and was killed.
    #[error("command '{command}' timed out after {timeout_secs}s")]
    ExecTimeout { command: String, timeout_secs: u64 },

    /// A child process exited with a non-zero status.
    #[error("command '{command}' exited with status {status}: {stderr}")]
    ExecNonZero {
        command: String,
        status: i32,
        stderr: String,
    },

    /// A topology or signature query failed. Advisory; the volume is skipped.
    #[error("inspection failed: {0}")]
    Inspection(String),

    /// A composite layer (md, LVM, ZFS) could not be activated. Warning only.
    #[error("layer activation failed for {layer}: {detail}")]
    LayerActivation { layer: String, detail: String },

    /// An external helper binary required by a mount recipe is not in PATH.
    #[error("required helper '{helper}' not found in PATH")]
    HelperMissing { helper: String },

    /// The kernel or helper refused to mount the volume.
    #[error("mount of {device} failed: {detail}")]
    Mount { device: String, detail: String },

    /// A stage of the archive -> compress -> split -> hash pipeline failed.
    #[error("archive stage {stage} failed: {detail}")]
    Archive { stage: ArchiveStage, detail: String },

    /// Neither the configured compressor nor the fallback is installed.
    #[error("no usable compressor found (tried zstd, pigz)")]
    CompressorMissing,

    /// The remote transfer failed after bounded retries.
    #[error("transport failure ({kind}): {detail}")]
    Transport {
        kind: TransportErrorKind,
        detail: String,
    },

    /// A shipped chunk's remote digest disagreed with its manifest entry
    /// even after one re-upload, or a pre-existing remote manifest conflicts.
    #[error("integrity mismatch for chunk {chunk}")]
    IntegrityMismatch { chunk: String },

    /// Shutdown was requested while the operation was in flight.
    #[error("operation cancelled")]
    Cancelled,

    /// Invariant violation inside the orchestrator itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HarvestError {
    /// Map this error onto the failure kind recorded for the owning volume.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            HarvestError::HelperMissing { .. } | HarvestError::Mount { .. } => FailureKind::Mount,
            HarvestError::Archive { .. }
            | HarvestError::CompressorMissing
            | HarvestError::ExecSpawn { .. }
            | HarvestError::ExecTimeout { .. }
            | HarvestError::ExecNonZero { .. } => FailureKind::Archive,
            HarvestError::Transport { .. } => FailureKind::Transport,
            HarvestError::IntegrityMismatch { .. } => FailureKind::Integrity,
            HarvestError::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Internal,
        }
    }

    /// True for errors that abort the whole run rather than one volume.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarvestError::Config(_) | HarvestError::Internal(_))
    }
}
