// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Transport Port
//!
//! Domain-side contract for shipping a volume's chunk directory to a remote
//! prefix. The trait is deliberately file-grained: the shipper owns the
//! resumability policy (skip chunks whose remote digest already matches,
//! re-upload once on mismatch, manifest last) and drives any transport
//! through these five primitives.
//!
//! Implementations live in the infrastructure layer (rsync-over-ssh for
//! production, a local filesystem prefix for tests and locally mounted
//! archival targets).
//!
//! Domain ports are synchronous; workers run their pipeline as one blocking
//! flow and no futures cross module boundaries.

use std::path::Path;

use crate::error::HarvestError;
use crate::services::digest::HashAlgorithm;

/// A file observed under the remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub file_name: String,
    pub length: u64,
}

/// Transport primitive for one remote prefix.
pub trait ChunkTransport: Send + Sync {
    /// Human-readable target description for logs (never credentials).
    fn describe(&self) -> String;

    /// Create the remote directory (and parents) if missing.
    fn ensure_dir(&self, remote_dir: &str) -> Result<(), HarvestError>;

    /// List files currently present under the remote directory.
    fn list(&self, remote_dir: &str) -> Result<Vec<RemoteFile>, HarvestError>;

    /// Upload one local file into the remote directory under `file_name`.
    /// Returns the bytes actually transferred (zero when the transport
    /// detected the remote copy was already current).
    fn send_file(
        &self,
        local: &Path,
        remote_dir: &str,
        file_name: &str,
    ) -> Result<u64, HarvestError>;

    /// Hex digest of a remote file, computed remotely.
    fn digest(
        &self,
        remote_dir: &str,
        file_name: &str,
        algorithm: HashAlgorithm,
    ) -> Result<String, HarvestError>;

    /// Fetch the remote manifest body if one exists.
    fn read_manifest(&self, remote_dir: &str) -> Result<Option<String>, HarvestError>;
}
