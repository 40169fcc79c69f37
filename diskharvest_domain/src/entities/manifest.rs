// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Archive Manifest
//!
//! The manifest is the authoritative per-volume metadata record, written as
//! `.manifest.json` into the spool subdirectory after every chunk has been
//! committed, and shipped last so a remote reader can treat its presence as
//! a completeness marker.
//!
//! ## Invariants
//!
//! - Every emitted chunk has a corresponding digest entry.
//! - Chunk ordinals are 1-based and contiguous; the list is in ordinal order.
//! - `whole_stream_digest` is the digest of the chunk bytes concatenated in
//!   ordinal order, which equals the digest of the compressed stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One committed chunk of the compressed stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Chunk file name, e.g. `base.tar.zst.part0001`
    pub file_name: String,
    /// Byte length of the chunk file
    pub length: u64,
    /// Hex digest of the chunk bytes
    pub digest: String,
}

/// Per-volume archive manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub archive_base: String,
    pub source_device: String,
    pub fstype: String,
    /// Size of the source volume in bytes
    pub volume_size: u64,
    /// Compressor actually used (`zstd` or `pigz`, after fallback)
    pub compressor: String,
    pub level: u32,
    /// Configured chunk size in MiB; 0 means a single part
    pub chunk_size_mib: u64,
    pub hash_algorithm: String,
    /// Ordered list of committed chunks
    pub chunks: Vec<ChunkRecord>,
    /// Digest of the whole compressed stream
    pub whole_stream_digest: String,
    pub created_at: DateTime<Utc>,
    pub tool_version: String,
}

impl Manifest {
    /// File name of the manifest inside the spool subdirectory.
    pub const FILE_NAME: &'static str = ".manifest.json";
    /// File name of the ordered part list.
    pub const PARTS_FILE_NAME: &'static str = ".parts";
    /// File name of the whole-stream digest sidecar.
    pub const WHOLE_DIGEST_FILE_NAME: &'static str = ".whole.sha256";

    /// Render the part file name for a 1-based ordinal.
    ///
    /// Ordinals are zero-padded to at least four digits; the width grows
    /// naturally for ordinals beyond 9999.
    pub fn part_file_name(archive_base: &str, extension: &str, ordinal: u64) -> String {
        format!(
            "{}.tar.{}.part{:04}",
            archive_base, extension, ordinal
        )
    }

    /// Total compressed length across all chunks.
    pub fn compressed_len(&self) -> u64 {
        self.chunks.iter().map(|c| c.length).sum()
    }

    /// Verify the ordinal invariant: file names carry 1..=N contiguously.
    pub fn is_contiguous(&self) -> bool {
        self.chunks.iter().enumerate().all(|(idx, chunk)| {
            parse_ordinal(&chunk.file_name).is_some_and(|ord| ord == (idx as u64) + 1)
        })
    }

    /// The `.parts` file body: one part file name per line, ordinal order.
    pub fn parts_file_body(&self) -> String {
        let mut body = String::new();
        for chunk in &self.chunks {
            body.push_str(&chunk.file_name);
            body.push('\n');
        }
        body
    }
}

/// Extract the ordinal from a part file name (`...partNNNN` suffix).
pub fn parse_ordinal(file_name: &str) -> Option<u64> {
    let idx = file_name.rfind(".part")?;
    file_name[idx + 5..].parse().ok()
}
