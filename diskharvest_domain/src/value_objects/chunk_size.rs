// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunk Size Value Object
//!
//! Type-safe chunk-size policy for the splitter. The value is carried in
//! MiB, as configured; zero is a legal value that disables chunking (the
//! whole compressed stream lands in a single part).
//!
//! ## Why a newtype
//!
//! The splitter cuts the compressed stream at *exactly*
//! `chunk_size_mb * 2^20` bytes, and the resume logic depends on that byte
//! count never drifting. Funneling every conversion through this type keeps
//! the multiplication in one place and makes a raw `u64` of bytes
//! unconfusable with a count of MiB in function signatures.
//!
//! ## Usage
//!
//! ```rust
//! use diskharvest_domain::ChunkSize;
//!
//! let chunk = ChunkSize::from_mib(4096);
//! assert_eq!(chunk.bytes(), Some(4096 * 1024 * 1024));
//! assert_eq!(chunk.part_count_for(10 * 1024 * 1024 * 1024), 3);
//!
//! let whole = ChunkSize::from_mib(0);
//! assert!(whole.is_unchunked());
//! assert_eq!(whole.part_count_for(u64::MAX), 1);
//! ```

use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Chunking policy in MiB; 0 disables chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkSize {
    mib: u64,
}

impl ChunkSize {
    /// Largest accepted chunk size (1 TiB expressed in MiB).
    pub const MAX_MIB: u64 = 1024 * 1024;

    /// Build from a MiB count, clamping to [`Self::MAX_MIB`].
    pub fn from_mib(mib: u64) -> Self {
        Self {
            mib: mib.min(Self::MAX_MIB),
        }
    }

    pub fn mib(&self) -> u64 {
        self.mib
    }

    /// Chunk boundary in bytes, or `None` when chunking is disabled.
    pub fn bytes(&self) -> Option<u64> {
        if self.mib == 0 {
            None
        } else {
            Some(self.mib * MIB)
        }
    }

    /// True when the whole stream becomes a single part.
    pub fn is_unchunked(&self) -> bool {
        self.mib == 0
    }

    /// Number of parts a stream of `stream_len` bytes will produce.
    ///
    /// An empty stream still produces one (empty) part so the archive is
    /// always represented on disk.
    pub fn part_count_for(&self, stream_len: u64) -> u64 {
        match self.bytes() {
            None => 1,
            Some(chunk) => {
                if stream_len == 0 {
                    1
                } else {
                    stream_len.div_ceil(chunk)
                }
            }
        }
    }
}

impl std::fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unchunked() {
            write!(f, "unchunked")
        } else {
            write!(f, "{} MiB", self.mib)
        }
    }
}
