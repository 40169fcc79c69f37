// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Integrity Digest Service
//!
//! Incremental hashing over the compressed byte stream. The chunker runs
//! two taps at once: a whole-stream digest that is never reset, and a
//! per-chunk digest reset at each chunk boundary. Both are fed from the
//! same buffer in streaming order, so the whole-stream digest always equals
//! the digest of the chunks concatenated in ordinal order.
//!
//! The service is algorithm-agnostic so long as a constructor exists;
//! `sha256` is the only required algorithm.
//!
//! ## Usage
//!
//! ```rust
//! use diskharvest_domain::services::digest::HashAlgorithm;
//!
//! let mut digest = HashAlgorithm::Sha256.new_digest();
//! digest.update(b"hello ");
//! digest.update(b"world");
//! assert_eq!(
//!     digest.finalize_hex(),
//!     "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
//! );
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::HarvestError;

/// Supported integrity hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
}

impl HashAlgorithm {
    /// Parse the `integrity.algorithm` config value.
    pub fn parse(name: &str) -> Result<Self, HarvestError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            other => Err(HarvestError::Config(format!(
                "unsupported integrity algorithm '{}'",
                other
            ))),
        }
    }

    /// Start a fresh incremental digest.
    pub fn new_digest(&self) -> StreamDigest {
        match self {
            HashAlgorithm::Sha256 => StreamDigest {
                inner: Sha256::new(),
            },
        }
    }

    /// Digest a full byte slice in one call.
    pub fn digest_hex(&self, data: &[u8]) -> String {
        let mut digest = self.new_digest();
        digest.update(data);
        digest.finalize_hex()
    }

    /// Sidecar file extension for this algorithm (`sha256`).
    pub fn sidecar_extension(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// Incremental digest state.
pub struct StreamDigest {
    inner: Sha256,
}

impl StreamDigest {
    /// Feed more stream bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Consume the state and return the lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.inner.finalize())
    }
}
