// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Host Token Value Object
//!
//! The host token is a stable five-hex-character identifier embedded in
//! archive names and remote paths so re-runs from the same rescue stick
//! land under the same prefix.
//!
//! Derivation chain (strongest source first):
//!
//! 1. `machine-id` content
//! 2. hostname + first stable interface MAC
//! 3. a random token, persisted by the caller next to the spool so later
//!    runs on the same live USB stay stable
//!
//! The derivation itself is pure; reading machine-id/MACs and persisting
//! the random fallback are infrastructure concerns.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable short host identifier (five lowercase hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostToken {
    token: String,
}

impl HostToken {
    pub const LEN: usize = 5;

    /// Derive from the machine-id file content.
    pub fn from_machine_id(machine_id: &str) -> Self {
        Self::digest_of(machine_id.trim().as_bytes())
    }

    /// Derive from hostname plus a stable interface MAC.
    pub fn from_host_identity(hostname: &str, mac: &str) -> Self {
        let material = format!("{}\n{}", hostname.trim(), mac.trim());
        Self::digest_of(material.as_bytes())
    }

    /// Random fallback token; the caller persists it for stability.
    pub fn random() -> Self {
        let n: u32 = rand::random::<u32>() & 0xf_ffff;
        Self {
            token: format!("{:05x}", n),
        }
    }

    /// Parse a previously persisted token.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() == Self::LEN && raw.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self {
                token: raw.to_ascii_lowercase(),
            })
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    fn digest_of(material: &[u8]) -> Self {
        let digest = Sha256::digest(material);
        Self {
            token: hex::encode(digest)[..Self::LEN].to_string(),
        }
    }
}

impl std::fmt::Display for HostToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token)
    }
}
