// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Volume Entity
//!
//! A `Volume` is the enumerator's verdict on one mountable device: either
//! `selected` for capture, or `skipped` with a typed reason. Failures that
//! occur later (mount, archive, ship) are captured per volume in the run
//! record, never thrown across the worker pool.
//!
//! Skip reasons are an enumeration, not free strings, so the run summary is
//! machine-checkable and the filter chain stays deterministic.

use serde::{Deserialize, Serialize};

use crate::error::FailureKind;

/// Why a volume was excluded from capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Device backs the live root mount or is its whole-disk ancestor
    Boot,
    /// Device is on the configured avoid list or a CLI exclusion
    Avoided,
    /// Filesystem type is on the skip list
    FstypeBlocked,
    /// Filesystem type is not on the include list
    FstypeUnsupported,
    /// Encrypted container and `skip_if_encrypted` is set
    Encrypted,
    /// Smaller than `min_partition_size_gb`
    TooSmall,
    /// Comes from an LVM/RAID layer that config disallows
    LayerDisallowed,
    /// A topology or signature query failed for this device
    InspectionFailed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SkipReason::Boot => "boot",
            SkipReason::Avoided => "avoided",
            SkipReason::FstypeBlocked => "fstype_blocked",
            SkipReason::FstypeUnsupported => "fstype_unsupported",
            SkipReason::Encrypted => "encrypted",
            SkipReason::TooSmall => "too_small",
            SkipReason::LayerDisallowed => "layer_disallowed",
            SkipReason::InspectionFailed => "inspection_failed",
        };
        write!(f, "{}", label)
    }
}

/// Lifecycle state of a volume within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VolumeStatus {
    Selected,
    Skipped { reason: SkipReason },
    Failed { kind: FailureKind, detail: String },
}

impl VolumeStatus {
    pub fn is_selected(&self) -> bool {
        matches!(self, VolumeStatus::Selected)
    }
}

/// One enumerated volume: a mountable device plus its derived identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// Source device path (`/dev/sdb1`)
    pub device: String,
    /// Ordinal of the backing whole disk in discovery order (0-based)
    pub disk_index: usize,
    /// Ordinal within the disk (1-based for partitions, 0 for whole devices)
    pub part_index: usize,
    /// Declared filesystem type; empty string when unknown
    pub fstype: String,
    /// Size in bytes
    pub size: u64,
    /// Rendered archive base name, unique within the run
    pub archive_base: String,
    pub status: VolumeStatus,
}

impl Volume {
    /// Logical address used in logs and the plan listing, e.g. `d1p2`.
    pub fn address(&self) -> String {
        format!("d{}p{}", self.disk_index, self.part_index)
    }
}
