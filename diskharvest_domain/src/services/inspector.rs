// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Device Inspector Port
//!
//! Read-only topology queries. Inspector operations never mutate the host;
//! on tool failure they surface an advisory [`HarvestError::Inspection`]
//! and the volume concerned is treated as skipped.
//!
//! The production implementation shells out to lsblk/blkid/findmnt; tests
//! drive the orchestrator with a static snapshot.

use std::collections::BTreeSet;

use crate::entities::device::Topology;
use crate::error::HarvestError;

/// Read-only view of the host block-device state.
pub trait DeviceInspector: Send + Sync {
    /// Take a topology snapshot (tree of devices with kinds, sizes,
    /// fstypes, mountpoints, parent links, encryption signatures).
    fn snapshot(&self) -> Result<Topology, HarvestError>;

    /// Devices backing the running root mount plus their whole-disk
    /// ancestors: the boot-exclusion set. Paths, not kernel names.
    fn boot_exclusion(&self, topology: &Topology) -> Result<BTreeSet<String>, HarvestError>;
}
