// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Mounter Port
//!
//! Contract for acquiring and releasing read-only mounts. The production
//! implementation invokes the per-fstype mount recipes through the shell
//! executor; tests substitute a fixture that materializes directory trees.
//!
//! The release guarantee (every acquired mount is released on every exit
//! path) is enforced by the infrastructure `MountGuard`, which wraps any
//! `Mounter` implementation.

use std::path::Path;

use crate::entities::volume::Volume;
use crate::error::HarvestError;

/// Mount acquisition/release primitive.
pub trait Mounter: Send + Sync {
    /// Mount `volume` read-only onto `target`. The target directory exists
    /// and is empty when this is called.
    fn mount(&self, volume: &Volume, target: &Path) -> Result<(), HarvestError>;

    /// Unmount the filesystem at `target`.
    fn unmount(&self, target: &Path) -> Result<(), HarvestError>;
}
