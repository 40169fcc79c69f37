// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain entities: the device topology, enumerated volumes, the per-volume
//! archive manifest, and the per-run summary record.

pub mod device;
pub mod manifest;
pub mod run_record;
pub mod volume;

pub use device::{Device, DeviceKind, EncryptionSignature, Topology};
pub use manifest::{ChunkRecord, Manifest};
pub use run_record::{RecordStatus, RunRecord, RunTotals, VolumeRecord};
pub use volume::{SkipReason, Volume, VolumeStatus};
