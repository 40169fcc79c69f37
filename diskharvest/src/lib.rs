// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Diskharvest
//!
//! Forensic volume capture from a live rescue environment. The pipeline
//! discovers block devices, activates composite storage layers read-only,
//! mounts candidate filesystems with defensive options, streams each one
//! through an external compressor into fixed-size, integrity-hashed
//! chunks, and ships the chunks to a remote archival prefix with
//! resumable semantics.
//!
//! ## Safety Contract
//!
//! The contract is one-way and absolute: no write ever reaches source
//! media, and no cryptographic material is ever touched. Journaling
//! filesystems mount with replay disabled, LVM volumes are pinned
//! read-only at the block layer, ZFS pools import with `readonly=on`, and
//! encrypted volumes are detected and skipped, never unlocked.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Bootstrap (diskharvest-bootstrap)             │
//! │  CLI · exit codes · logging · signals · platform facts      │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │
//! ┌─────────────────────────────┴───────────────────────────────┐
//! │                     Application Layer                       │
//! │  Orchestrator (worker pool, containment) · plan rendering   │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │
//! ┌─────────────────────────────┴───────────────────────────────┐
//! │                Domain Layer (diskharvest-domain)            │
//! │  Topology · Volume · Manifest · RunRecord · ports · errors  │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │
//! ┌─────────────────────────────┴───────────────────────────────┐
//! │                    Infrastructure Layer                     │
//! │  exec · config · inspect · layers · enumerate · mount       │
//! │  archive · chunker · shipper                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Per-volume pipeline
//!
//! ```text
//! mount (ro, defensive flags)
//!   └─► tar producer ──► zstd|pigz child ──► hash tap ──► chunk files
//!                                                           └─► resumable ship
//! ```
//!
//! Chunks commit individually (fsync + sidecar digest) so an interrupted
//! run resumes where it stopped; the manifest ships last as the
//! completeness marker.

pub mod application;
pub mod infrastructure;

// Tests are organized as:
// - Unit tests: #[cfg(test)] modules within each source file
// - Integration tests: separate files in tests/ directory

// Re-export domain types for convenient access
pub use diskharvest_domain::{
    ChunkRecord, ChunkSize, Device, DeviceKind, HarvestError, HashAlgorithm, HostToken, Manifest,
    RunRecord, SkipReason, Topology, Volume, VolumeRecord, VolumeStatus, WorkerCount,
};
