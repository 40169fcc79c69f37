// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Diskharvest Domain Layer
//!
//! Pure business logic for the diskharvest forensic capture pipeline:
//! entities, value objects, service ports, and the typed error. Nothing in
//! this crate performs I/O, spawns processes, or touches the async runtime;
//! those belong to the infrastructure and bootstrap layers.
//!
//! ## Core Concepts
//!
//! ### Topology and Volumes
//! The inspector produces a [`Topology`] snapshot of the host block
//! devices. The enumerator turns that snapshot into [`Volume`]s, each
//! `selected` for capture or `skipped` with a typed reason. Failures later
//! in a volume's life are captured into its run-record entry, never thrown
//! across the worker pool.
//!
//! ### Chunked Archives
//! A captured volume becomes an ordered sequence of fixed-size chunks of
//! its compressed tar stream, with a per-chunk digest, a whole-stream
//! digest, and a [`Manifest`] tying them together. The invariant the whole
//! system leans on: the concatenation of chunks, in ordinal order, is
//! byte-identical to the compressed stream.
//!
//! ### Safety Contract
//! No write ever reaches source media and no cryptographic material is
//! ever touched. Encrypted volumes are detected and skipped, never
//! unlocked; the boot device chain is excluded from capture entirely.
//!
//! ## Layer Rules
//!
//! ```text
//! bootstrap ──► application ──► domain ◄── infrastructure
//! ```
//!
//! The domain depends on nothing above it. Service ports
//! ([`DeviceInspector`], [`Mounter`], [`ChunkTransport`]) are implemented
//! by infrastructure adapters and injected by the application layer.

pub mod entities;
pub mod error;
pub mod services;
pub mod value_objects;

// Re-export the types that cross layer boundaries constantly.
pub use entities::{
    ChunkRecord, Device, DeviceKind, EncryptionSignature, Manifest, RecordStatus, RunRecord,
    RunTotals, SkipReason, Topology, Volume, VolumeRecord, VolumeStatus,
};
pub use error::{ArchiveStage, FailureKind, HarvestError, TransportErrorKind};
pub use services::{ChunkTransport, DeviceInspector, HashAlgorithm, Mounter, RemoteFile, StreamDigest};
pub use value_objects::{uniquify, ChunkSize, HostToken, NamePattern, WorkerCount};
