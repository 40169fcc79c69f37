// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain service ports and the integrity digest service.
//!
//! Ports are synchronous: each worker runs its mount -> archive -> ship
//! pipeline as one blocking flow, and infrastructure adapters implement
//! these traits without exposing futures across module boundaries.

pub mod digest;
pub mod inspector;
pub mod mounter;
pub mod transport;

pub use digest::{HashAlgorithm, StreamDigest};
pub use inspector::DeviceInspector;
pub use mounter::Mounter;
pub use transport::{ChunkTransport, RemoteFile};
