// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Infrastructure layer: shell executor, configuration, device inspection,
//! layer assembly, enumeration, mounts, archiving, chunking, and shipping.

pub mod archive;
pub mod chunker;
pub mod config;
pub mod enumerate;
pub mod exec;
pub mod inspect;
pub mod layers;
pub mod mount;
pub mod shipper;
