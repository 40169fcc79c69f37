// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Platform Facts
//!
//! OS-level facts the capture pipeline needs at startup: CPU count,
//! hostname, the machine-id and stable MAC used for host-token derivation,
//! elevation, and the bundle PATH overlay.
//!
//! The tool ships on Linux rescue media only, so this module reads the
//! usual `/etc`, `/proc`, and `/sys` surfaces directly instead of hiding
//! them behind a cross-platform trait.
//!
//! ## Bundle PATH overlay
//!
//! The bundled variant of the tool carries statically-linked helper
//! binaries (mdadm, ntfs-3g, zstd, ...) in a `bin/` directory next to the
//! executable. [`apply_bundle_path_overlay`] prepends that directory to
//! `PATH` exactly once, so bundled helpers take precedence over host
//! copies for every subsequent spawn.

use std::path::PathBuf;
use std::sync::Once;

static PATH_OVERLAY: Once = Once::new();

/// Number of logical CPUs available to the process (at least 1).
pub fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Hostname of the rescue environment.
pub fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Content of `/etc/machine-id`, when present and non-empty.
pub fn machine_id() -> Option<String> {
    let id = std::fs::read_to_string("/etc/machine-id").ok()?;
    let id = id.trim().to_string();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// MAC address of the first stable (non-loopback, non-virtual) interface.
pub fn first_stable_mac() -> Option<String> {
    let entries = std::fs::read_dir("/sys/class/net").ok()?;
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| {
            name != "lo" && !name.starts_with("veth") && !name.starts_with("docker")
        })
        .collect();
    names.sort();

    for name in names {
        let path = format!("/sys/class/net/{}/address", name);
        if let Ok(mac) = std::fs::read_to_string(&path) {
            let mac = mac.trim().to_string();
            if !mac.is_empty() && mac != "00:00:00:00:00:00" {
                return Some(mac);
            }
        }
    }
    None
}

/// True when running with effective UID 0.
pub fn is_elevated() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no failure modes or side effects.
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Directory of the running executable, when resolvable.
pub fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
}

/// Prepend the bundle `bin/` directory (next to the executable) to PATH.
///
/// Applied at most once per process, before any helper is spawned.
/// Returns the overlay directory when one was applied.
pub fn apply_bundle_path_overlay() -> Option<PathBuf> {
    let bundle_bin = exe_dir()?.join("bin");
    if !bundle_bin.is_dir() {
        return None;
    }

    let mut applied = None;
    PATH_OVERLAY.call_once(|| {
        let current = std::env::var_os("PATH").unwrap_or_default();
        let mut paths = vec![bundle_bin.clone()];
        paths.extend(std::env::split_paths(&current));
        if let Ok(joined) = std::env::join_paths(paths) {
            std::env::set_var("PATH", &joined);
            applied = Some(bundle_bin);
        }
    });
    applied
}
