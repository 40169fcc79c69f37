// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Volume Enumerator
//!
//! Turns a topology snapshot into the ordered list of candidate volumes,
//! each `selected` or `skipped{reason}`. Enumeration is a pure function of
//! `(topology, config, boot set, overrides)`: no I/O, no clock, no
//! randomness, so two runs over identical inputs produce identical lists
//! in identical order.
//!
//! ## Filter chain (applied in this order, first match wins)
//!
//! 1. boot-exclusion set membership (device or ancestor) → `boot`;
//!    avoid list / `--exclude-dev` / outside `--only` → `avoided`
//! 2. signature probe failed → `inspection_failed`
//! 3. fstype on the skip list → `fstype_blocked`
//! 4. fstype not on the include list (encrypted containers exempt, they
//!    fall through to the encryption rule) → `fstype_unsupported`
//! 5. encrypted and `skip_if_encrypted` → `encrypted`
//! 6. smaller than `min_partition_size_gb` → `too_small`
//! 7. LVM/RAID origin with the layer disallowed → `layer_disallowed`
//!
//! Survivors are `selected`. Processing order is largest-first with a
//! stable tie-break on device path; the listing keeps discovery order.

use std::collections::BTreeSet;

use diskharvest_domain::{
    uniquify, Device, DeviceKind, NamePattern, SkipReason, Topology, Volume, VolumeStatus,
};

use crate::infrastructure::config::DiscoveryConfig;

/// CLI device restrictions.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub only: Vec<String>,
    pub exclude: Vec<String>,
}

/// Pre-rendered naming inputs for this run.
#[derive(Debug, Clone)]
pub struct NamingContext {
    /// Run date, already rendered with `naming.date_fmt`
    pub date: String,
    /// Stable host token
    pub token: String,
    pub pattern: NamePattern,
}

/// Enumerate candidate volumes from a snapshot.
pub fn enumerate(
    topology: &Topology,
    discovery: &DiscoveryConfig,
    boot_set: &BTreeSet<String>,
    overrides: &Overrides,
    naming: &NamingContext,
) -> Vec<Volume> {
    let disks: Vec<String> = topology.disks().iter().map(|d| d.path.clone()).collect();
    let boot_has_zfs_member = boot_disk_carries_zfs(topology, boot_set);

    let mut volumes = Vec::new();
    for device in topology.leaves() {
        if !is_candidate_kind(&device.kind) {
            continue;
        }

        let whitelisted = overrides.only.iter().any(|d| d == &device.path);
        let status = classify(
            device,
            topology,
            discovery,
            boot_set,
            overrides,
            whitelisted,
            boot_has_zfs_member,
        );

        let (disk_index, part_index) = logical_address(topology, &device.path, &disks);
        volumes.push(Volume {
            device: device.path.clone(),
            disk_index,
            part_index,
            fstype: device.fstype.clone().unwrap_or_default(),
            size: device.size,
            archive_base: String::new(),
            status,
        });
    }

    // Render names for every volume, then force pairwise distinctness so
    // sparse patterns still yield one spool/remote directory per volume.
    let mut names: Vec<String> = volumes
        .iter()
        .map(|v| {
            naming
                .pattern
                .render(&naming.date, &naming.token, v.disk_index, v.part_index)
        })
        .collect();
    uniquify(&mut names);
    for (volume, name) in volumes.iter_mut().zip(names) {
        volume.archive_base = name;
    }

    volumes
}

/// Selected volumes in dispatch order: size descending, stable tie-break
/// on device path.
pub fn selected_largest_first(volumes: &[Volume]) -> Vec<Volume> {
    let mut selected: Vec<Volume> = volumes
        .iter()
        .filter(|v| v.status.is_selected())
        .cloned()
        .collect();
    selected.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.device.cmp(&b.device)));
    selected
}

fn is_candidate_kind(kind: &DeviceKind) -> bool {
    matches!(
        kind,
        DeviceKind::Disk
            | DeviceKind::Partition
            | DeviceKind::LvmLv
            | DeviceKind::Raid
            | DeviceKind::Zvol
            | DeviceKind::Loop
            | DeviceKind::Crypt
    )
}

fn classify(
    device: &Device,
    topology: &Topology,
    discovery: &DiscoveryConfig,
    boot_set: &BTreeSet<String>,
    overrides: &Overrides,
    whitelisted: bool,
    boot_has_zfs_member: bool,
) -> VolumeStatus {
    // 1a. Boot chain: the device itself, or anything descending from a
    // boot-set member, never leaves the host.
    if boot_set.contains(&device.path)
        || topology
            .ancestors_of(&device.path)
            .iter()
            .any(|a| boot_set.contains(&a.path))
    {
        return VolumeStatus::Skipped {
            reason: SkipReason::Boot,
        };
    }
    // Zvols are refused when the boot disk is itself a pool member, unless
    // explicitly whitelisted: a pool spanning the boot disk must not be
    // touched even readonly-imported.
    if device.kind == DeviceKind::Zvol && boot_has_zfs_member && !whitelisted {
        return VolumeStatus::Skipped {
            reason: SkipReason::Boot,
        };
    }

    // 1b. Avoid list and CLI restrictions.
    if discovery.avoid_devices.iter().any(|d| d == &device.path)
        || overrides.exclude.iter().any(|d| d == &device.path)
        || (!overrides.only.is_empty() && !whitelisted)
    {
        return VolumeStatus::Skipped {
            reason: SkipReason::Avoided,
        };
    }

    // 2. A failed probe means the contents are unknown; never guess.
    if device.probe_failed {
        return VolumeStatus::Skipped {
            reason: SkipReason::InspectionFailed,
        };
    }

    let fstype = device.fstype.as_deref().unwrap_or("");

    // 3. Explicitly blocked filesystem types.
    if discovery.skip_fstypes.iter().any(|t| t == fstype) {
        return VolumeStatus::Skipped {
            reason: SkipReason::FstypeBlocked,
        };
    }

    // 4. Not on the include list. Encrypted containers are exempt here so
    // they surface as `encrypted` below rather than `fstype_unsupported`.
    if !device.is_encrypted() && !discovery.include_fstypes.iter().any(|t| t == fstype) {
        return VolumeStatus::Skipped {
            reason: SkipReason::FstypeUnsupported,
        };
    }

    // 5. Encryption.
    if device.is_encrypted() && discovery.skip_if_encrypted {
        return VolumeStatus::Skipped {
            reason: SkipReason::Encrypted,
        };
    }

    // 6. Size threshold.
    if device.size < discovery.min_partition_bytes() {
        return VolumeStatus::Skipped {
            reason: SkipReason::TooSmall,
        };
    }

    // 7. Layer policy: the device's own kind or any ancestor's.
    let ancestors = topology.ancestors_of(&device.path);
    let from_lvm = device.kind == DeviceKind::LvmLv
        || ancestors.iter().any(|a| a.kind == DeviceKind::LvmLv);
    let from_raid = device.kind == DeviceKind::Raid
        || ancestors.iter().any(|a| a.kind == DeviceKind::Raid);
    if (from_lvm && !discovery.allow_lvm) || (from_raid && !discovery.allow_raid) {
        return VolumeStatus::Skipped {
            reason: SkipReason::LayerDisallowed,
        };
    }

    VolumeStatus::Selected
}

/// True when any boot-set member (or a device under one) is a ZFS pool
/// member: importing that pool even readonly is off the table.
fn boot_disk_carries_zfs(topology: &Topology, boot_set: &BTreeSet<String>) -> bool {
    topology.devices.iter().any(|d| {
        d.fstype.as_deref() == Some("zfs_member")
            && (boot_set.contains(&d.path)
                || topology
                    .ancestors_of(&d.path)
                    .iter()
                    .any(|a| boot_set.contains(&a.path)))
    })
}

/// `(disk ordinal, partition ordinal)` for the naming tokens.
fn logical_address(topology: &Topology, path: &str, disks: &[String]) -> (usize, usize) {
    let disk_index = topology
        .whole_disk_ancestor(path)
        .and_then(|disk| disks.iter().position(|d| *d == disk.path))
        .unwrap_or(0);

    let part_index = match topology.get(path).map(|d| &d.kind) {
        Some(DeviceKind::Partition) => topology
            .get(path)
            .and_then(|d| d.parent.as_deref())
            .map(|parent| {
                topology
                    .children_of(parent)
                    .iter()
                    .position(|c| c.path == path)
                    .map(|i| i + 1)
                    .unwrap_or(0)
            })
            .unwrap_or(0),
        _ => 0,
    };

    (disk_index, part_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(path: &str, kind: DeviceKind, fstype: Option<&str>, size: u64, parent: Option<&str>) -> Device {
        Device {
            path: path.to_string(),
            name: path.trim_start_matches("/dev/").to_string(),
            kind,
            fstype: fstype.map(|s| s.to_string()),
            size,
            parent: parent.map(|s| s.to_string()),
            mountpoints: Vec::new(),
            encryption: None,
            probe_failed: false,
        }
    }

    const GIB: u64 = 1 << 30;

    /// Scenario topology: sda holds the root mount, sdb1 is a 500 GiB
    /// ext4 data volume, sdc1 is LUKS.
    fn scenario_topology() -> Topology {
        Topology::new(vec![
            device("/dev/sda", DeviceKind::Disk, None, 100 * GIB, None),
            device("/dev/sda1", DeviceKind::Partition, Some("vfat"), GIB, Some("/dev/sda")),
            device("/dev/sda2", DeviceKind::Partition, Some("ext4"), 99 * GIB, Some("/dev/sda")),
            device("/dev/sdb", DeviceKind::Disk, None, 500 * GIB, None),
            device("/dev/sdb1", DeviceKind::Partition, Some("ext4"), 500 * GIB, Some("/dev/sdb")),
            device("/dev/sdc", DeviceKind::Disk, None, 200 * GIB, None),
            device(
                "/dev/sdc1",
                DeviceKind::Partition,
                Some("crypto_LUKS"),
                200 * GIB,
                Some("/dev/sdc"),
            ),
        ])
    }

    fn naming() -> NamingContext {
        NamingContext {
            date: "20260801".to_string(),
            token: "a1b2c".to_string(),
            pattern: NamePattern::default(),
        }
    }

    fn boot_set() -> BTreeSet<String> {
        ["/dev/sda2", "/dev/sda"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn status_of<'a>(volumes: &'a [Volume], device: &str) -> &'a VolumeStatus {
        &volumes.iter().find(|v| v.device == device).unwrap().status
    }

    #[test]
    fn test_default_scenario() {
        let volumes = enumerate(
            &scenario_topology(),
            &DiscoveryConfig::default(),
            &boot_set(),
            &Overrides::default(),
            &naming(),
        );

        assert_eq!(
            *status_of(&volumes, "/dev/sda1"),
            VolumeStatus::Skipped { reason: SkipReason::Boot }
        );
        assert_eq!(
            *status_of(&volumes, "/dev/sda2"),
            VolumeStatus::Skipped { reason: SkipReason::Boot }
        );
        assert_eq!(*status_of(&volumes, "/dev/sdb1"), VolumeStatus::Selected);
        assert_eq!(
            *status_of(&volumes, "/dev/sdc1"),
            VolumeStatus::Skipped { reason: SkipReason::Encrypted }
        );
    }

    #[test]
    fn test_too_small_threshold() {
        // One 10 GiB ext4 under a 256 GiB threshold
        let topology = Topology::new(vec![
            device("/dev/sdb", DeviceKind::Disk, None, 600 * GIB, None),
            device("/dev/sdb1", DeviceKind::Partition, Some("ext4"), 500 * GIB, Some("/dev/sdb")),
            device("/dev/sdb2", DeviceKind::Partition, Some("ext4"), 10 * GIB, Some("/dev/sdb")),
        ]);
        let discovery = DiscoveryConfig {
            min_partition_size_gb: 256,
            ..Default::default()
        };
        let volumes = enumerate(
            &topology,
            &discovery,
            &BTreeSet::new(),
            &Overrides::default(),
            &naming(),
        );
        assert_eq!(*status_of(&volumes, "/dev/sdb1"), VolumeStatus::Selected);
        assert_eq!(
            *status_of(&volumes, "/dev/sdb2"),
            VolumeStatus::Skipped { reason: SkipReason::TooSmall }
        );
    }

    #[test]
    fn test_fstype_filters() {
        let topology = Topology::new(vec![
            device("/dev/sdb", DeviceKind::Disk, None, 600 * GIB, None),
            device("/dev/sdb1", DeviceKind::Partition, Some("swap"), 8 * GIB, Some("/dev/sdb")),
            device("/dev/sdb2", DeviceKind::Partition, Some("minix"), 8 * GIB, Some("/dev/sdb")),
        ]);
        let volumes = enumerate(
            &topology,
            &DiscoveryConfig::default(),
            &BTreeSet::new(),
            &Overrides::default(),
            &naming(),
        );
        assert_eq!(
            *status_of(&volumes, "/dev/sdb1"),
            VolumeStatus::Skipped { reason: SkipReason::FstypeBlocked }
        );
        assert_eq!(
            *status_of(&volumes, "/dev/sdb2"),
            VolumeStatus::Skipped { reason: SkipReason::FstypeUnsupported }
        );
    }

    #[test]
    fn test_layer_disallowed() {
        let topology = Topology::new(vec![
            device("/dev/sdb", DeviceKind::Disk, None, 600 * GIB, None),
            device("/dev/sdb1", DeviceKind::Partition, Some("LVM2_member"), 600 * GIB, Some("/dev/sdb")),
            device(
                "/dev/mapper/vg0-data",
                DeviceKind::LvmLv,
                Some("ext4"),
                500 * GIB,
                Some("/dev/sdb1"),
            ),
        ]);
        let discovery = DiscoveryConfig {
            allow_lvm: false,
            ..Default::default()
        };
        let volumes = enumerate(
            &topology,
            &discovery,
            &BTreeSet::new(),
            &Overrides::default(),
            &naming(),
        );
        assert_eq!(
            *status_of(&volumes, "/dev/mapper/vg0-data"),
            VolumeStatus::Skipped { reason: SkipReason::LayerDisallowed }
        );
    }

    #[test]
    fn test_only_and_exclude_overrides() {
        let overrides = Overrides {
            only: vec!["/dev/sdb1".to_string()],
            exclude: Vec::new(),
        };
        let volumes = enumerate(
            &scenario_topology(),
            &DiscoveryConfig::default(),
            &BTreeSet::new(),
            &overrides,
            &naming(),
        );
        assert_eq!(*status_of(&volumes, "/dev/sdb1"), VolumeStatus::Selected);
        assert_eq!(
            *status_of(&volumes, "/dev/sda2"),
            VolumeStatus::Skipped { reason: SkipReason::Avoided }
        );

        let overrides = Overrides {
            only: Vec::new(),
            exclude: vec!["/dev/sdb1".to_string()],
        };
        let volumes = enumerate(
            &scenario_topology(),
            &DiscoveryConfig::default(),
            &BTreeSet::new(),
            &overrides,
            &naming(),
        );
        assert_eq!(
            *status_of(&volumes, "/dev/sdb1"),
            VolumeStatus::Skipped { reason: SkipReason::Avoided }
        );
    }

    #[test]
    fn test_probe_failure_skips() {
        let mut topology = scenario_topology();
        topology
            .devices
            .iter_mut()
            .find(|d| d.path == "/dev/sdb1")
            .unwrap()
            .probe_failed = true;
        let volumes = enumerate(
            &topology,
            &DiscoveryConfig::default(),
            &boot_set(),
            &Overrides::default(),
            &naming(),
        );
        assert_eq!(
            *status_of(&volumes, "/dev/sdb1"),
            VolumeStatus::Skipped { reason: SkipReason::InspectionFailed }
        );
    }

    #[test]
    fn test_largest_first_ordering_with_stable_tiebreak() {
        let topology = Topology::new(vec![
            device("/dev/sdb", DeviceKind::Disk, None, 600 * GIB, None),
            device("/dev/sdb1", DeviceKind::Partition, Some("ext4"), 100 * GIB, Some("/dev/sdb")),
            device("/dev/sdb2", DeviceKind::Partition, Some("ext4"), 300 * GIB, Some("/dev/sdb")),
            device("/dev/sdb3", DeviceKind::Partition, Some("xfs"), 300 * GIB, Some("/dev/sdb")),
        ]);
        let volumes = enumerate(
            &topology,
            &DiscoveryConfig::default(),
            &BTreeSet::new(),
            &Overrides::default(),
            &naming(),
        );
        let dispatch = selected_largest_first(&volumes);
        let order: Vec<&str> = dispatch.iter().map(|v| v.device.as_str()).collect();
        assert_eq!(order, vec!["/dev/sdb2", "/dev/sdb3", "/dev/sdb1"]);
    }

    #[test]
    fn test_enumeration_is_deterministic() {
        let a = enumerate(
            &scenario_topology(),
            &DiscoveryConfig::default(),
            &boot_set(),
            &Overrides::default(),
            &naming(),
        );
        let b = enumerate(
            &scenario_topology(),
            &DiscoveryConfig::default(),
            &boot_set(),
            &Overrides::default(),
            &naming(),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_names_are_unique_even_with_sparse_pattern() {
        let sparse = NamingContext {
            date: "20260801".to_string(),
            token: "a1b2c".to_string(),
            pattern: NamePattern::new("{date}"),
        };
        let volumes = enumerate(
            &scenario_topology(),
            &DiscoveryConfig::default(),
            &boot_set(),
            &Overrides::default(),
            &sparse,
        );
        let mut names: Vec<&str> = volumes.iter().map(|v| v.archive_base.as_str()).collect();
        names.sort();
        let before = names.len();
        names.dedup();
        assert_eq!(names.len(), before);
    }

    #[test]
    fn test_logical_addresses() {
        let volumes = enumerate(
            &scenario_topology(),
            &DiscoveryConfig::default(),
            &boot_set(),
            &Overrides::default(),
            &naming(),
        );
        let sdb1 = volumes.iter().find(|v| v.device == "/dev/sdb1").unwrap();
        assert_eq!(sdb1.disk_index, 1);
        assert_eq!(sdb1.part_index, 1);
        assert_eq!(sdb1.archive_base, "20260801-a1b2c-d1p1");
    }
}
