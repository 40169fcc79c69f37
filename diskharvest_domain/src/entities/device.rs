// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Device Topology Entities
//!
//! This module models the block-device topology of the rescue host: disks,
//! partitions, logical volumes, RAID members, zvols, and loop devices, each
//! with its declared filesystem type, size, observed mountpoints, and a link
//! to its parent device.
//!
//! ## Overview
//!
//! The topology is a DAG traversed child -> parent (a logical volume points
//! at its physical volume's disk, a partition points at its disk). There are
//! no back-references; `Topology` keeps a flat device list and resolves
//! relationships by path lookup, which keeps the snapshot trivially
//! serializable and cheap to clone into worker threads.
//!
//! The snapshot is produced by the infrastructure inspector (lsblk/blkid)
//! and consumed by the volume enumerator; nothing in this module performs
//! I/O or mutates the host.
//!
//! ## Encryption signatures
//!
//! A device is declared encrypted when its kind is a dm-crypt mapping, its
//! declared fstype is a crypto container, or a signature probe yields one of
//! the recognized tags (LUKS, BitLocker, APFS-encrypted/FileVault,
//! VeraCrypt). Encrypted devices are never mounted and never unlocked; the
//! safety contract forbids touching cryptographic material.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Block-device classification, mirroring the lsblk `TYPE` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Disk,
    Partition,
    LvmLv,
    Raid,
    Zvol,
    Loop,
    Crypt,
    Rom,
    Other(String),
}

impl DeviceKind {
    /// Parse the lsblk `TYPE` value.
    ///
    /// lsblk reports RAID arrays with a level suffix (`raid0`, `raid1`,
    /// `raid10`, ...); all of them collapse into [`DeviceKind::Raid`].
    pub fn from_lsblk(kind: &str) -> Self {
        match kind {
            "disk" => DeviceKind::Disk,
            "part" => DeviceKind::Partition,
            "lvm" => DeviceKind::LvmLv,
            "loop" => DeviceKind::Loop,
            "crypt" => DeviceKind::Crypt,
            "rom" => DeviceKind::Rom,
            "zvol" => DeviceKind::Zvol,
            other if other.starts_with("raid") => DeviceKind::Raid,
            other => DeviceKind::Other(other.to_string()),
        }
    }

    /// True for kinds produced by a composite layer (LVM or md-RAID).
    pub fn is_layered(&self) -> bool {
        matches!(self, DeviceKind::LvmLv | DeviceKind::Raid)
    }
}

/// Recognized on-disk encryption signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionSignature {
    Luks,
    BitLocker,
    ApfsEncrypted,
    FileVault,
    VeraCrypt,
    DmCrypt,
}

impl EncryptionSignature {
    /// Map a blkid/lsblk filesystem tag onto a signature, if it is one.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "crypto_LUKS" => Some(EncryptionSignature::Luks),
            "BitLocker" => Some(EncryptionSignature::BitLocker),
            "apfs_encrypted" => Some(EncryptionSignature::ApfsEncrypted),
            "FileVault" | "corestorage_encrypted" => Some(EncryptionSignature::FileVault),
            "VeraCrypt" | "truecrypt" => Some(EncryptionSignature::VeraCrypt),
            "DM_crypt" | "dm-crypt" => Some(EncryptionSignature::DmCrypt),
            _ => None,
        }
    }
}

/// One block device in the topology snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable path, e.g. `/dev/sda1` or `/dev/mapper/vg0-home`
    pub path: String,
    /// Kernel name (`sda1`, `dm-3`)
    pub name: String,
    pub kind: DeviceKind,
    /// Declared filesystem type, empty when no signature was found
    pub fstype: Option<String>,
    /// Size in bytes
    pub size: u64,
    /// Path of the parent device, if any
    pub parent: Option<String>,
    /// Mountpoints observed at snapshot time
    pub mountpoints: Vec<String>,
    /// Encryption signature, when one was detected
    pub encryption: Option<EncryptionSignature>,
    /// A signature probe was attempted for this device and failed; the
    /// enumerator must not trust the (absent) fstype
    #[serde(default)]
    pub probe_failed: bool,
}

impl Device {
    /// True if this device must be treated as an encrypted container.
    pub fn is_encrypted(&self) -> bool {
        if self.encryption.is_some() || self.kind == DeviceKind::Crypt {
            return true;
        }
        self.fstype
            .as_deref()
            .and_then(EncryptionSignature::from_tag)
            .is_some()
    }

    /// True when the device currently backs a mount.
    pub fn is_mounted(&self) -> bool {
        !self.mountpoints.is_empty()
    }
}

/// Immutable snapshot of the host block-device tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    pub devices: Vec<Device>,
}

impl Topology {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    /// Look a device up by path.
    pub fn get(&self, path: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.path == path)
    }

    /// Direct children of the given device path, in discovery order.
    pub fn children_of(&self, path: &str) -> Vec<&Device> {
        self.devices
            .iter()
            .filter(|d| d.parent.as_deref() == Some(path))
            .collect()
    }

    /// Devices with no children: the mountable leaves of the tree.
    pub fn leaves(&self) -> Vec<&Device> {
        let parents: BTreeSet<&str> = self
            .devices
            .iter()
            .filter_map(|d| d.parent.as_deref())
            .collect();
        self.devices
            .iter()
            .filter(|d| !parents.contains(d.path.as_str()))
            .collect()
    }

    /// Whole disks, in discovery order. Disk ordinals are assigned from
    /// this order when archive names are rendered.
    pub fn disks(&self) -> Vec<&Device> {
        self.devices
            .iter()
            .filter(|d| d.kind == DeviceKind::Disk)
            .collect()
    }

    /// Walk parent links up to the whole-disk ancestor of `path`.
    ///
    /// Returns the device itself when it is already a disk, or `None` when
    /// the chain never reaches one (e.g. a loop device).
    pub fn whole_disk_ancestor(&self, path: &str) -> Option<&Device> {
        let mut current = self.get(path)?;
        let mut hops = 0;
        while current.kind != DeviceKind::Disk {
            let parent = current.parent.as_deref()?;
            current = self.get(parent)?;
            // Parent links form a DAG; a cycle would mean a corrupt snapshot.
            hops += 1;
            if hops > 16 {
                return None;
            }
        }
        Some(current)
    }

    /// The transitive ancestor set (paths) of a device, excluding itself.
    pub fn ancestors_of(&self, path: &str) -> Vec<&Device> {
        let mut out = Vec::new();
        let mut current = self.get(path);
        let mut hops = 0;
        while let Some(dev) = current {
            match dev.parent.as_deref().and_then(|p| self.get(p)) {
                Some(parent) => {
                    out.push(parent);
                    current = Some(parent);
                }
                None => break,
            }
            hops += 1;
            if hops > 16 {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(path: &str, kind: DeviceKind, parent: Option<&str>) -> Device {
        Device {
            path: path.to_string(),
            name: path.trim_start_matches("/dev/").to_string(),
            kind,
            fstype: None,
            size: 0,
            parent: parent.map(|p| p.to_string()),
            mountpoints: Vec::new(),
            encryption: None,
            probe_failed: false,
        }
    }

    fn sample_topology() -> Topology {
        Topology::new(vec![
            dev("/dev/sda", DeviceKind::Disk, None),
            dev("/dev/sda1", DeviceKind::Partition, Some("/dev/sda")),
            dev("/dev/sda2", DeviceKind::Partition, Some("/dev/sda")),
            dev("/dev/sdb", DeviceKind::Disk, None),
            dev("/dev/sdb1", DeviceKind::Partition, Some("/dev/sdb")),
            dev("/dev/mapper/vg0-home", DeviceKind::LvmLv, Some("/dev/sdb1")),
        ])
    }

    #[test]
    fn test_kind_from_lsblk() {
        assert_eq!(DeviceKind::from_lsblk("disk"), DeviceKind::Disk);
        assert_eq!(DeviceKind::from_lsblk("part"), DeviceKind::Partition);
        assert_eq!(DeviceKind::from_lsblk("raid1"), DeviceKind::Raid);
        assert_eq!(DeviceKind::from_lsblk("raid10"), DeviceKind::Raid);
        assert_eq!(
            DeviceKind::from_lsblk("dax"),
            DeviceKind::Other("dax".to_string())
        );
    }

    #[test]
    fn test_whole_disk_ancestor() {
        let topo = sample_topology();
        let disk = topo.whole_disk_ancestor("/dev/mapper/vg0-home").unwrap();
        assert_eq!(disk.path, "/dev/sdb");

        let disk = topo.whole_disk_ancestor("/dev/sda1").unwrap();
        assert_eq!(disk.path, "/dev/sda");

        // A disk is its own ancestor
        let disk = topo.whole_disk_ancestor("/dev/sda").unwrap();
        assert_eq!(disk.path, "/dev/sda");
    }

    #[test]
    fn test_leaves_excludes_parents() {
        let topo = sample_topology();
        let leaves: Vec<&str> = topo.leaves().iter().map(|d| d.path.as_str()).collect();
        assert!(leaves.contains(&"/dev/sda1"));
        assert!(leaves.contains(&"/dev/mapper/vg0-home"));
        assert!(!leaves.contains(&"/dev/sda"));
        assert!(!leaves.contains(&"/dev/sdb1"));
    }

    #[test]
    fn test_encrypted_detection_from_fstype() {
        let mut d = dev("/dev/sdc1", DeviceKind::Partition, Some("/dev/sdc"));
        assert!(!d.is_encrypted());
        d.fstype = Some("crypto_LUKS".to_string());
        assert!(d.is_encrypted());

        let mut d = dev("/dev/sdc2", DeviceKind::Partition, Some("/dev/sdc"));
        d.encryption = Some(EncryptionSignature::BitLocker);
        assert!(d.is_encrypted());

        let d = dev("/dev/mapper/luks-x", DeviceKind::Crypt, None);
        assert!(d.is_encrypted());
    }

    #[test]
    fn test_signature_tags() {
        assert_eq!(
            EncryptionSignature::from_tag("crypto_LUKS"),
            Some(EncryptionSignature::Luks)
        );
        assert_eq!(
            EncryptionSignature::from_tag("BitLocker"),
            Some(EncryptionSignature::BitLocker)
        );
        assert_eq!(EncryptionSignature::from_tag("ext4"), None);
    }

    #[test]
    fn test_ancestors_of() {
        let topo = sample_topology();
        let chain: Vec<&str> = topo
            .ancestors_of("/dev/mapper/vg0-home")
            .iter()
            .map(|d| d.path.as_str())
            .collect();
        assert_eq!(chain, vec!["/dev/sdb1", "/dev/sdb"]);
    }
}
