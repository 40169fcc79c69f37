// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Device Inspector
//!
//! Topology snapshots from `lsblk --json`, filesystem/encryption signature
//! probes from `blkid`, and boot-device detection from `findmnt`. All
//! queries are read-only; every helper runs through the shell executor
//! with a non-dry shell because inspection never mutates the host and the
//! plan needs real data even under `--dry-run`.
//!
//! ## Failure posture
//!
//! A failed lsblk invocation is fatal for discovery (there is nothing to
//! enumerate). A failed per-device blkid probe is advisory: the device is
//! marked `probe_failed` and the enumerator skips it with reason
//! `inspection_failed` rather than guessing at its contents.

use std::collections::BTreeSet;

use once_cell::sync::OnceCell;
use serde::Deserialize;

use diskharvest_domain::{
    Device, DeviceInspector, DeviceKind, EncryptionSignature, HarvestError, Topology,
};

use crate::infrastructure::exec::Shell;

/// lsblk output columns the inspector relies on.
const LSBLK_COLUMNS: &str = "NAME,PATH,TYPE,FSTYPE,SIZE,MOUNTPOINTS,PKNAME";

/// Process-wide cache of the boot-exclusion set; the topology around the
/// running root does not change mid-run.
static BOOT_EXCLUSION: OnceCell<BTreeSet<String>> = OnceCell::new();

#[derive(Debug, Deserialize)]
struct LsblkDocument {
    blockdevices: Vec<LsblkRow>,
}

// Not every lsblk build emits every column; missing ones deserialize to None.
#[derive(Debug, Deserialize)]
struct LsblkRow {
    name: String,
    path: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    fstype: Option<String>,
    size: Option<u64>,
    mountpoints: Option<Vec<Option<String>>>,
    pkname: Option<String>,
    children: Option<Vec<LsblkRow>>,
}

impl LsblkRow {
    fn device_path(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("/dev/{}", self.name))
    }
}

/// Flatten the nested lsblk tree into the domain topology.
pub fn parse_lsblk(json: &str) -> Result<Topology, HarvestError> {
    let doc: LsblkDocument = serde_json::from_str(json)
        .map_err(|err| HarvestError::Inspection(format!("cannot parse lsblk output: {}", err)))?;

    let mut devices = Vec::new();
    for row in &doc.blockdevices {
        flatten_row(row, None, &mut devices);
    }
    Ok(Topology::new(devices))
}

fn flatten_row(row: &LsblkRow, parent: Option<&str>, out: &mut Vec<Device>) {
    let path = row.device_path();
    let fstype = row.fstype.clone().filter(|s| !s.is_empty());
    let encryption = fstype.as_deref().and_then(EncryptionSignature::from_tag);

    out.push(Device {
        path: path.clone(),
        name: row.name.clone(),
        kind: DeviceKind::from_lsblk(row.kind.as_deref().unwrap_or("")),
        fstype,
        size: row.size.unwrap_or(0),
        // lsblk PKNAME is a kernel name; prefer the structural nesting,
        // which is always a full path we produced ourselves.
        parent: parent
            .map(|p| p.to_string())
            .or_else(|| row.pkname.clone().map(|p| format!("/dev/{}", p))),
        mountpoints: row
            .mountpoints
            .iter()
            .flatten()
            .flatten()
            .cloned()
            .collect(),
        encryption,
        probe_failed: false,
    });

    for child in row.children.iter().flatten() {
        flatten_row(child, Some(&path), out);
    }
}

/// Derive the boot-exclusion set for a given root source device.
///
/// The set holds the backing device itself, every ancestor on its parent
/// chain, and its whole-disk ancestor; the enumerator additionally drops
/// any device *descending from* a member, which is what makes `sda1` and
/// `sda2` boot-excluded when `/` lives on `sda2`.
pub fn boot_set_for(topology: &Topology, root_source: &str) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    if !root_source.starts_with("/dev/") {
        // ZFS-on-root and friends; nothing to map onto the device tree.
        return set;
    }
    set.insert(root_source.to_string());
    for ancestor in topology.ancestors_of(root_source) {
        set.insert(ancestor.path.clone());
    }
    if let Some(disk) = topology.whole_disk_ancestor(root_source) {
        set.insert(disk.path.clone());
    }
    set
}

/// Production inspector backed by lsblk/blkid/findmnt.
pub struct LsblkInspector {
    shell: Shell,
    /// Probe devices without a declared fstype for hidden signatures
    probe_unknown: bool,
}

impl LsblkInspector {
    pub fn new() -> Self {
        Self {
            shell: Shell::read_only(),
            probe_unknown: true,
        }
    }

    /// Signature probe for one device path.
    ///
    /// `blkid -p` exits 2 when no signature is recognized; that is a clean
    /// "nothing there", not a failure.
    pub fn probe_signature(&self, path: &str) -> Result<Option<String>, HarvestError> {
        let output = self
            .shell
            .run(["blkid", "-p", "-s", "TYPE", "-o", "value", path])
            .map_err(|err| HarvestError::Inspection(err.to_string()))?;
        match output.status {
            0 => {
                let tag = output.stdout.trim().to_string();
                Ok(if tag.is_empty() { None } else { Some(tag) })
            }
            2 => Ok(None),
            status => Err(HarvestError::Inspection(format!(
                "blkid -p {} exited {}: {}",
                path,
                status,
                output.stderr.trim()
            ))),
        }
    }

    fn root_source(&self) -> Result<String, HarvestError> {
        let output = self
            .shell
            .run_checked(["findmnt", "-n", "-o", "SOURCE", "/"])
            .map_err(|err| HarvestError::Inspection(err.to_string()))?;
        Ok(output.stdout.trim().to_string())
    }
}

impl Default for LsblkInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceInspector for LsblkInspector {
    fn snapshot(&self) -> Result<Topology, HarvestError> {
        let output = self
            .shell
            .run_checked(["lsblk", "--json", "--bytes", "-o", LSBLK_COLUMNS])
            .map_err(|err| HarvestError::Inspection(err.to_string()))?;
        let mut topology = parse_lsblk(&output.stdout)?;

        if self.probe_unknown {
            // Leaves without a declared fstype may still carry a signature
            // lsblk does not surface (BitLocker, VeraCrypt containers).
            let unknown: Vec<String> = topology
                .leaves()
                .iter()
                .filter(|d| d.fstype.is_none() && d.kind != DeviceKind::Rom)
                .map(|d| d.path.clone())
                .collect();
            for path in unknown {
                match self.probe_signature(&path) {
                    Ok(Some(tag)) => {
                        if let Some(device) =
                            topology.devices.iter_mut().find(|d| d.path == path)
                        {
                            device.encryption = EncryptionSignature::from_tag(&tag);
                            device.fstype = Some(tag);
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(device = %path, error = %err, "signature probe failed");
                        if let Some(device) =
                            topology.devices.iter_mut().find(|d| d.path == path)
                        {
                            device.probe_failed = true;
                        }
                    }
                }
            }
        }

        Ok(topology)
    }

    fn boot_exclusion(&self, topology: &Topology) -> Result<BTreeSet<String>, HarvestError> {
        if let Some(cached) = BOOT_EXCLUSION.get() {
            return Ok(cached.clone());
        }
        let source = self.root_source()?;
        let set = boot_set_for(topology, &source);
        if set.is_empty() {
            tracing::warn!(
                root_source = %source,
                "could not map the root mount onto a block device; boot exclusion is empty"
            );
        }
        Ok(BOOT_EXCLUSION.get_or_init(|| set).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LSBLK_FIXTURE: &str = r#"{
        "blockdevices": [
            {
                "name": "sda", "path": "/dev/sda", "type": "disk", "fstype": null,
                "size": 500107862016, "mountpoints": [null], "pkname": null,
                "children": [
                    {
                        "name": "sda1", "path": "/dev/sda1", "type": "part",
                        "fstype": "vfat", "size": 536870912,
                        "mountpoints": ["/boot/efi"], "pkname": "sda"
                    },
                    {
                        "name": "sda2", "path": "/dev/sda2", "type": "part",
                        "fstype": "ext4", "size": 499570991104,
                        "mountpoints": ["/"], "pkname": "sda"
                    }
                ]
            },
            {
                "name": "sdb", "path": "/dev/sdb", "type": "disk", "fstype": null,
                "size": 2000398934016, "mountpoints": [null], "pkname": null,
                "children": [
                    {
                        "name": "sdb1", "path": "/dev/sdb1", "type": "part",
                        "fstype": "crypto_LUKS", "size": 2000397795328,
                        "mountpoints": [null], "pkname": "sdb"
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_lsblk_fixture() {
        let topology = parse_lsblk(LSBLK_FIXTURE).unwrap();
        assert_eq!(topology.devices.len(), 5);

        let sda2 = topology.get("/dev/sda2").unwrap();
        assert_eq!(sda2.kind, DeviceKind::Partition);
        assert_eq!(sda2.fstype.as_deref(), Some("ext4"));
        assert_eq!(sda2.parent.as_deref(), Some("/dev/sda"));
        assert_eq!(sda2.mountpoints, vec!["/"]);

        let sdb1 = topology.get("/dev/sdb1").unwrap();
        assert_eq!(sdb1.encryption, Some(EncryptionSignature::Luks));
        assert!(sdb1.is_encrypted());
    }

    #[test]
    fn test_parse_lsblk_rejects_garbage() {
        assert!(parse_lsblk("not json").is_err());
    }

    #[test]
    fn test_boot_set_for_partition_root() {
        let topology = parse_lsblk(LSBLK_FIXTURE).unwrap();
        let set = boot_set_for(&topology, "/dev/sda2");
        assert!(set.contains("/dev/sda2"));
        assert!(set.contains("/dev/sda"));
        assert!(!set.contains("/dev/sdb"));
    }

    #[test]
    fn test_boot_set_for_non_device_root() {
        let topology = parse_lsblk(LSBLK_FIXTURE).unwrap();
        let set = boot_set_for(&topology, "rpool/ROOT/default");
        assert!(set.is_empty());
    }

    #[test]
    fn test_missing_columns_tolerated() {
        // Older lsblk without PATH/MOUNTPOINTS columns
        let json = r#"{"blockdevices": [{"name": "vda", "type": "disk", "size": 1}]}"#;
        let topology = parse_lsblk(json).unwrap();
        let vda = topology.get("/dev/vda").unwrap();
        assert_eq!(vda.size, 1);
        assert!(vda.mountpoints.is_empty());
    }
}
