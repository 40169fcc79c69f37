// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Layer Assembler
//!
//! Activates composite storage layers read-only before discovery so their
//! volumes appear in the lsblk snapshot:
//!
//! - **md-RAID**: `mdadm --assemble --scan --readonly`
//! - **LVM**: `vgscan --mknodes`, `vgchange -ay --sysinit`, then every
//!   activated LV is pinned read-only at the block layer with
//!   `blockdev --setro` (the `lvchange -pr` route would write LVM metadata
//!   and violate the no-write contract)
//! - **ZFS**: `zpool import -a -o readonly=on -N` (no dataset mounts)
//!
//! Every step is idempotent against an already-active layer and
//! independently skippable by config. Failures are warnings: the
//! corresponding volumes simply never appear in the snapshot. Layers are
//! never dismantled on exit; they are part of the rescue environment's
//! state once assembled.

use diskharvest_domain::HarvestError;
use which::which;

use crate::infrastructure::config::DiscoveryConfig;
use crate::infrastructure::exec::Shell;

/// Outcome of one activation pass, for the run log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerReport {
    pub raid_attempted: bool,
    pub lvm_attempted: bool,
    pub zfs_attempted: bool,
    pub warnings: Vec<String>,
}

/// Assembles md-RAID, LVM, and ZFS layers read-only.
pub struct LayerAssembler {
    shell: Shell,
}

impl LayerAssembler {
    pub fn new(shell: Shell) -> Self {
        Self { shell }
    }

    /// Run every enabled activation step. Never fails the run.
    pub fn activate(&self, discovery: &DiscoveryConfig) -> LayerReport {
        let mut report = LayerReport::default();

        if discovery.allow_raid {
            report.raid_attempted = true;
            self.assemble_raid(&mut report);
        }
        if discovery.allow_lvm {
            report.lvm_attempted = true;
            self.activate_lvm(&mut report);
        }
        if discovery.allow_zfs {
            report.zfs_attempted = true;
            self.import_zfs_pools(&mut report);
        }

        for warning in &report.warnings {
            tracing::warn!(warning = %warning, "layer activation");
        }
        report
    }

    fn assemble_raid(&self, report: &mut LayerReport) {
        if which("mdadm").is_err() {
            report.note("mdadm not installed, skipping RAID assembly");
            return;
        }
        // Exit 0: arrays assembled. Exit 1/2 with "No arrays found" is the
        // idempotent/no-op case, not a failure worth a warning.
        match self.shell.run(["mdadm", "--assemble", "--scan", "--readonly"]) {
            Ok(out) if out.status == 0 => {
                tracing::info!("md-RAID arrays assembled read-only");
            }
            Ok(out) if out.stderr.contains("No arrays found") => {}
            Ok(out) => report.note(format!(
                "mdadm --assemble exited {}: {}",
                out.status,
                out.stderr.trim()
            )),
            Err(err) => report.note(format!("mdadm --assemble failed: {}", err)),
        }
    }

    fn activate_lvm(&self, report: &mut LayerReport) {
        if which("vgchange").is_err() {
            report.note("LVM tools not installed, skipping VG activation");
            return;
        }
        if let Err(err) = self.shell.run_checked(["vgscan", "--mknodes"]) {
            report.note(format!("vgscan failed: {}", err));
            return;
        }
        if let Err(err) = self.shell.run_checked(["vgchange", "-ay", "--sysinit"]) {
            report.note(format!("vgchange failed: {}", err));
            return;
        }
        // Pin every activated LV read-only at the block layer.
        match self
            .shell
            .run_checked(["lvs", "--noheadings", "-o", "lv_path"])
        {
            Ok(out) => {
                for lv_path in out.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    if let Err(err) = self.shell.run_checked(["blockdev", "--setro", lv_path]) {
                        report.note(format!("blockdev --setro {} failed: {}", lv_path, err));
                    }
                }
                tracing::info!("LVM volume groups activated, LVs set read-only");
            }
            Err(err) => report.note(format!("lvs enumeration failed: {}", err)),
        }
    }

    fn import_zfs_pools(&self, report: &mut LayerReport) {
        if which("zpool").is_err() {
            // ZFS is optional on most rescue media
            return;
        }
        match self
            .shell
            .run(["zpool", "import", "-a", "-o", "readonly=on", "-N"])
        {
            Ok(out) if out.status == 0 => {
                tracing::info!("ZFS pools imported readonly=on");
            }
            Ok(out) if out.stderr.contains("no pools available") => {}
            Ok(out) => report.note(format!(
                "zpool import exited {}: {}",
                out.status,
                out.stderr.trim()
            )),
            Err(err) => report.note(format!("zpool import failed: {}", err)),
        }
    }
}

impl LayerReport {
    fn note(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_layers_are_not_attempted() {
        let assembler = LayerAssembler::new(Shell::new(true));
        let discovery = DiscoveryConfig {
            allow_raid: false,
            allow_lvm: false,
            allow_zfs: false,
            ..Default::default()
        };
        let report = assembler.activate(&discovery);
        assert!(!report.raid_attempted);
        assert!(!report.lvm_attempted);
        assert!(!report.zfs_attempted);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_dry_run_reports_success_without_side_effects() {
        // Dry-run shell fabricates exit 0 for every helper that is present;
        // helpers missing from PATH are recorded as skip notes, not errors.
        let assembler = LayerAssembler::new(Shell::new(true));
        let discovery = DiscoveryConfig::default();
        let report = assembler.activate(&discovery);
        assert!(report.raid_attempted);
        assert!(report.lvm_attempted);
    }
}
