// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Run Record
//!
//! The run record is the per-run summary written to the output directory as
//! `run-<ISO8601>.json`, plus optional per-volume JSON files. It aggregates
//! one entry per enumerated volume with a typed outcome, byte counters, and
//! elapsed time, and derives the process exit code.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::volume::{SkipReason, Volume};
use crate::error::FailureKind;

/// Terminal status of one volume within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Ok,
    Skipped,
    Failed,
}

/// Outcome entry for one volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub device: String,
    pub address: String,
    pub archive_base: String,
    pub fstype: String,
    pub size: u64,
    pub status: RecordStatus,
    /// Typed reason for skipped/failed volumes (`encrypted`, `mount`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Free-form failure detail, never parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_secs: f64,
    /// Bytes read from the mounted filesystem
    pub bytes_in: u64,
    /// Bytes confirmed on the remote target
    pub bytes_out: u64,
    pub chunks: u64,
    /// Committed chunks remain in the spool for a future resume
    pub resumable: bool,
}

impl VolumeRecord {
    /// Record for a volume the enumerator skipped.
    pub fn skipped(volume: &Volume, reason: SkipReason) -> Self {
        Self {
            device: volume.device.clone(),
            address: volume.address(),
            archive_base: volume.archive_base.clone(),
            fstype: volume.fstype.clone(),
            size: volume.size,
            status: RecordStatus::Skipped,
            reason: Some(reason.to_string()),
            detail: None,
            elapsed_secs: 0.0,
            bytes_in: 0,
            bytes_out: 0,
            chunks: 0,
            resumable: false,
        }
    }

    /// Record for a volume that failed at some stage.
    pub fn failed(volume: &Volume, kind: FailureKind, detail: String, elapsed_secs: f64) -> Self {
        Self {
            device: volume.device.clone(),
            address: volume.address(),
            archive_base: volume.archive_base.clone(),
            fstype: volume.fstype.clone(),
            size: volume.size,
            status: RecordStatus::Failed,
            reason: Some(kind.to_string()),
            detail: Some(detail),
            elapsed_secs,
            bytes_in: 0,
            bytes_out: 0,
            chunks: 0,
            resumable: matches!(kind, FailureKind::Transport | FailureKind::Cancelled),
        }
    }

    /// Record for a fully captured and shipped volume.
    pub fn ok(
        volume: &Volume,
        elapsed_secs: f64,
        bytes_in: u64,
        bytes_out: u64,
        chunks: u64,
    ) -> Self {
        Self {
            device: volume.device.clone(),
            address: volume.address(),
            archive_base: volume.archive_base.clone(),
            fstype: volume.fstype.clone(),
            size: volume.size,
            status: RecordStatus::Ok,
            reason: None,
            detail: None,
            elapsed_secs,
            bytes_in,
            bytes_out,
            chunks,
            resumable: false,
        }
    }
}

/// Aggregate counters across the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTotals {
    pub selected: u64,
    pub ok: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub chunks: u64,
}

/// The per-run summary document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub host_token: String,
    pub hostname: String,
    pub tool_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub volumes: Vec<VolumeRecord>,
    pub totals: RunTotals,
}

impl RunRecord {
    pub fn new(
        host_token: String,
        hostname: String,
        tool_version: String,
        started_at: DateTime<Utc>,
        dry_run: bool,
    ) -> Self {
        Self {
            host_token,
            hostname,
            tool_version,
            started_at,
            finished_at: started_at,
            dry_run,
            volumes: Vec::new(),
            totals: RunTotals::default(),
        }
    }

    /// Append one volume outcome, updating the aggregate counters.
    pub fn push(&mut self, record: VolumeRecord) {
        match record.status {
            RecordStatus::Ok => {
                self.totals.selected += 1;
                self.totals.ok += 1;
            }
            RecordStatus::Skipped => self.totals.skipped += 1,
            RecordStatus::Failed => {
                self.totals.selected += 1;
                self.totals.failed += 1;
            }
        }
        self.totals.bytes_in += record.bytes_in;
        self.totals.bytes_out += record.bytes_out;
        self.totals.chunks += record.chunks;
        self.volumes.push(record);
    }

    /// Process exit code: 0 when every selected volume is ok, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.totals.failed > 0 {
            1
        } else {
            0
        }
    }

    /// Summary file name, e.g. `run-2026-08-01T10:30:00Z.json`.
    pub fn file_name(&self) -> String {
        format!(
            "run-{}.json",
            self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::volume::VolumeStatus as VS;

    fn volume(device: &str, size: u64) -> Volume {
        Volume {
            device: device.to_string(),
            disk_index: 0,
            part_index: 1,
            fstype: "ext4".to_string(),
            size,
            archive_base: format!("20260801-abcde-{}", device.trim_start_matches("/dev/")),
            status: VS::Selected,
        }
    }

    #[test]
    fn test_totals_accumulate() {
        let started = Utc::now();
        let mut run = RunRecord::new(
            "abcde".to_string(),
            "rescue".to_string(),
            "0.3.2".to_string(),
            started,
            false,
        );

        run.push(VolumeRecord::ok(&volume("/dev/sdb1", 100), 1.5, 100, 40, 2));
        run.push(VolumeRecord::skipped(
            &volume("/dev/sdc1", 10),
            SkipReason::Encrypted,
        ));
        run.push(VolumeRecord::failed(
            &volume("/dev/sdd1", 50),
            FailureKind::Mount,
            "helper_missing: ntfs-3g".to_string(),
            0.2,
        ));

        assert_eq!(run.totals.selected, 2);
        assert_eq!(run.totals.ok, 1);
        assert_eq!(run.totals.skipped, 1);
        assert_eq!(run.totals.failed, 1);
        assert_eq!(run.totals.bytes_in, 100);
        assert_eq!(run.totals.bytes_out, 40);
        assert_eq!(run.totals.chunks, 2);
        assert_eq!(run.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_zero_when_all_ok() {
        let mut run = RunRecord::new(
            "abcde".to_string(),
            "rescue".to_string(),
            "0.3.2".to_string(),
            Utc::now(),
            false,
        );
        run.push(VolumeRecord::ok(&volume("/dev/sdb1", 100), 1.0, 10, 5, 1));
        run.push(VolumeRecord::skipped(
            &volume("/dev/sdc1", 10),
            SkipReason::TooSmall,
        ));
        assert_eq!(run.exit_code(), 0);
    }

    #[test]
    fn test_file_name_is_iso8601() {
        let run = RunRecord::new(
            "abcde".to_string(),
            "rescue".to_string(),
            "0.3.2".to_string(),
            "2026-08-01T10:30:00Z".parse().unwrap(),
            false,
        );
        assert_eq!(run.file_name(), "run-2026-08-01T10:30:00Z.json");
    }

    #[test]
    fn test_transport_failures_are_resumable() {
        let rec = VolumeRecord::failed(
            &volume("/dev/sdb1", 100),
            FailureKind::Transport,
            "network unreachable".to_string(),
            4.0,
        );
        assert!(rec.resumable);

        let rec = VolumeRecord::failed(
            &volume("/dev/sdb1", 100),
            FailureKind::Mount,
            "refused".to_string(),
            0.1,
        );
        assert!(!rec.resumable);
    }
}
