// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Plan Rendering
//!
//! Human-facing output for `--list` (the enumeration plan with skip
//! reasons) and `--dry-run` (the plan plus every command the run would
//! execute). Rendering is pure string building so the exact output is
//! testable.

use diskharvest_domain::{Volume, VolumeStatus};

use crate::infrastructure::chunker::CompressorSpec;
use crate::infrastructure::config::Config;
use crate::infrastructure::mount::MountRecipe;

/// The `--list` table: one line per enumerated volume.
pub fn render_plan(volumes: &[Volume]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<24} {:>5} {:>10} {:<10} {:<28} {}\n",
        "DEVICE", "ADDR", "SIZE", "FSTYPE", "ARCHIVE", "STATUS"
    ));
    for volume in volumes {
        let status = match &volume.status {
            VolumeStatus::Selected => "selected".to_string(),
            VolumeStatus::Skipped { reason } => format!("skipped{{{}}}", reason),
            VolumeStatus::Failed { kind, .. } => format!("failed{{{}}}", kind),
        };
        out.push_str(&format!(
            "{:<24} {:>5} {:>10} {:<10} {:<28} {}\n",
            volume.device,
            volume.address(),
            human_size(volume.size),
            if volume.fstype.is_empty() {
                "-"
            } else {
                volume.fstype.as_str()
            },
            volume.archive_base,
            status
        ));
    }
    out
}

/// The `--dry-run` command listing for every selected volume.
pub fn render_commands(
    volumes: &[Volume],
    config: &Config,
    compressor: Option<&CompressorSpec>,
    host_token: &str,
    run_date: &str,
) -> String {
    let mut out = String::new();
    for volume in volumes.iter().filter(|v| v.status.is_selected()) {
        let target = config
            .archive
            .spool_dir
            .join(".mnt")
            .join(&volume.archive_base);
        out.push_str(&format!("# {} ({})\n", volume.device, volume.archive_base));

        match MountRecipe::for_fstype(&volume.fstype) {
            Some(recipe) => {
                out.push_str(&format!(
                    "  {}\n",
                    recipe.argv(&volume.device, &target).join(" ")
                ));
            }
            None => {
                out.push_str(&format!(
                    "  # no mount recipe for fstype '{}'\n",
                    volume.fstype
                ));
                continue;
            }
        }
        match compressor {
            Some(spec) => out.push_str(&format!(
                "  tar -C {} ... | {} {} | split into {} MiB parts\n",
                target.display(),
                spec.program,
                spec.args.join(" "),
                config.archive.chunk_size_mb
            )),
            None => out.push_str("  # no usable compressor in PATH\n"),
        }
        out.push_str(&format!(
            "  rsync --partial --inplace {spool}/{base}/ {remote}/{date}/{token}/{base}/\n",
            spool = config.archive.spool_dir.display(),
            base = volume.archive_base,
            remote = config.server.remote,
            date = run_date,
            token = host_token,
        ));
        out.push_str(&format!("  umount {}\n", target.display()));
    }
    out
}

/// `512 B` / `10.0 MiB` / `500.0 GiB` style sizes for the plan table.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
