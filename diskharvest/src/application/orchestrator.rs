// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Orchestrator
//!
//! Drives a run end-to-end: layer activation, enumeration, largest-first
//! dispatch over a bounded worker pool, per-volume capture with full error
//! containment, and the run summary.
//!
//! ## Concurrency model
//!
//! `W` OS threads consume a crossbeam channel of selected volumes. Each
//! worker owns one volume at a time and runs its mount -> archive -> ship
//! pipeline synchronously; the only parallelism below a worker is the
//! compressor child's own threads. No futures cross module boundaries, so
//! every error stays scoped to the volume that raised it.
//!
//! ## Containment
//!
//! A worker never throws: every stage error is folded into the volume's
//! `VolumeRecord` with a typed reason. The orchestrator aborts a run only
//! for orchestrator-level problems (config, snapshot, summary directory),
//! which map to exit code 2.
//!
//! ## Cancellation
//!
//! On shutdown the queue stops being consumed (workers check the token
//! between volumes and between stages), in-flight compressor children are
//! killed by the chunk pipeline, mounts are released by their guards, and
//! committed chunks stay in the spool for resume.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;

use diskharvest_bootstrap::CancellationToken;
use diskharvest_domain::{
    ChunkTransport, DeviceInspector, HarvestError, Mounter, RunRecord, Volume, VolumeRecord,
    VolumeStatus, WorkerCount,
};

use crate::application::plan;
use crate::infrastructure::archive::ArchiveStreamer;
use crate::infrastructure::chunker::{ArchiveMeta, ChunkPipeline, CompressorSpec};
use crate::infrastructure::config::Config;
use crate::infrastructure::enumerate::{
    enumerate, selected_largest_first, NamingContext, Overrides,
};
use crate::infrastructure::exec::Shell;
use crate::infrastructure::layers::LayerAssembler;
use crate::infrastructure::mount::MountGuard;
use crate::infrastructure::shipper::Shipper;

/// Per-invocation switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub list_only: bool,
    pub dry_run: bool,
    pub overrides: Overrides,
}

/// What a run produced.
pub enum RunOutcome {
    /// `--list`/`--dry-run`: the rendered plan, nothing executed
    Planned(String),
    /// A real run with its summary record
    Completed(RunRecord),
}

/// Wires the ports together and drives the run.
pub struct Orchestrator<'a> {
    pub config: &'a Config,
    pub inspector: &'a dyn DeviceInspector,
    pub mounter: &'a dyn Mounter,
    pub transport: &'a dyn ChunkTransport,
    /// Resolved compressor; `None` when no usable one is installed
    pub compressor: Option<CompressorSpec>,
    pub workers: WorkerCount,
    pub host_token: String,
    pub hostname: String,
    pub token: CancellationToken,
}

impl Orchestrator<'_> {
    /// Execute the run. Errors returned here are orchestrator-level
    /// (exit code 2); volume failures live inside the run record.
    pub fn run(&self, options: &RunOptions) -> Result<RunOutcome, HarvestError> {
        let started_at = Utc::now();
        let run_date = started_at.format("%Y%m%d").to_string();

        // Composite layers first so their volumes exist for the snapshot.
        // Under --dry-run the commands are printed, not executed.
        LayerAssembler::new(Shell::new(options.dry_run)).activate(&self.config.discovery);

        let topology = self.inspector.snapshot()?;
        let boot_set = self.inspector.boot_exclusion(&topology)?;
        let naming = NamingContext {
            date: started_at
                .format(&self.config.naming.date_fmt)
                .to_string(),
            token: self.host_token.clone(),
            pattern: self.config.naming.name_pattern(),
        };
        let volumes = enumerate(
            &topology,
            &self.config.discovery,
            &boot_set,
            &options.overrides,
            &naming,
        );
        tracing::info!(
            total = volumes.len(),
            selected = volumes.iter().filter(|v| v.status.is_selected()).count(),
            "enumeration complete"
        );

        if options.list_only || options.dry_run {
            let mut rendered = plan::render_plan(&volumes);
            if options.dry_run {
                rendered.push('\n');
                rendered.push_str(&plan::render_commands(
                    &volumes,
                    self.config,
                    self.compressor.as_ref(),
                    &self.host_token,
                    &run_date,
                ));
            }
            return Ok(RunOutcome::Planned(rendered));
        }

        self.config.require_remote()?;

        let mut record = RunRecord::new(
            self.host_token.clone(),
            self.hostname.clone(),
            env!("CARGO_PKG_VERSION").to_string(),
            started_at,
            false,
        );

        for volume in &volumes {
            if let VolumeStatus::Skipped { reason } = &volume.status {
                tracing::info!(device = %volume.device, reason = %reason, "volume skipped");
                record.push(VolumeRecord::skipped(volume, *reason));
            }
        }

        let dispatch = selected_largest_first(&volumes);
        let results = self.drain_worker_pool(&dispatch, &run_date);

        // Completion order is nondeterministic; the summary lists volumes
        // in dispatch order.
        for wanted in &dispatch {
            if let Some(done) = results
                .iter()
                .find(|r| r.archive_base == wanted.archive_base)
            {
                record.push(done.clone());
            }
        }
        record.finished_at = Utc::now();

        self.write_summary(&record)?;
        Ok(RunOutcome::Completed(record))
    }

    /// Largest-first queue, `W` synchronous workers.
    fn drain_worker_pool(&self, dispatch: &[Volume], run_date: &str) -> Vec<VolumeRecord> {
        let (tx, rx) = crossbeam_channel::unbounded::<Volume>();
        for volume in dispatch {
            // Send cannot fail while rx is alive in this scope.
            let _ = tx.send(volume.clone());
        }
        drop(tx);

        let results: Mutex<Vec<VolumeRecord>> = Mutex::new(Vec::new());
        std::thread::scope(|scope| {
            for worker_id in 0..self.workers.count() {
                let rx = rx.clone();
                let results = &results;
                scope.spawn(move || {
                    while let Ok(volume) = rx.recv() {
                        let record = if self.token.is_cancelled() {
                            tracing::warn!(device = %volume.device, "cancelled before start");
                            VolumeRecord::failed(
                                &volume,
                                HarvestError::Cancelled.failure_kind(),
                                "run interrupted before this volume started".to_string(),
                                0.0,
                            )
                        } else {
                            tracing::info!(
                                worker = worker_id,
                                device = %volume.device,
                                size = volume.size,
                                "volume dispatched"
                            );
                            self.process_volume(&volume, run_date)
                        };
                        results.lock().push(record);
                    }
                });
            }
        });
        results.into_inner()
    }

    /// One volume, full containment: the result is always a record.
    fn process_volume(&self, volume: &Volume, run_date: &str) -> VolumeRecord {
        let started = Instant::now();
        match self.capture_volume(volume, run_date) {
            Ok((bytes_in, bytes_out, chunks)) => {
                let elapsed = started.elapsed().as_secs_f64();
                tracing::info!(
                    device = %volume.device,
                    bytes_in,
                    bytes_out,
                    chunks,
                    elapsed_secs = elapsed,
                    "volume captured"
                );
                VolumeRecord::ok(volume, elapsed, bytes_in, bytes_out, chunks)
            }
            Err(err) => {
                let elapsed = started.elapsed().as_secs_f64();
                tracing::error!(
                    device = %volume.device,
                    reason = %err.failure_kind(),
                    error = %err,
                    "volume failed"
                );
                VolumeRecord::failed(volume, err.failure_kind(), err.to_string(), elapsed)
            }
        }
    }

    /// mount -> archive/compress/chunk -> release -> ship -> clean spool.
    fn capture_volume(
        &self,
        volume: &Volume,
        run_date: &str,
    ) -> Result<(u64, u64, u64), HarvestError> {
        let compressor = self
            .compressor
            .clone()
            .ok_or(HarvestError::CompressorMissing)?;
        let algorithm = self.config.integrity.hash_algorithm()?;
        let spool_dir = self.spool_dir_for(volume);
        let mountpoint = self
            .config
            .archive
            .spool_dir
            .join(".mnt")
            .join(&volume.archive_base);

        let guard = MountGuard::acquire(self.mounter, volume, mountpoint)?;
        let streamer = ArchiveStreamer::new(
            guard.path().to_path_buf(),
            self.config.filters.max_file_size_mb,
            self.config.archive.preserve_xattrs,
        );
        let pipeline = ChunkPipeline::new(
            spool_dir.clone(),
            ArchiveMeta {
                archive_base: volume.archive_base.clone(),
                source_device: volume.device.clone(),
                fstype: volume.fstype.clone(),
                volume_size: volume.size,
                chunk_size: self.config.archive.chunk_size(),
                algorithm,
                level: self.config.archive.level,
            },
            compressor,
            self.token.clone(),
        );
        let outcome = pipeline.run(streamer);

        // The mount is released before the record is finalized on every
        // path, including archive failure.
        if let Err(err) = guard.release() {
            tracing::warn!(device = %volume.device, error = %err, "mount release failed");
        }
        let outcome = outcome?;

        if self.token.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }

        let remote_dir = format!("{}/{}/{}", run_date, self.host_token, volume.archive_base);
        let shipper = Shipper::new(self.transport, algorithm, self.token.clone());
        let shipped = shipper.ship(&spool_dir, &outcome.manifest, &remote_dir)?;

        // Confirmed remote: the local spool for this volume is done.
        if let Err(err) = std::fs::remove_dir_all(&spool_dir) {
            tracing::warn!(
                spool = %spool_dir.display(),
                error = %err,
                "could not clean spool after ship"
            );
        }

        Ok((
            outcome.archive_stats.bytes_read,
            shipped.bytes_out,
            outcome.manifest.chunks.len() as u64,
        ))
    }

    fn spool_dir_for(&self, volume: &Volume) -> PathBuf {
        self.config.archive.spool_dir.join(&volume.archive_base)
    }

    /// Write `run-<ISO8601>.json` and optional per-volume JSONs.
    fn write_summary(&self, record: &RunRecord) -> Result<(), HarvestError> {
        let dir = &self.config.output.run_summary_dir;
        std::fs::create_dir_all(dir).map_err(|err| {
            HarvestError::Internal(format!(
                "cannot create summary directory {}: {}",
                dir.display(),
                err
            ))
        })?;
        let body = serde_json::to_vec_pretty(record)
            .map_err(|err| HarvestError::Internal(err.to_string()))?;
        let path = dir.join(record.file_name());
        std::fs::write(&path, body).map_err(|err| {
            HarvestError::Internal(format!("cannot write {}: {}", path.display(), err))
        })?;
        tracing::info!(summary = %path.display(), "run summary written");

        if self.config.output.per_volume_json {
            for volume in &record.volumes {
                let body = serde_json::to_vec_pretty(volume)
                    .map_err(|err| HarvestError::Internal(err.to_string()))?;
                let path = dir.join(format!("{}.json", volume.archive_base));
                std::fs::write(&path, body).map_err(|err| {
                    HarvestError::Internal(format!("cannot write {}: {}", path.display(), err))
                })?;
            }
        }
        Ok(())
    }
}
