// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Chunked Compressor
//!
//! The streaming heart of the pipeline:
//!
//! ```text
//! tar producer ──► compressor child (zstd|pigz) ──► hash tap ──► splitter
//!   (thread)          (external process)             (whole +      (part
//!                                                     per-chunk)    files)
//! ```
//!
//! The tar producer feeds the compressor's stdin from its own thread; the
//! worker thread consumes the compressor's stdout through the digest taps
//! and cuts it into fixed-size parts. Backpressure is the pipe itself: a
//! slow spool disk blocks the stdout read, which blocks the compressor,
//! which blocks the tar producer. Nothing buffers more than one read.
//!
//! ## Compressor selection
//!
//! The compressor runs as an external child so the per-worker thread
//! budget lands in a separate process and availability fallback is real:
//! the configured compressor is probed in PATH, zstd falls back to pigz,
//! and with neither installed the volume fails with `CompressorMissing`.
//!
//! ## Commit protocol
//!
//! A chunk is committed once its bytes are fsync'd and its `.sha256`
//! sidecar is on disk; the manifest is written last and fsync'd. On any
//! stage error the in-progress temp part is removed and committed chunks
//! stay behind for resume. On resume, a chunk whose freshly streamed
//! digest matches its existing sidecar is left untouched.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use chrono::Utc;
use diskharvest_bootstrap::CancellationToken;
use diskharvest_domain::{
    ArchiveStage, ChunkRecord, ChunkSize, HarvestError, HashAlgorithm, Manifest, StreamDigest,
};
use which::which;

use crate::infrastructure::archive::{ArchiveStats, ArchiveStreamer};
use crate::infrastructure::config::Compressor;
use crate::infrastructure::exec::spawn_capture;

const SPLIT_BUF: usize = 128 * 1024;

/// Fully resolved compressor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressorSpec {
    /// Name recorded in the manifest (`zstd`, `pigz`)
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    /// Part-file extension (`zst`, `gz`)
    pub extension: String,
}

impl CompressorSpec {
    pub fn zstd(level: u32, threads: usize) -> Self {
        Self {
            name: "zstd".to_string(),
            program: "zstd".to_string(),
            args: vec![
                "-q".to_string(),
                format!("-{}", level),
                format!("-T{}", threads),
                "-c".to_string(),
            ],
            extension: "zst".to_string(),
        }
    }

    pub fn pigz(level: u32, threads: usize) -> Self {
        Self {
            name: "pigz".to_string(),
            program: "pigz".to_string(),
            args: vec![
                format!("-{}", level),
                "-p".to_string(),
                threads.to_string(),
                "-c".to_string(),
            ],
            extension: "gz".to_string(),
        }
    }
}

/// Probe PATH and resolve the compressor to use.
///
/// Preference order: the configured compressor, then the other one. With
/// neither installed the volume cannot be archived at all.
pub fn select_compressor(
    preferred: Compressor,
    level: u32,
    threads: usize,
) -> Result<CompressorSpec, HarvestError> {
    let candidates = match preferred {
        Compressor::Zstd => [Compressor::Zstd, Compressor::Pigz],
        Compressor::Pigz => [Compressor::Pigz, Compressor::Zstd],
    };
    for candidate in candidates {
        let spec = match candidate {
            Compressor::Zstd => CompressorSpec::zstd(level, threads),
            Compressor::Pigz => CompressorSpec::pigz(level, threads),
        };
        if which(&spec.program).is_ok() {
            if candidate != preferred {
                tracing::warn!(
                    wanted = %preferred,
                    using = %spec.name,
                    "configured compressor not installed, falling back"
                );
            }
            return Ok(spec);
        }
    }
    Err(HarvestError::CompressorMissing)
}

/// Identity of the archive being produced; everything the manifest needs.
#[derive(Debug, Clone)]
pub struct ArchiveMeta {
    pub archive_base: String,
    pub source_device: String,
    pub fstype: String,
    pub volume_size: u64,
    pub chunk_size: ChunkSize,
    pub algorithm: HashAlgorithm,
    pub level: u32,
}

/// Result of a completed chunking pass.
#[derive(Debug)]
pub struct ChunkOutcome {
    pub manifest: Manifest,
    pub archive_stats: ArchiveStats,
    pub compressed_len: u64,
    /// Chunks whose bytes were already on disk from a previous run
    pub chunks_reused: u64,
}

/// One volume's archive -> compress -> split -> hash pass.
pub struct ChunkPipeline {
    spool_dir: PathBuf,
    meta: ArchiveMeta,
    spec: CompressorSpec,
    token: CancellationToken,
}

struct PartInProgress {
    file: std::fs::File,
    tmp_path: PathBuf,
    final_name: String,
    written: u64,
    digest: StreamDigest,
}

impl ChunkPipeline {
    pub fn new(
        spool_dir: PathBuf,
        meta: ArchiveMeta,
        spec: CompressorSpec,
        token: CancellationToken,
    ) -> Self {
        Self {
            spool_dir,
            meta,
            spec,
            token,
        }
    }

    /// Drive the full pass for one mounted volume.
    pub fn run(&self, streamer: ArchiveStreamer) -> Result<ChunkOutcome, HarvestError> {
        std::fs::create_dir_all(&self.spool_dir).map_err(|err| HarvestError::Archive {
            stage: ArchiveStage::Splitter,
            detail: format!("cannot create spool {}: {}", self.spool_dir.display(), err),
        })?;

        let result = self.run_inner(streamer);
        if result.is_err() {
            self.remove_temp_parts();
        }
        result
    }

    fn run_inner(&self, streamer: ArchiveStreamer) -> Result<ChunkOutcome, HarvestError> {
        let mut child = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| HarvestError::Archive {
                stage: ArchiveStage::Compressor,
                detail: format!("cannot spawn {}: {}", self.spec.program, err),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| HarvestError::Archive {
            stage: ArchiveStage::Compressor,
            detail: "compressor stdin unavailable".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| HarvestError::Archive {
            stage: ArchiveStage::Compressor,
            detail: "compressor stdout unavailable".to_string(),
        })?;
        let stderr_thread = spawn_capture(child.stderr.take());

        // Tar producer on its own thread; dropping the stdin handle inside
        // stream_to closes the pipe and lets the compressor finish.
        let producer = std::thread::spawn(move || streamer.stream_to(stdin));

        let split_result = self.split_stream(stdout, &mut child);

        let status = child.wait().map_err(|err| HarvestError::Archive {
            stage: ArchiveStage::Compressor,
            detail: err.to_string(),
        })?;
        let stderr = stderr_thread.join().unwrap_or_default();
        let producer_result = producer.join().map_err(|_| HarvestError::Archive {
            stage: ArchiveStage::TarProducer,
            detail: "tar producer panicked".to_string(),
        })?;

        // Error precedence: cancellation, then the compressor (a dead
        // compressor explains a tar EPIPE), then the producer.
        let (chunks, whole_digest, compressed_len, chunks_reused) = split_result?;
        if !status.success() {
            return Err(HarvestError::Archive {
                stage: ArchiveStage::Compressor,
                detail: format!(
                    "{} exited {}: {}",
                    self.spec.program,
                    status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }
        let archive_stats = producer_result?;

        let manifest = Manifest {
            archive_base: self.meta.archive_base.clone(),
            source_device: self.meta.source_device.clone(),
            fstype: self.meta.fstype.clone(),
            volume_size: self.meta.volume_size,
            compressor: self.spec.name.clone(),
            level: self.meta.level,
            chunk_size_mib: self.meta.chunk_size.mib(),
            hash_algorithm: self.meta.algorithm.to_string(),
            chunks,
            whole_stream_digest: whole_digest,
            created_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        self.write_trailers(&manifest)?;

        Ok(ChunkOutcome {
            manifest,
            archive_stats,
            compressed_len,
            chunks_reused,
        })
    }

    /// Consume the compressed stream: hash taps plus fixed-size splitting.
    #[allow(clippy::type_complexity)]
    fn split_stream(
        &self,
        mut stdout: impl Read,
        child: &mut Child,
    ) -> Result<(Vec<ChunkRecord>, String, u64, u64), HarvestError> {
        let chunk_bytes = self.meta.chunk_size.bytes();
        let mut whole = self.meta.algorithm.new_digest();
        let mut compressed_len = 0u64;
        let mut chunks: Vec<ChunkRecord> = Vec::new();
        let mut chunks_reused = 0u64;
        let mut current: Option<PartInProgress> = None;
        let mut buf = vec![0u8; SPLIT_BUF];

        loop {
            if self.token.is_cancelled() {
                let _ = child.kill();
                if let Some(part) = current.take() {
                    let _ = std::fs::remove_file(&part.tmp_path);
                }
                return Err(HarvestError::Cancelled);
            }

            let n = stdout.read(&mut buf).map_err(|err| HarvestError::Archive {
                stage: ArchiveStage::Splitter,
                detail: format!("reading compressed stream: {}", err),
            })?;
            if n == 0 {
                break;
            }
            whole.update(&buf[..n]);
            compressed_len += n as u64;

            let mut offset = 0usize;
            while offset < n {
                if current.is_none() {
                    current = Some(self.open_part(chunks.len() as u64 + 1)?);
                }
                let part = current
                    .as_mut()
                    .ok_or_else(|| HarvestError::Internal("no open part".to_string()))?;

                let take = match chunk_bytes {
                    Some(cb) => ((cb - part.written) as usize).min(n - offset),
                    None => n - offset,
                };
                part.file
                    .write_all(&buf[offset..offset + take])
                    .map_err(|err| HarvestError::Archive {
                        stage: ArchiveStage::Splitter,
                        detail: format!("writing {}: {}", part.final_name, err),
                    })?;
                part.digest.update(&buf[offset..offset + take]);
                part.written += take as u64;
                offset += take;

                if chunk_bytes.is_some_and(|cb| part.written == cb) {
                    let part = current.take().ok_or_else(|| {
                        HarvestError::Internal("no open part at boundary".to_string())
                    })?;
                    let (record, reused) = self.commit_part(part)?;
                    chunks_reused += u64::from(reused);
                    chunks.push(record);
                }
            }
        }

        // Final short part, or a single empty part for an empty stream.
        if current.is_none() && chunks.is_empty() {
            current = Some(self.open_part(1)?);
        }
        if let Some(part) = current.take() {
            let (record, reused) = self.commit_part(part)?;
            chunks_reused += u64::from(reused);
            chunks.push(record);
        }

        Ok((chunks, whole.finalize_hex(), compressed_len, chunks_reused))
    }

    fn open_part(&self, ordinal: u64) -> Result<PartInProgress, HarvestError> {
        let final_name =
            Manifest::part_file_name(&self.meta.archive_base, &self.spec.extension, ordinal);
        let tmp_path = self.spool_dir.join(format!("{}.tmp", final_name));
        let file = std::fs::File::create(&tmp_path).map_err(|err| HarvestError::Archive {
            stage: ArchiveStage::Splitter,
            detail: format!("cannot create {}: {}", tmp_path.display(), err),
        })?;
        Ok(PartInProgress {
            file,
            tmp_path,
            final_name,
            written: 0,
            digest: self.meta.algorithm.new_digest(),
        })
    }

    /// Commit one part: fsync, then either keep the identical chunk from a
    /// previous run or move the fresh bytes into place with their sidecar.
    fn commit_part(&self, part: PartInProgress) -> Result<(ChunkRecord, bool), HarvestError> {
        part.file.sync_all().map_err(|err| HarvestError::Archive {
            stage: ArchiveStage::Splitter,
            detail: format!("fsync {}: {}", part.final_name, err),
        })?;
        drop(part.file);

        let digest = part.digest.finalize_hex();
        let final_path = self.spool_dir.join(&part.final_name);
        let sidecar_path = self.sidecar_path(&part.final_name);

        let reused = final_path.is_file()
            && std::fs::read_to_string(&sidecar_path)
                .ok()
                .and_then(|body| body.split_whitespace().next().map(str::to_string))
                .is_some_and(|existing| existing == digest);

        if reused {
            tracing::debug!(chunk = %part.final_name, "identical committed chunk found, keeping it");
            std::fs::remove_file(&part.tmp_path).map_err(|err| HarvestError::Archive {
                stage: ArchiveStage::Splitter,
                detail: format!("removing {}: {}", part.tmp_path.display(), err),
            })?;
        } else {
            std::fs::rename(&part.tmp_path, &final_path).map_err(|err| {
                HarvestError::Archive {
                    stage: ArchiveStage::Splitter,
                    detail: format!("committing {}: {}", part.final_name, err),
                }
            })?;
            self.write_synced(
                &sidecar_path,
                format!("{}  {}\n", digest, part.final_name).as_bytes(),
                ArchiveStage::Digest,
            )?;
        }

        tracing::debug!(
            chunk = %part.final_name,
            length = part.written,
            reused,
            "chunk committed"
        );
        Ok((
            ChunkRecord {
                file_name: part.final_name,
                length: part.written,
                digest,
            },
            reused,
        ))
    }

    /// `.parts`, `.whole.sha256`, and the manifest, in that order.
    fn write_trailers(&self, manifest: &Manifest) -> Result<(), HarvestError> {
        self.write_synced(
            &self.spool_dir.join(Manifest::PARTS_FILE_NAME),
            manifest.parts_file_body().as_bytes(),
            ArchiveStage::Digest,
        )?;
        self.write_synced(
            &self.spool_dir.join(Manifest::WHOLE_DIGEST_FILE_NAME),
            format!("{}\n", manifest.whole_stream_digest).as_bytes(),
            ArchiveStage::Digest,
        )?;
        let body = serde_json::to_vec_pretty(manifest).map_err(|err| HarvestError::Archive {
            stage: ArchiveStage::Manifest,
            detail: err.to_string(),
        })?;
        self.write_synced(
            &self.spool_dir.join(Manifest::FILE_NAME),
            &body,
            ArchiveStage::Manifest,
        )
    }

    fn write_synced(
        &self,
        path: &Path,
        bytes: &[u8],
        stage: ArchiveStage,
    ) -> Result<(), HarvestError> {
        let map_err = |err: std::io::Error| HarvestError::Archive {
            stage,
            detail: format!("{}: {}", path.display(), err),
        };
        let mut file = std::fs::File::create(path).map_err(map_err)?;
        file.write_all(bytes).map_err(map_err)?;
        file.sync_all().map_err(map_err)
    }

    fn sidecar_path(&self, part_name: &str) -> PathBuf {
        self.spool_dir.join(format!(
            "{}.{}",
            part_name,
            self.meta.algorithm.sidecar_extension()
        ))
    }

    fn remove_temp_parts(&self) {
        if let Ok(entries) = std::fs::read_dir(&self.spool_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.ends_with(".tmp") {
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn passthrough_spec() -> CompressorSpec {
        // `cat` stands in for the compressor: the splitter and commit
        // protocol see exactly the tar producer's bytes.
        CompressorSpec {
            name: "cat".to_string(),
            program: "cat".to_string(),
            args: Vec::new(),
            extension: "raw".to_string(),
        }
    }

    fn meta(chunk_mib: u64) -> ArchiveMeta {
        ArchiveMeta {
            archive_base: "base".to_string(),
            source_device: "/dev/sdb1".to_string(),
            fstype: "ext4".to_string(),
            volume_size: 1 << 30,
            chunk_size: ChunkSize::from_mib(chunk_mib),
            algorithm: HashAlgorithm::Sha256,
            level: 3,
        }
    }

    fn source_tree(total_bytes: usize) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..total_bytes).map(|i| (i % 251) as u8).collect();
        std::fs::write(dir.path().join("payload.bin"), payload).unwrap();
        dir
    }

    fn run_pipeline(
        spool: &Path,
        source: &Path,
        chunk_mib: u64,
    ) -> Result<ChunkOutcome, HarvestError> {
        let pipeline = ChunkPipeline::new(
            spool.to_path_buf(),
            meta(chunk_mib),
            passthrough_spec(),
            CancellationToken::never(),
        );
        let streamer = ArchiveStreamer::new(source.to_path_buf(), 1024, false);
        pipeline.run(streamer)
    }

    #[test]
    fn test_splits_at_exact_boundaries() {
        let source = source_tree(3 * MIB as usize);
        let spool = tempfile::tempdir().unwrap();

        let outcome = run_pipeline(spool.path(), source.path(), 1).unwrap();
        let manifest = &outcome.manifest;

        // tar overhead pushes a 3 MiB payload past three 1 MiB parts
        assert_eq!(manifest.chunks.len() as u64, 4);
        assert!(manifest.is_contiguous());
        for chunk in &manifest.chunks[..manifest.chunks.len() - 1] {
            assert_eq!(chunk.length, MIB);
        }
        let last = manifest.chunks.last().unwrap();
        assert!(last.length > 0 && last.length < MIB);
        assert_eq!(manifest.compressed_len(), outcome.compressed_len);
        assert_eq!(manifest.compressor, "cat");
    }

    #[test]
    fn test_whole_digest_equals_concatenation_and_sidecars_match() {
        let source = source_tree(2 * MIB as usize + 4096);
        let spool = tempfile::tempdir().unwrap();

        let outcome = run_pipeline(spool.path(), source.path(), 1).unwrap();
        let manifest = &outcome.manifest;

        let mut concatenated = Vec::new();
        for chunk in &manifest.chunks {
            let bytes = std::fs::read(spool.path().join(&chunk.file_name)).unwrap();
            assert_eq!(bytes.len() as u64, chunk.length);
            // Sidecar digest equals the chunk file digest
            assert_eq!(HashAlgorithm::Sha256.digest_hex(&bytes), chunk.digest);
            let sidecar = std::fs::read_to_string(
                spool.path().join(format!("{}.sha256", chunk.file_name)),
            )
            .unwrap();
            assert!(sidecar.starts_with(&chunk.digest));
            concatenated.extend_from_slice(&bytes);
        }
        assert_eq!(
            HashAlgorithm::Sha256.digest_hex(&concatenated),
            manifest.whole_stream_digest
        );
    }

    #[test]
    fn test_unchunked_yields_single_part() {
        let source = source_tree(2 * MIB as usize);
        let spool = tempfile::tempdir().unwrap();

        let outcome = run_pipeline(spool.path(), source.path(), 0).unwrap();
        assert_eq!(outcome.manifest.chunks.len(), 1);
        assert_eq!(
            outcome.manifest.chunks[0].file_name,
            "base.tar.raw.part0001"
        );
        assert_eq!(outcome.manifest.chunks[0].length, outcome.compressed_len);
    }

    #[test]
    fn test_trailer_files_written() {
        let source = source_tree(MIB as usize);
        let spool = tempfile::tempdir().unwrap();

        let outcome = run_pipeline(spool.path(), source.path(), 1).unwrap();

        let parts = std::fs::read_to_string(spool.path().join(".parts")).unwrap();
        let listed: Vec<&str> = parts.lines().collect();
        let expected: Vec<String> = outcome
            .manifest
            .chunks
            .iter()
            .map(|c| c.file_name.clone())
            .collect();
        assert_eq!(listed, expected);

        let whole = std::fs::read_to_string(spool.path().join(".whole.sha256")).unwrap();
        assert_eq!(whole.trim(), outcome.manifest.whole_stream_digest);

        let manifest_body =
            std::fs::read_to_string(spool.path().join(".manifest.json")).unwrap();
        let reparsed: Manifest = serde_json::from_str(&manifest_body).unwrap();
        assert_eq!(reparsed, outcome.manifest);
    }

    #[test]
    fn test_resume_reuses_committed_chunks() {
        let source = source_tree(2 * MIB as usize + 1000);
        let spool = tempfile::tempdir().unwrap();

        let first = run_pipeline(spool.path(), source.path(), 1).unwrap();
        assert_eq!(first.chunks_reused, 0);

        let second = run_pipeline(spool.path(), source.path(), 1).unwrap();
        assert_eq!(second.chunks_reused, second.manifest.chunks.len() as u64);
        assert_eq!(second.manifest.chunks, first.manifest.chunks);
        assert_eq!(
            second.manifest.whole_stream_digest,
            first.manifest.whole_stream_digest
        );
    }

    #[test]
    fn test_corrupt_committed_chunk_is_rewritten() {
        let source = source_tree(2 * MIB as usize + 1000);
        let spool = tempfile::tempdir().unwrap();

        let first = run_pipeline(spool.path(), source.path(), 1).unwrap();
        let victim = &first.manifest.chunks[1].file_name;
        std::fs::write(spool.path().join(victim), b"corrupted").unwrap();

        let second = run_pipeline(spool.path(), source.path(), 1).unwrap();
        assert_eq!(
            second.chunks_reused,
            second.manifest.chunks.len() as u64 - 1
        );
        let restored = std::fs::read(spool.path().join(victim)).unwrap();
        assert_eq!(
            HashAlgorithm::Sha256.digest_hex(&restored),
            first.manifest.chunks[1].digest
        );
    }

    #[test]
    fn test_missing_compressor_fails_pipeline() {
        let source = source_tree(1024);
        let spool = tempfile::tempdir().unwrap();
        let pipeline = ChunkPipeline::new(
            spool.path().to_path_buf(),
            meta(1),
            CompressorSpec {
                name: "missing".to_string(),
                program: "/nonexistent/compressor".to_string(),
                args: Vec::new(),
                extension: "x".to_string(),
            },
            CancellationToken::never(),
        );
        let streamer = ArchiveStreamer::new(source.path().to_path_buf(), 1024, false);
        let err = pipeline.run(streamer).unwrap_err();
        assert!(matches!(
            err,
            HarvestError::Archive {
                stage: ArchiveStage::Compressor,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_compressor_leaves_no_temp_parts() {
        let source = source_tree(MIB as usize);
        let spool = tempfile::tempdir().unwrap();
        let pipeline = ChunkPipeline::new(
            spool.path().to_path_buf(),
            meta(1),
            CompressorSpec {
                name: "false".to_string(),
                program: "false".to_string(),
                args: Vec::new(),
                extension: "x".to_string(),
            },
            CancellationToken::never(),
        );
        let streamer = ArchiveStreamer::new(source.path().to_path_buf(), 1024, false);
        assert!(pipeline.run(streamer).is_err());

        let leftovers: Vec<String> = std::fs::read_dir(spool.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_cancellation_aborts_and_discards_partial() {
        let source = source_tree(MIB as usize);
        let spool = tempfile::tempdir().unwrap();
        let token = CancellationToken::never();
        token.cancel();

        let pipeline = ChunkPipeline::new(
            spool.path().to_path_buf(),
            meta(1),
            passthrough_spec(),
            token,
        );
        let streamer = ArchiveStreamer::new(source.path().to_path_buf(), 1024, false);
        let err = pipeline.run(streamer).unwrap_err();
        assert!(matches!(err, HarvestError::Cancelled));
        assert!(!spool.path().join(".manifest.json").exists());
    }

    #[test]
    fn test_select_compressor_falls_back() {
        // `cat` is irrelevant here; this exercises the probe order using
        // binaries guaranteed present/absent. When zstd is absent on the
        // test host and pigz is too, selection must fail.
        match select_compressor(Compressor::Zstd, 3, 2) {
            Ok(spec) => assert!(spec.name == "zstd" || spec.name == "pigz"),
            Err(err) => assert!(matches!(err, HarvestError::CompressorMissing)),
        }
    }
}
