// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Archive Streamer
//!
//! Produces a tar stream of a mounted subtree into any `Write` sink - in
//! production that sink is the compressor child's stdin, in tests a plain
//! buffer. The streamer only archives; compression, hashing, and splitting
//! belong to the chunk pipeline downstream.
//!
//! ## Rules
//!
//! - Files strictly larger than the configured limit are excluded, but
//!   their parent directories are retained so structure is preserved.
//!   A limit of zero archives directory structure only.
//! - Traversal never crosses a filesystem boundary below the mount root
//!   (`st_dev` change): pseudo-filesystems are pruned wholesale.
//! - Symlinks are stored as links, never followed.
//! - With `preserve_xattrs`, extended attributes (including POSIX ACLs,
//!   which live in `system.posix_acl_*`) are emitted as PAX
//!   `SCHILY.xattr.*` records ahead of each entry; failure to read them is
//!   logged and counted, never fatal.
//! - Sparse files are stored as regular data; zstd collapses zero runs
//!   downstream, and archive portability wins over sparse maps.

use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use diskharvest_domain::{ArchiveStage, HarvestError};
use walkdir::WalkDir;

/// Counters surfaced into the volume's run-record entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files_archived: u64,
    pub files_excluded: u64,
    pub dirs_archived: u64,
    pub symlinks_archived: u64,
    /// Bytes of file content read from the mounted filesystem
    pub bytes_read: u64,
    pub xattr_failures: u64,
}

/// Streams one mounted tree as a tar archive.
pub struct ArchiveStreamer {
    root: PathBuf,
    /// Inclusive upper bound on archived file size; `None` excludes all files
    max_file_bytes: Option<u64>,
    preserve_xattrs: bool,
}

impl ArchiveStreamer {
    /// `max_file_size_mb == 0` means directory structure only.
    pub fn new(root: PathBuf, max_file_size_mb: u64, preserve_xattrs: bool) -> Self {
        Self {
            root,
            max_file_bytes: if max_file_size_mb == 0 {
                None
            } else {
                Some(max_file_size_mb * 1024 * 1024)
            },
            preserve_xattrs,
        }
    }

    /// Write the complete tar stream into `sink`.
    pub fn stream_to<W: Write>(&self, sink: W) -> Result<ArchiveStats, HarvestError> {
        let mut stats = ArchiveStats::default();
        let root_dev = std::fs::metadata(&self.root)
            .map_err(|err| tar_error(format!("cannot stat {}: {}", self.root.display(), err)))?
            .dev();

        let mut builder = tar::Builder::new(sink);
        builder.follow_symlinks(false);

        let mut walker = WalkDir::new(&self.root).follow_links(false).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    // Unreadable directory entries are logged and skipped;
                    // a live filesystem may mutate under us.
                    tracing::warn!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }

            let path = entry.path();
            let rel = path
                .strip_prefix(&self.root)
                .map_err(|err| tar_error(err.to_string()))?;
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "cannot stat, skipping");
                    continue;
                }
            };

            if meta.is_dir() {
                if meta.dev() != root_dev {
                    tracing::debug!(path = %path.display(), "pruning foreign filesystem subtree");
                    walker.skip_current_dir();
                    continue;
                }
                self.append_xattrs(&mut builder, path, rel, &mut stats)?;
                builder
                    .append_dir(rel, path)
                    .map_err(|err| tar_error(format!("{}: {}", rel.display(), err)))?;
                stats.dirs_archived += 1;
            } else if meta.file_type().is_symlink() {
                self.append_symlink(&mut builder, path, rel, &meta)?;
                stats.symlinks_archived += 1;
            } else if meta.is_file() {
                let include = self
                    .max_file_bytes
                    .is_some_and(|limit| meta.len() <= limit);
                if !include {
                    stats.files_excluded += 1;
                    continue;
                }
                self.append_xattrs(&mut builder, path, rel, &mut stats)?;
                let mut file = match std::fs::File::open(path) {
                    Ok(file) => file,
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "cannot open, skipping");
                        stats.files_excluded += 1;
                        continue;
                    }
                };
                builder
                    .append_file(rel, &mut file)
                    .map_err(|err| tar_error(format!("{}: {}", rel.display(), err)))?;
                stats.files_archived += 1;
                stats.bytes_read += meta.len();
            }
            // Sockets, fifos, and device nodes are not archived.
        }

        let sink = builder
            .into_inner()
            .map_err(|err| tar_error(format!("finalizing archive: {}", err)))?;
        drop(sink);
        Ok(stats)
    }

    fn append_symlink<W: Write>(
        &self,
        builder: &mut tar::Builder<W>,
        path: &Path,
        rel: &Path,
        meta: &std::fs::Metadata,
    ) -> Result<(), HarvestError> {
        let link_target = std::fs::read_link(path)
            .map_err(|err| tar_error(format!("{}: {}", rel.display(), err)))?;
        let mut header = tar::Header::new_gnu();
        header.set_metadata(meta);
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        builder
            .append_link(&mut header, rel, &link_target)
            .map_err(|err| tar_error(format!("{}: {}", rel.display(), err)))
    }

    /// Emit a PAX extended header with the entry's xattrs, if any.
    fn append_xattrs<W: Write>(
        &self,
        builder: &mut tar::Builder<W>,
        path: &Path,
        rel: &Path,
        stats: &mut ArchiveStats,
    ) -> Result<(), HarvestError> {
        if !self.preserve_xattrs {
            return Ok(());
        }
        let names = match xattr::list(path) {
            Ok(names) => names,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "xattr list failed");
                stats.xattr_failures += 1;
                return Ok(());
            }
        };

        let mut records = Vec::new();
        for name in names {
            let key = name.to_string_lossy().into_owned();
            match xattr::get(path, &name) {
                Ok(Some(value)) => {
                    records.extend_from_slice(&pax_record(
                        &format!("SCHILY.xattr.{}", key),
                        &value,
                    ));
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(path = %path.display(), xattr = %key, error = %err, "xattr read failed");
                    stats.xattr_failures += 1;
                }
            }
        }
        if records.is_empty() {
            return Ok(());
        }

        let mut header = tar::Header::new_ustar();
        header.set_entry_type(tar::EntryType::XHeader);
        header.set_mode(0o644);
        header.set_size(records.len() as u64);
        builder
            .append_data(
                &mut header,
                Path::new("PaxHeaders").join(rel),
                records.as_slice(),
            )
            .map_err(|err| tar_error(format!("pax header for {}: {}", rel.display(), err)))
    }
}

fn tar_error(detail: String) -> HarvestError {
    HarvestError::Archive {
        stage: ArchiveStage::TarProducer,
        detail,
    }
}

/// One PAX record: `"<len> <key>=<value>\n"` where `len` counts the whole
/// record including its own digits.
fn pax_record(key: &str, value: &[u8]) -> Vec<u8> {
    let base = 1 + key.len() + 1 + value.len() + 1;
    let mut total = base + 1;
    loop {
        let digits = total.to_string().len();
        if digits + base == total {
            break;
        }
        total = digits + base;
    }

    let mut record = Vec::with_capacity(total);
    record.extend_from_slice(total.to_string().as_bytes());
    record.push(b' ');
    record.extend_from_slice(key.as_bytes());
    record.push(b'=');
    record.extend_from_slice(value);
    record.push(b'\n');
    record
}
