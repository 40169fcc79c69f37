// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Configuration Loading
//!
//! Strongly-typed TOML configuration with serde defaults per section.
//! Search order: the `--config` path, then `diskharvest.toml` next to the
//! executable, then `/etc/diskharvest.toml`. A missing file yields the
//! built-in defaults; a malformed or invalid file is fatal at startup
//! (exit code 2).
//!
//! ## Example
//!
//! ```toml
//! [server]
//! remote = "vault@archive.example.net:/srv/harvest"
//! credential = "/run/keys/harvest_ed25519"
//! port = 2222
//! bwlimit_kbps = 80000
//!
//! [archive]
//! compressor = "zstd"
//! level = 3
//! chunk_size_mb = 4096
//! spool_dir = "/var/tmp/diskharvest"
//! preserve_xattrs = true
//!
//! [discovery]
//! skip_if_encrypted = true
//! allow_lvm = true
//! allow_raid = true
//! min_partition_size_gb = 1
//! avoid_devices = ["/dev/sdz"]
//!
//! [filters]
//! max_file_size_mb = 2048
//!
//! [runtime]
//! workers = 0   # 0 = auto: max(1, min(8, cpus/2))
//!
//! [naming]
//! date_fmt = "%Y%m%d"
//! token_source = "machine-id"
//! pattern = "{date}-{token}-d{disk}p{part}"
//!
//! [integrity]
//! algorithm = "sha256"
//!
//! [output]
//! run_summary_dir = "/var/log/diskharvest"
//! per_volume_json = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use diskharvest_domain::{ChunkSize, HarvestError, HashAlgorithm, NamePattern};

/// Preferred compressor, before availability probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compressor {
    Zstd,
    Pigz,
}

impl std::fmt::Display for Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compressor::Zstd => write!(f, "zstd"),
            Compressor::Pigz => write!(f, "pigz"),
        }
    }
}

/// How the host token is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenSource {
    MachineId,
    Hostname,
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Remote target, `user@host:/base/path`. Empty disables shipping
    /// validation only for `--list`/`--dry-run`.
    pub remote: String,
    /// SSH identity file
    pub credential: Option<PathBuf>,
    pub port: u16,
    /// Optional bandwidth cap for the shipper
    pub bwlimit_kbps: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            remote: String::new(),
            credential: None,
            port: 22,
            bwlimit_kbps: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    pub compressor: Compressor,
    /// Compression level, 1-9
    pub level: u32,
    /// Chunk size in MiB; 0 disables chunking
    pub chunk_size_mb: u64,
    pub spool_dir: PathBuf,
    pub preserve_xattrs: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compressor: Compressor::Zstd,
            level: 3,
            chunk_size_mb: 4096,
            spool_dir: PathBuf::from("/var/tmp/diskharvest"),
            preserve_xattrs: true,
        }
    }
}

impl ArchiveConfig {
    pub fn chunk_size(&self) -> ChunkSize {
        ChunkSize::from_mib(self.chunk_size_mb)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Filesystem types eligible for capture
    pub include_fstypes: Vec<String>,
    /// Filesystem types always skipped
    pub skip_fstypes: Vec<String>,
    pub skip_if_encrypted: bool,
    pub allow_lvm: bool,
    pub allow_raid: bool,
    pub allow_zfs: bool,
    pub min_partition_size_gb: u64,
    pub avoid_devices: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            include_fstypes: [
                "ext2", "ext3", "ext4", "xfs", "btrfs", "ntfs", "vfat", "exfat", "hfs",
                "hfsplus", "apfs", "zfs",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            skip_fstypes: ["swap", "squashfs", "iso9660", "udf"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            skip_if_encrypted: true,
            allow_lvm: true,
            allow_raid: true,
            allow_zfs: true,
            min_partition_size_gb: 1,
            avoid_devices: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    pub fn min_partition_bytes(&self) -> u64 {
        self.min_partition_size_gb * 1024 * 1024 * 1024
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FiltersConfig {
    /// Files strictly larger than this are excluded from archives;
    /// 0 archives directory structure only
    pub max_file_size_mb: u64,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Worker count; 0 = auto
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamingConfig {
    pub date_fmt: String,
    pub token_source: TokenSource,
    pub pattern: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            date_fmt: "%Y%m%d".to_string(),
            token_source: TokenSource::MachineId,
            pattern: NamePattern::DEFAULT.to_string(),
        }
    }
}

impl NamingConfig {
    pub fn name_pattern(&self) -> NamePattern {
        NamePattern::new(self.pattern.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegrityConfig {
    pub algorithm: String,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            algorithm: "sha256".to_string(),
        }
    }
}

impl IntegrityConfig {
    pub fn hash_algorithm(&self) -> Result<HashAlgorithm, HarvestError> {
        HashAlgorithm::parse(&self.algorithm)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub run_summary_dir: PathBuf,
    pub per_volume_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_summary_dir: PathBuf::from("/var/log/diskharvest"),
            per_volume_json: false,
        }
    }
}

/// The whole configuration document. Immutable after load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub archive: ArchiveConfig,
    pub discovery: DiscoveryConfig,
    pub filters: FiltersConfig,
    pub runtime: RuntimeConfig,
    pub naming: NamingConfig,
    pub integrity: IntegrityConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Load from the search path and validate.
    ///
    /// Returns the config plus the path it came from (`None` when every
    /// candidate was absent and defaults apply).
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), HarvestError> {
        if let Some(path) = explicit {
            let config = Self::from_file(path)?;
            return Ok((config, Some(path.to_path_buf())));
        }

        for candidate in Self::search_paths() {
            if candidate.is_file() {
                let config = Self::from_file(&candidate)?;
                return Ok((config, Some(candidate)));
            }
        }

        let config = Config::default();
        config.validate()?;
        Ok((config, None))
    }

    /// The implicit search path, in precedence order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.to_path_buf()))
        {
            paths.push(dir.join("diskharvest.toml"));
        }
        paths.push(PathBuf::from("/etc/diskharvest.toml"));
        paths
    }

    /// Parse and validate one file.
    pub fn from_file(path: &Path) -> Result<Self, HarvestError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            HarvestError::Config(format!("cannot read {}: {}", path.display(), err))
        })?;
        let config: Config = toml::from_str(&raw).map_err(|err| {
            HarvestError::Config(format!("cannot parse {}: {}", path.display(), err))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Enforce the invariants the rest of the pipeline assumes.
    pub fn validate(&self) -> Result<(), HarvestError> {
        if !(1..=9).contains(&self.archive.level) {
            return Err(HarvestError::Config(format!(
                "archive.level must be 1-9, got {}",
                self.archive.level
            )));
        }
        if self.archive.chunk_size_mb > ChunkSize::MAX_MIB {
            return Err(HarvestError::Config(format!(
                "archive.chunk_size_mb must be at most {}",
                ChunkSize::MAX_MIB
            )));
        }
        if self.archive.spool_dir.as_os_str().is_empty() {
            return Err(HarvestError::Config(
                "archive.spool_dir must not be empty".to_string(),
            ));
        }
        if self.naming.pattern.trim().is_empty() {
            return Err(HarvestError::Config(
                "naming.pattern must not be empty".to_string(),
            ));
        }
        // chrono only reports bad format strings when they are rendered
        {
            use std::fmt::Write as _;
            let mut probe = String::new();
            if write!(probe, "{}", chrono::Utc::now().format(&self.naming.date_fmt)).is_err() {
                return Err(HarvestError::Config(format!(
                    "naming.date_fmt '{}' is not a valid date format",
                    self.naming.date_fmt
                )));
            }
        }
        self.integrity.hash_algorithm()?;
        Ok(())
    }

    /// Shipping requires a remote target; `--list` does not.
    pub fn require_remote(&self) -> Result<(), HarvestError> {
        if self.server.remote.trim().is_empty() {
            return Err(HarvestError::Config(
                "server.remote is required (user@host:/path)".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.archive.compressor, Compressor::Zstd);
        assert_eq!(config.archive.level, 3);
        assert_eq!(config.runtime.workers, 0);
        assert!(config.discovery.skip_if_encrypted);
        assert!(config.require_remote().is_err());
    }

    #[test]
    fn test_parse_full_document() {
        let toml_doc = r#"
            [server]
            remote = "vault@archive:/srv/harvest"
            port = 2222
            bwlimit_kbps = 50000

            [archive]
            compressor = "pigz"
            level = 6
            chunk_size_mb = 512
            spool_dir = "/mnt/spool"
            preserve_xattrs = false

            [discovery]
            skip_if_encrypted = false
            min_partition_size_gb = 256
            avoid_devices = ["/dev/sdz"]

            [filters]
            max_file_size_mb = 0

            [runtime]
            workers = 4

            [naming]
            date_fmt = "%Y-%m-%d"
            token_source = "random"
            pattern = "{date}_{token}"

            [integrity]
            algorithm = "sha256"

            [output]
            run_summary_dir = "/tmp/out"
            per_volume_json = true
        "#;
        let config: Config = toml::from_str(toml_doc).unwrap();
        config.validate().unwrap();
        assert_eq!(config.archive.compressor, Compressor::Pigz);
        assert_eq!(config.archive.chunk_size_mb, 512);
        assert_eq!(config.discovery.min_partition_size_gb, 256);
        assert_eq!(config.filters.max_file_size_mb, 0);
        assert_eq!(config.runtime.workers, 4);
        assert_eq!(config.naming.token_source, TokenSource::Random);
        assert!(config.output.per_volume_json);
        config.require_remote().unwrap();
    }

    #[test]
    fn test_level_out_of_range_rejected() {
        let config: Config = toml::from_str("[archive]\nlevel = 12\n").unwrap();
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let parsed: Result<Config, _> = toml::from_str("[archive]\ncompression = 3\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_bad_date_fmt_rejected() {
        let config: Config = toml::from_str("[naming]\ndate_fmt = \"%\"\n").unwrap();
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn test_bad_algorithm_rejected() {
        let config: Config = toml::from_str("[integrity]\nalgorithm = \"crc32\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nremote = \"a@b:/c\"").unwrap();
        let (config, origin) = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.remote, "a@b:/c");
        assert_eq!(origin.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/diskharvest.toml"))).unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[test]
    fn test_min_partition_bytes() {
        let discovery = DiscoveryConfig {
            min_partition_size_gb: 256,
            ..Default::default()
        };
        assert_eq!(discovery.min_partition_bytes(), 256 * (1 << 30));
    }
}
