// /////////////////////////////////////////////////////////////////////////////
// Diskharvest
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Mount Manager
//!
//! Scoped, defensive read-only mounts. Every recipe carries flags
//! equivalent to read-only plus `nodev,nosuid,noexec`; journaling
//! filesystems additionally get their no-replay option (`noload` for ext,
//! `norecovery` for xfs) so mounting never writes to the source media.
//!
//! ## Recipe table
//!
//! | fstype   | mechanism        | options |
//! |----------|------------------|---------|
//! | ext2/3/4 | native mount     | `ro,noload,nodev,nosuid,noexec` |
//! | xfs      | native mount     | `ro,norecovery,nodev,nosuid,noexec` |
//! | btrfs    | native mount     | `ro,nodev,nosuid,noexec` |
//! | ntfs     | ntfs-3g helper   | `ro,nodev,nosuid,noexec` |
//! | vfat     | native mount     | `ro,uid=0,gid=0,umask=022,nodev,nosuid,noexec` |
//! | exfat    | native mount     | `ro,nodev,nosuid,noexec` |
//! | hfs      | native (hfsprogs)| `ro,nodev,nosuid,noexec` |
//! | hfsplus  | native mount     | `ro,force,nodev,nosuid,noexec` |
//! | apfs     | apfs-fuse helper | `readonly` |
//! | zfs      | dataset mount    | `ro,nodev,nosuid,noexec` |
//!
//! A missing helper binary yields `HelperMissing` and the volume is failed
//! with that detail; there is no retry on mount refusal. Release is owned
//! by [`MountGuard`], which unmounts and removes the scratch mountpoint on
//! every exit path including panic unwind.

use std::path::{Path, PathBuf};

use diskharvest_domain::{HarvestError, Mounter, Volume};
use which::which;

use crate::infrastructure::exec::Shell;

/// How a filesystem gets mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountMechanism {
    /// `mount -t <fstype> -o <options> <device> <target>`
    Native { fstype: &'static str },
    /// `<helper> <device> <target> -o <options>`
    Helper { binary: &'static str },
}

/// One row of the recipe table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecipe {
    pub mechanism: MountMechanism,
    pub options: &'static str,
}

impl MountRecipe {
    /// Recipe for a filesystem type, or `None` when unmountable.
    pub fn for_fstype(fstype: &str) -> Option<Self> {
        let recipe = match fstype {
            "ext2" => Self::native("ext2", "ro,noload,nodev,nosuid,noexec"),
            "ext3" => Self::native("ext3", "ro,noload,nodev,nosuid,noexec"),
            "ext4" => Self::native("ext4", "ro,noload,nodev,nosuid,noexec"),
            "xfs" => Self::native("xfs", "ro,norecovery,nodev,nosuid,noexec"),
            "btrfs" => Self::native("btrfs", "ro,nodev,nosuid,noexec"),
            "ntfs" | "ntfs3" => Self {
                mechanism: MountMechanism::Helper { binary: "ntfs-3g" },
                options: "ro,nodev,nosuid,noexec",
            },
            "vfat" => Self::native("vfat", "ro,uid=0,gid=0,umask=022,nodev,nosuid,noexec"),
            "exfat" => Self::native("exfat", "ro,nodev,nosuid,noexec"),
            "hfs" => Self::native("hfs", "ro,nodev,nosuid,noexec"),
            "hfsplus" => Self::native("hfsplus", "ro,force,nodev,nosuid,noexec"),
            "apfs" => Self {
                mechanism: MountMechanism::Helper { binary: "apfs-fuse" },
                options: "readonly",
            },
            "zfs" | "zfs_member" => Self::native("zfs", "ro,nodev,nosuid,noexec"),
            _ => return None,
        };
        Some(recipe)
    }

    fn native(fstype: &'static str, options: &'static str) -> Self {
        Self {
            mechanism: MountMechanism::Native { fstype },
            options,
        }
    }

    /// The argv this recipe produces for one device/target pair.
    pub fn argv(&self, device: &str, target: &Path) -> Vec<String> {
        let target = target.to_string_lossy().into_owned();
        match &self.mechanism {
            MountMechanism::Native { fstype } => vec![
                "mount".to_string(),
                "-t".to_string(),
                fstype.to_string(),
                "-o".to_string(),
                self.options.to_string(),
                device.to_string(),
                target,
            ],
            MountMechanism::Helper { binary } => vec![
                binary.to_string(),
                device.to_string(),
                target,
                "-o".to_string(),
                self.options.to_string(),
            ],
        }
    }

    /// The binary that must exist in PATH for this recipe.
    pub fn required_binary(&self) -> &'static str {
        match &self.mechanism {
            MountMechanism::Native { .. } => "mount",
            MountMechanism::Helper { binary } => binary,
        }
    }
}

/// Production mounter: recipes through the shell executor.
pub struct HelperMounter {
    shell: Shell,
}

impl HelperMounter {
    pub fn new(shell: Shell) -> Self {
        Self { shell }
    }
}

impl Mounter for HelperMounter {
    fn mount(&self, volume: &Volume, target: &Path) -> Result<(), HarvestError> {
        let recipe = MountRecipe::for_fstype(&volume.fstype).ok_or_else(|| {
            HarvestError::Mount {
                device: volume.device.clone(),
                detail: format!("no mount recipe for fstype '{}'", volume.fstype),
            }
        })?;

        let binary = recipe.required_binary();
        if which(binary).is_err() {
            return Err(HarvestError::HelperMissing {
                helper: binary.to_string(),
            });
        }

        let argv = recipe.argv(&volume.device, target);
        tracing::info!(
            device = %volume.device,
            fstype = %volume.fstype,
            target = %target.display(),
            options = recipe.options,
            "mounting read-only"
        );
        self.shell
            .run_checked(argv)
            .map_err(|err| HarvestError::Mount {
                device: volume.device.clone(),
                detail: err.to_string(),
            })?;
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<(), HarvestError> {
        let target_str = target.to_string_lossy().into_owned();
        // One retry after a short pause covers the common transient EBUSY
        // from a straggling reader; anything else is surfaced.
        match self.shell.run_checked(["umount", target_str.as_str()]) {
            Ok(_) => Ok(()),
            Err(first) => {
                std::thread::sleep(std::time::Duration::from_secs(1));
                self.shell
                    .run_checked(["umount", target_str.as_str()])
                    .map(|_| ())
                    .map_err(|_| HarvestError::Mount {
                        device: target_str,
                        detail: format!("unmount failed: {}", first),
                    })
            }
        }
    }
}

/// Scoped mount: unmount and mountpoint removal on every exit path.
///
/// Constructed via [`MountGuard::acquire`], which creates the scratch
/// mountpoint (which must be empty), mounts the volume, and arms the
/// guard. `release()` surfaces unmount errors; the `Drop` path logs them.
pub struct MountGuard<'a> {
    mounter: &'a dyn Mounter,
    target: PathBuf,
    armed: bool,
}

impl std::fmt::Debug for MountGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountGuard")
            .field("target", &self.target)
            .field("armed", &self.armed)
            .finish()
    }
}

impl<'a> MountGuard<'a> {
    /// Create the mountpoint and mount the volume read-only onto it.
    pub fn acquire(
        mounter: &'a dyn Mounter,
        volume: &Volume,
        target: PathBuf,
    ) -> Result<Self, HarvestError> {
        std::fs::create_dir_all(&target).map_err(|err| HarvestError::Mount {
            device: volume.device.clone(),
            detail: format!("cannot create mountpoint {}: {}", target.display(), err),
        })?;
        let occupied = std::fs::read_dir(&target)
            .map_err(|err| HarvestError::Mount {
                device: volume.device.clone(),
                detail: format!("cannot inspect mountpoint {}: {}", target.display(), err),
            })?
            .next()
            .is_some();
        if occupied {
            return Err(HarvestError::Mount {
                device: volume.device.clone(),
                detail: format!("mountpoint {} is not empty", target.display()),
            });
        }

        if let Err(err) = mounter.mount(volume, &target) {
            let _ = std::fs::remove_dir(&target);
            return Err(err);
        }
        Ok(Self {
            mounter,
            target,
            armed: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.target
    }

    /// Explicit release: unmount, then remove the scratch mountpoint.
    pub fn release(mut self) -> Result<(), HarvestError> {
        self.armed = false;
        let result = self.mounter.unmount(&self.target);
        if let Err(err) = std::fs::remove_dir(&self.target) {
            tracing::warn!(
                target = %self.target.display(),
                error = %err,
                "could not remove scratch mountpoint"
            );
        }
        result
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Last line of defense on panic/cancel paths; errors can only be logged.
        if let Err(err) = self.mounter.unmount(&self.target) {
            tracing::error!(
                target = %self.target.display(),
                error = %err,
                "unmount failed during guard drop"
            );
        }
        let _ = std::fs::remove_dir(&self.target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskharvest_domain::VolumeStatus;
    use parking_lot::Mutex;

    #[test]
    fn test_recipe_flags_match_table() {
        let ext4 = MountRecipe::for_fstype("ext4").unwrap();
        assert_eq!(ext4.options, "ro,noload,nodev,nosuid,noexec");
        assert_eq!(ext4.required_binary(), "mount");

        let xfs = MountRecipe::for_fstype("xfs").unwrap();
        assert!(xfs.options.contains("norecovery"));

        let ntfs = MountRecipe::for_fstype("ntfs").unwrap();
        assert_eq!(ntfs.required_binary(), "ntfs-3g");

        let apfs = MountRecipe::for_fstype("apfs").unwrap();
        assert_eq!(apfs.options, "readonly");
        assert_eq!(apfs.required_binary(), "apfs-fuse");

        let vfat = MountRecipe::for_fstype("vfat").unwrap();
        assert!(vfat.options.contains("umask=022"));

        assert!(MountRecipe::for_fstype("minix").is_none());
    }

    #[test]
    fn test_native_argv_shape() {
        let recipe = MountRecipe::for_fstype("ext4").unwrap();
        let argv = recipe.argv("/dev/sdb1", Path::new("/run/dh/mnt/x"));
        assert_eq!(
            argv,
            vec![
                "mount",
                "-t",
                "ext4",
                "-o",
                "ro,noload,nodev,nosuid,noexec",
                "/dev/sdb1",
                "/run/dh/mnt/x"
            ]
        );
    }

    #[test]
    fn test_helper_argv_shape() {
        let recipe = MountRecipe::for_fstype("ntfs").unwrap();
        let argv = recipe.argv("/dev/sdb1", Path::new("/run/dh/mnt/x"));
        assert_eq!(argv[0], "ntfs-3g");
        assert_eq!(argv[1], "/dev/sdb1");
    }

    /// Mounter that records calls and never touches the kernel.
    struct RecordingMounter {
        calls: Mutex<Vec<String>>,
        fail_mount: bool,
    }

    impl Mounter for RecordingMounter {
        fn mount(&self, volume: &Volume, _target: &Path) -> Result<(), HarvestError> {
            if self.fail_mount {
                return Err(HarvestError::Mount {
                    device: volume.device.clone(),
                    detail: "refused".to_string(),
                });
            }
            self.calls.lock().push(format!("mount {}", volume.device));
            Ok(())
        }

        fn unmount(&self, target: &Path) -> Result<(), HarvestError> {
            self.calls.lock().push(format!("umount {}", target.display()));
            Ok(())
        }
    }

    fn test_volume() -> Volume {
        Volume {
            device: "/dev/sdb1".to_string(),
            disk_index: 1,
            part_index: 1,
            fstype: "ext4".to_string(),
            size: 1 << 30,
            archive_base: "x".to_string(),
            status: VolumeStatus::Selected,
        }
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mnt");
        let mounter = RecordingMounter {
            calls: Mutex::new(Vec::new()),
            fail_mount: false,
        };

        {
            let guard = MountGuard::acquire(&mounter, &test_volume(), target.clone()).unwrap();
            assert_eq!(guard.path(), target.as_path());
            // guard dropped here without release()
        }

        let calls = mounter.calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("mount"));
        assert!(calls[1].starts_with("umount"));
        assert!(!target.exists());
    }

    #[test]
    fn test_guard_explicit_release() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mnt");
        let mounter = RecordingMounter {
            calls: Mutex::new(Vec::new()),
            fail_mount: false,
        };

        let guard = MountGuard::acquire(&mounter, &test_volume(), target.clone()).unwrap();
        guard.release().unwrap();

        // Release already ran; drop must not double-unmount
        assert_eq!(mounter.calls.lock().len(), 2);
        assert!(!target.exists());
    }

    #[test]
    fn test_guard_rejects_occupied_mountpoint() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mnt");
        std::fs::create_dir_all(target.join("leftover")).unwrap();
        let mounter = RecordingMounter {
            calls: Mutex::new(Vec::new()),
            fail_mount: false,
        };

        let err = MountGuard::acquire(&mounter, &test_volume(), target).unwrap_err();
        assert!(matches!(err, HarvestError::Mount { .. }));
        assert!(mounter.calls.lock().is_empty());
    }

    #[test]
    fn test_mount_failure_leaves_no_guard() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("mnt");
        let mounter = RecordingMounter {
            calls: Mutex::new(Vec::new()),
            fail_mount: true,
        };

        let err = MountGuard::acquire(&mounter, &test_volume(), target.clone()).unwrap_err();
        assert!(matches!(err, HarvestError::Mount { .. }));
        assert!(mounter.calls.lock().is_empty());
        assert!(!target.exists());
    }
}
