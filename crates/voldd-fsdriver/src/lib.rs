//! Check/mount/format facade for the filesystems [`voldd_fsprobe`] can
//! identify. Every driver shells out to an external tool via
//! `std::process::Command`; the [`FsDriver`] trait is the seam tests use
//! to substitute a fake that records invocations instead of spawning
//! anything (mirrors how `voldd-core` keeps its own OS dependencies behind
//! traits, §4.7).

pub mod exfat;
pub mod fake;
pub mod fat;
pub mod format;
pub mod mount_opts;
pub mod ntfs;

use std::path::Path;
use voldd_fsprobe::FsType;

bitflags::bitflags! {
    /// Mount flags common to FAT/exFAT/NTFS (§4.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MountFlags: u32 {
        const NODEV = 0x01;
        const NOSUID = 0x02;
        const DIRSYNC = 0x04;
        const NOEXEC = 0x08;
        const RDONLY = 0x10;
        const REMOUNT = 0x20;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Clean, or repaired in place without data loss.
    Ok,
    /// Driver reported a repair that warrants retrying the check once
    /// more before giving up (FAT exit codes 1/8).
    RepairedRetry,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with unexpected status {status}")]
    UnexpectedExit { tool: &'static str, status: i32 },
}

/// Mount request parameters shared across drivers.
#[derive(Debug, Clone)]
pub struct MountRequest<'a> {
    pub device: &'a Path,
    pub mount_point: &'a Path,
    pub uid: u32,
    pub gid: u32,
    pub fmask: u32,
    pub dmask: u32,
    pub read_only: bool,
    pub executable: bool,
    pub remount: bool,
    /// Forces fmask/dmask to 0; set when the world-writable override
    /// property is active.
    pub world_writable_override: bool,
}

pub trait FsDriver {
    fn fs_type(&self) -> FsType;

    /// Checks come back advisory for exFAT/NTFS (a failure is logged but
    /// never blocks mount, §4.2) and authoritative for FAT.
    fn check(&self, device: &Path) -> Result<CheckOutcome, DriverError>;

    fn mount(&self, request: &MountRequest<'_>) -> Result<(), DriverError>;

    /// `num_sectors` is informational (used to size the filesystem on
    /// whole-device formats); `whole_device` controls the MBR-erase +
    /// `BLKRRPART` bracketing (§4.2).
    fn format(
        &self,
        device: &Path,
        num_sectors: u64,
        whole_device: bool,
    ) -> Result<(), DriverError>;
}

/// SDXC size range (§4.2): devices in this range format to exFAT by
/// default, everything else to FAT.
const EXFAT_SIZE_RANGE: std::ops::RangeInclusive<u64> = 34_359_738_368..=2_199_023_255_552;

pub fn check_size(whole_device_bytes: u64) -> bool {
    EXFAT_SIZE_RANGE.contains(&whole_device_bytes)
}

pub fn driver_for(fs_type: FsType) -> Box<dyn FsDriver> {
    match fs_type {
        FsType::Fat => Box::new(fat::FatDriver),
        FsType::ExFat => Box::new(exfat::ExFatDriver),
        FsType::Ntfs => Box::new(ntfs::NtfsDriver),
        FsType::HfsPlus => panic!("HFS+ has no write driver (§4.2)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_size_selects_exfat_for_sdxc_range() {
        assert!(check_size(34_359_738_368));
        assert!(check_size(2_199_023_255_552));
        assert!(!check_size(34_359_738_367));
        assert!(!check_size(2_199_023_255_553));
    }
}
