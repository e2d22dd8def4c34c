use crate::{mount_opts, CheckOutcome, DriverError, FsDriver, MountRequest};
use std::path::Path;
use std::process::Command;
use voldd_fsprobe::FsType;

pub struct ExFatDriver;

impl FsDriver for ExFatDriver {
    fn fs_type(&self) -> FsType {
        FsType::ExFat
    }

    /// Advisory only: a nonzero exit is logged but never reported as
    /// `Failed` (§4.2 — exFAT's driver is trusted to be robust).
    fn check(&self, device: &Path) -> Result<CheckOutcome, DriverError> {
        let status = Command::new("fsck.exfat")
            .arg(device)
            .status()
            .map_err(|source| DriverError::Spawn { tool: "fsck.exfat", source })?;
        if !status.success() {
            log::warn!("fsck.exfat reported issues on {} (advisory only)", device.display());
        }
        Ok(CheckOutcome::Ok)
    }

    fn mount(&self, request: &MountRequest<'_>) -> Result<(), DriverError> {
        let opts = mount_opts::fat_like_opts(request);
        log::info!(
            "mount exfat {} -> {} opts={opts}",
            request.device.display(),
            request.mount_point.display()
        );
        crate::fat::run_mount("exfat", request, &opts)
    }

    fn format(&self, device: &Path, num_sectors: u64, whole_device: bool) -> Result<(), DriverError> {
        crate::format::format_whole_or_partition(device, "mkfs.exfat", num_sectors, whole_device)
    }
}
