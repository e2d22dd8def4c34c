use crate::{mount_opts, CheckOutcome, DriverError, FsDriver, MountRequest};
use std::path::Path;
use std::process::Command;
use voldd_fsprobe::FsType;

pub struct NtfsDriver;

impl FsDriver for NtfsDriver {
    fn fs_type(&self) -> FsType {
        FsType::Ntfs
    }

    /// Advisory only, same as exFAT (§4.2).
    fn check(&self, device: &Path) -> Result<CheckOutcome, DriverError> {
        let status = Command::new("ntfsfix")
            .arg(device)
            .status()
            .map_err(|source| DriverError::Spawn { tool: "ntfsfix", source })?;
        if !status.success() {
            log::warn!("ntfsfix reported issues on {} (advisory only)", device.display());
        }
        Ok(CheckOutcome::Ok)
    }

    fn mount(&self, request: &MountRequest<'_>) -> Result<(), DriverError> {
        let opts = mount_opts::ntfs_opts(request);
        log::info!(
            "mount ntfs-3g {} -> {} opts={opts}",
            request.device.display(),
            request.mount_point.display()
        );
        crate::fat::run_mount("ntfs-3g", request, &opts)
    }

    /// NTFS is check/mount-only in this daemon; there is no `mkntfs`
    /// invocation in the original driver set (§4.2 only lists FAT/exFAT
    /// as formattable).
    fn format(&self, _device: &Path, _num_sectors: u64, _whole_device: bool) -> Result<(), DriverError> {
        Err(DriverError::UnexpectedExit { tool: "mkntfs", status: -1 })
    }
}
