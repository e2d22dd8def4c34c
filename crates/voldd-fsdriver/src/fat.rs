use crate::{mount_opts, CheckOutcome, DriverError, FsDriver, MountRequest};
use std::path::Path;
use std::process::Command;
use voldd_fsprobe::FsType;

pub struct FatDriver;

impl FsDriver for FatDriver {
    fn fs_type(&self) -> FsType {
        FsType::Fat
    }

    fn check(&self, device: &Path) -> Result<CheckOutcome, DriverError> {
        let status = Command::new("fsck.vfat")
            .arg("-p")
            .arg(device)
            .status()
            .map_err(|source| DriverError::Spawn { tool: "fsck.vfat", source })?;
        let outcome = match status.code() {
            Some(0) | Some(2) | Some(4) => CheckOutcome::Ok,
            Some(1) | Some(8) => CheckOutcome::RepairedRetry,
            _ => CheckOutcome::Failed,
        };
        log::debug!("fsck.vfat {} exited {:?} -> {outcome:?}", device.display(), status.code());
        Ok(outcome)
    }

    fn mount(&self, request: &MountRequest<'_>) -> Result<(), DriverError> {
        let opts = mount_opts::fat_like_opts(request);
        let flags = mount_opts::flags_for(request);
        log::info!(
            "mount vfat {} -> {} opts={opts} flags={flags:?}",
            request.device.display(),
            request.mount_point.display()
        );
        run_mount("vfat", request, &opts)
    }

    fn format(&self, device: &Path, num_sectors: u64, whole_device: bool) -> Result<(), DriverError> {
        super::format::format_whole_or_partition(device, "mkfs.vfat", num_sectors, whole_device)
    }
}

pub(crate) fn run_mount(
    fstype: &'static str,
    request: &MountRequest<'_>,
    opts: &str,
) -> Result<(), DriverError> {
    let status = Command::new("mount")
        .args(["-t", fstype, "-o", opts])
        .arg(request.device)
        .arg(request.mount_point)
        .status()
        .map_err(|source| DriverError::Spawn { tool: "mount", source })?;
    if status.success() {
        return Ok(());
    }
    if !request.read_only {
        log::warn!("initial mount failed, retrying read-only");
        let mut retry = request.clone();
        retry.read_only = true;
        let retry_opts = mount_opts::fat_like_opts(&retry);
        let status = Command::new("mount")
            .args(["-t", fstype, "-o", &retry_opts, "-r"])
            .arg(retry.device)
            .arg(retry.mount_point)
            .status()
            .map_err(|source| DriverError::Spawn { tool: "mount", source })?;
        if status.success() {
            return Ok(());
        }
    }
    Err(DriverError::UnexpectedExit {
        tool: "mount",
        status: status.code().unwrap_or(-1),
    })
}
