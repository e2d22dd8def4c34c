//! An [`FsDriver`] that records invocations instead of spawning anything,
//! so `voldd-core`'s pipeline tests don't need real `mkfs`/`mount`
//! binaries on the test host.

use crate::{CheckOutcome, DriverError, FsDriver, MountRequest};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use voldd_fsprobe::FsType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Check { device: PathBuf },
    Mount { device: PathBuf, mount_point: PathBuf },
    Format { device: PathBuf, num_sectors: u64, whole_device: bool },
}

pub struct FakeDriver {
    fs_type: FsType,
    calls: Mutex<Vec<RecordedCall>>,
    pub check_result: CheckOutcome,
    pub fail_mount: bool,
    pub fail_format: bool,
}

impl FakeDriver {
    pub fn new(fs_type: FsType) -> Self {
        Self {
            fs_type,
            calls: Mutex::new(Vec::new()),
            check_result: CheckOutcome::Ok,
            fail_mount: false,
            fail_format: false,
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl FsDriver for FakeDriver {
    fn fs_type(&self) -> FsType {
        self.fs_type
    }

    fn check(&self, device: &Path) -> Result<CheckOutcome, DriverError> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall::Check { device: device.to_path_buf() });
        Ok(self.check_result)
    }

    fn mount(&self, request: &MountRequest<'_>) -> Result<(), DriverError> {
        self.calls.lock().unwrap().push(RecordedCall::Mount {
            device: request.device.to_path_buf(),
            mount_point: request.mount_point.to_path_buf(),
        });
        if self.fail_mount {
            return Err(DriverError::UnexpectedExit { tool: "mount", status: 32 });
        }
        Ok(())
    }

    fn format(&self, device: &Path, num_sectors: u64, whole_device: bool) -> Result<(), DriverError> {
        self.calls.lock().unwrap().push(RecordedCall::Format {
            device: device.to_path_buf(),
            num_sectors,
            whole_device,
        });
        if self.fail_format {
            return Err(DriverError::UnexpectedExit { tool: "mkfs", status: 1 });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_check_and_mount_calls() {
        let driver = FakeDriver::new(FsType::Fat);
        driver.check(Path::new("/dev/block/vold/8:1")).unwrap();
        let request = MountRequest {
            device: Path::new("/dev/block/vold/8:1"),
            mount_point: Path::new("/mnt/sdcard"),
            uid: 1000,
            gid: 1000,
            fmask: 0o711,
            dmask: 0o700,
            read_only: false,
            executable: false,
            remount: false,
            world_writable_override: false,
        };
        driver.mount(&request).unwrap();
        assert_eq!(driver.calls().len(), 2);
    }

    #[test]
    fn fail_mount_flag_surfaces_driver_error() {
        let driver = FakeDriver::new(FsType::Fat);
        let mut driver = driver;
        driver.fail_mount = true;
        let request = MountRequest {
            device: Path::new("/dev/block/vold/8:1"),
            mount_point: Path::new("/mnt/sdcard"),
            uid: 0,
            gid: 0,
            fmask: 0,
            dmask: 0,
            read_only: false,
            executable: false,
            remount: false,
            world_writable_override: false,
        };
        assert!(driver.mount(&request).is_err());
    }
}
