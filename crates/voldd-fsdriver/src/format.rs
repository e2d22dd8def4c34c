//! Shared whole-device/partition format sequencing (§4.2): whole-device
//! format erases the MBR and forces two partition re-reads via
//! `BLKRRPART` around the actual `mkfs` invocation; partition-level
//! format skips the MBR step entirely.

use crate::DriverError;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::process::Command;

const MBR_SIZE: usize = 512;

pub fn format_whole_or_partition(
    device: &Path,
    mkfs_tool: &'static str,
    num_sectors: u64,
    whole_device: bool,
) -> Result<(), DriverError> {
    if whole_device {
        erase_mbr(device)?;
        reread_partition_table(device)?;
    }

    let status = Command::new(mkfs_tool)
        .arg(device)
        .arg(num_sectors.to_string())
        .status()
        .map_err(|source| DriverError::Spawn { tool: mkfs_tool, source })?;
    if !status.success() {
        return Err(DriverError::UnexpectedExit {
            tool: mkfs_tool,
            status: status.code().unwrap_or(-1),
        });
    }

    if whole_device {
        reread_partition_table(device)?;
    }
    Ok(())
}

fn erase_mbr(device: &Path) -> Result<(), DriverError> {
    log::info!("erasing MBR on {}", device.display());
    let mut file = OpenOptions::new()
        .write(true)
        .open(device)
        .map_err(|source| DriverError::Spawn { tool: "open(device)", source })?;
    file.write_all(&[0u8; MBR_SIZE])
        .map_err(|source| DriverError::Spawn { tool: "write(device)", source })?;
    Ok(())
}

fn reread_partition_table(device: &Path) -> Result<(), DriverError> {
    log::debug!("BLKRRPART on {}", device.display());
    let status = Command::new("blockdev")
        .arg("--rereadpt")
        .arg(device)
        .status()
        .map_err(|source| DriverError::Spawn { tool: "blockdev", source })?;
    if !status.success() {
        return Err(DriverError::UnexpectedExit {
            tool: "blockdev",
            status: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}
