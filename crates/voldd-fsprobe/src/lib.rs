//! Filesystem identity probes.
//!
//! Each probe opens a block device read-only, seeks to a known offset, and
//! reads a small fixed-size header. A probe never treats "not this
//! filesystem" as an error: [`ProbeError`] is reserved for genuine I/O
//! failures and malformed data *after* a magic has already matched.

pub mod exfat;
pub mod fat;
pub mod hfsplus;
pub mod iso9660;
pub mod ntfs;

use std::io::{Read, Seek};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("I/O error reading filesystem header: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed {fs} header: {reason}")]
    Malformed { fs: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsType {
    HfsPlus,
    Ntfs,
    ExFat,
    Fat,
}

impl FsType {
    /// Matches `Filesystems::fsName` in the original daemon.
    pub fn name(&self) -> &'static str {
        match self {
            FsType::Fat => "VFAT",
            FsType::ExFat => "EXFAT",
            FsType::Ntfs => "NTFS",
            FsType::HfsPlus => "HFS+",
        }
    }

    /// HFS+ has no write driver in this workspace (§4.2); everything else
    /// can be checked/mounted/formatted by `voldd-fsdriver`.
    pub fn is_supported(&self) -> bool {
        !matches!(self, FsType::HfsPlus)
    }
}

/// Label/serial/size extracted from a matched filesystem. Fields are
/// optional because not every probe can cheaply fill every field from the
/// fixed header alone (exFAT defers this to an external tool entirely).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    pub label: Option<String>,
    pub serial: Option<u32>,
    pub size_bytes: Option<u64>,
}

/// Runs the detection chain in spec order: HFS+ -> NTFS -> exFAT -> FAT.
/// FAT is the unconditional fallback because FAT has no reliable magic
/// (mirrors `Filesystems::detect` in the original daemon, which always
/// returns success and defaults to FAT when nothing else matched).
pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<FsType, ProbeError> {
    if hfsplus::detect(reader)? {
        return Ok(FsType::HfsPlus);
    }
    if ntfs::detect(reader)? {
        return Ok(FsType::Ntfs);
    }
    if exfat::detect(reader)? {
        return Ok(FsType::ExFat);
    }
    Ok(FsType::Fat)
}

/// Reads label/serial/size for a filesystem already identified by
/// [`detect`]. exFAT has no in-process info extraction (§4.1 delegates it
/// to an external tool, see [`exfat::parse_tool_output`]) and HFS+ has
/// none at all since it is never mounted.
pub fn read_info<R: Read + Seek>(
    reader: &mut R,
    fs_type: FsType,
) -> Result<VolumeInfo, ProbeError> {
    match fs_type {
        FsType::Fat => fat::read_info(reader),
        FsType::Ntfs => ntfs::read_info(reader),
        FsType::ExFat => Err(ProbeError::Malformed {
            fs: "exFAT",
            reason: "info extraction requires external tool output, see exfat::parse_tool_output"
                .to_string(),
        }),
        FsType::HfsPlus => Err(ProbeError::Malformed {
            fs: "HFS+",
            reason: "unsupported filesystem, no info extraction".to_string(),
        }),
    }
}

pub(crate) fn read_at<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    buf: &mut [u8],
) -> std::io::Result<()> {
    reader.seek(std::io::SeekFrom::Start(offset))?;
    reader.read_exact(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn falls_back_to_fat_when_nothing_matches() {
        let mut data = vec![0u8; 4096];
        let fs = detect(&mut Cursor::new(&mut data)).unwrap();
        assert_eq!(fs, FsType::Fat);
    }

    #[test]
    fn detect_picks_hfsplus_over_fat_fallback() {
        let mut data = vec![0u8; 4096];
        data[1024..1028].copy_from_slice(b"H+\0\x04");
        let fs = detect(&mut Cursor::new(&mut data)).unwrap();
        assert_eq!(fs, FsType::HfsPlus);
    }
}
