//! fstab parsing (supplemented from `original_source/main.cpp`'s
//! line-by-line `vold.fstab` reader — the distilled spec only described
//! the record shape, §6; this module adds an actual parser since it is
//! pure, local, and has no OS surface, unlike the netlink decoder or
//! command-listener socket, which stay external collaborators).
//!
//! Grammar, one record per line, `#`-comments and blank lines skipped:
//!
//! ```text
//! dev_mount  <label> <mount_point> <fs_type> <blk_device> [<blk_device2> ...] [flags...]
//! ```
//!
//! `mount_point` must literally be `"auto"`. Recognized flags:
//! `voldmanaged`, `nonremovable`, `encryptable`, `noemulatedsd`, `nofuse`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FstabFlags {
    pub voldmanaged: bool,
    pub nonremovable: bool,
    pub encryptable: bool,
    pub noemulatedsd: bool,
    pub nofuse: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabRecord {
    pub label: String,
    pub fs_type: String,
    pub blk_device: String,
    pub blk_device2: Vec<String>,
    pub flags: FstabFlags,
}

#[derive(Debug, PartialEq, Eq)]
pub struct FstabError {
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for FstabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fstab line {}: {}", self.line, self.reason)
    }
}

impl std::error::Error for FstabError {}

/// Parses an entire fstab file's contents into records, in file order.
pub fn parse(contents: &str) -> Result<Vec<FstabRecord>, FstabError> {
    let mut records = Vec::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        records.push(parse_line(line, line_no)?);
    }
    Ok(records)
}

fn parse_line(line: &str, line_no: usize) -> Result<FstabRecord, FstabError> {
    let mut tokens = line.split_whitespace();
    let keyword = tokens.next().ok_or_else(|| err(line_no, "empty record"))?;
    if keyword != "dev_mount" {
        return Err(err(line_no, format!("unrecognized record keyword {keyword:?}")));
    }

    let label = tokens
        .next()
        .ok_or_else(|| err(line_no, "missing label"))?
        .to_string();
    let mount_point = tokens.next().ok_or_else(|| err(line_no, "missing mount_point"))?;
    if mount_point != "auto" {
        return Err(err(
            line_no,
            format!("mount_point must be literally \"auto\", got {mount_point:?}"),
        ));
    }
    let fs_type = tokens
        .next()
        .ok_or_else(|| err(line_no, "missing fs_type"))?
        .to_string();
    let blk_device = tokens
        .next()
        .ok_or_else(|| err(line_no, "missing blk_device"))?
        .to_string();

    let mut blk_device2 = Vec::new();
    let mut flags = FstabFlags::default();
    for token in tokens {
        match token {
            "voldmanaged" => flags.voldmanaged = true,
            "nonremovable" => flags.nonremovable = true,
            "encryptable" => flags.encryptable = true,
            "noemulatedsd" => flags.noemulatedsd = true,
            "nofuse" => flags.nofuse = true,
            _ if token.starts_with('/') => blk_device2.push(token.to_string()),
            other => return Err(err(line_no, format!("unrecognized token {other:?}"))),
        }
    }

    Ok(FstabRecord { label, fs_type, blk_device, blk_device2, flags })
}

fn err(line: usize, reason: impl Into<String>) -> FstabError {
    FstabError { line, reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_record() {
        let records = parse("dev_mount sdcard auto vfat /devices/platform/soc/usb\n").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "sdcard");
        assert_eq!(records[0].blk_device, "/devices/platform/soc/usb");
        assert_eq!(records[0].flags, FstabFlags::default());
    }

    #[test]
    fn parses_flags_and_extra_sysfs_paths() {
        let records = parse(
            "dev_mount sdcard1 auto vfat /devices/soc/usb1 /devices/soc/usb2 voldmanaged nonremovable\n",
        )
        .unwrap();
        let record = &records[0];
        assert_eq!(record.blk_device2, vec!["/devices/soc/usb2".to_string()]);
        assert!(record.flags.voldmanaged);
        assert!(record.flags.nonremovable);
        assert!(!record.flags.encryptable);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let records = parse("# a comment\n\ndev_mount sdcard auto vfat /devices/soc/usb # trailing\n").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn rejects_mount_point_other_than_auto() {
        let err = parse("dev_mount sdcard /mnt/sdcard vfat /devices/soc/usb\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn rejects_unrecognized_flag_token() {
        let err = parse("dev_mount sdcard auto vfat /devices/soc/usb bogusflag\n").unwrap_err();
        assert!(err.reason.contains("bogusflag"));
    }
}
