//! exFAT probe. Matching the superblock is cheap and done in-process;
//! label/serial/size extraction is delegated to an external tool (`blkid`
//! or similar) whose output we only parse here — spawning the process is
//! `voldd-fsdriver`'s job, not this crate's.

use crate::{read_at, ProbeError, VolumeInfo};
use std::io::{Read, Seek};

const MAGIC_OFFSET: u64 = 3;
const MAGIC: &[u8; 8] = b"EXFAT   ";
/// Accepted alongside the canonical magic: a known-corrupt variant seen in
/// the wild, matched at offset 0 rather than 3.
const CORRUPT_MAGIC_OFFSET: u64 = 0;
const CORRUPT_MAGIC: &[u8; 11] = b"RRaAXFAT   ";

pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<bool, ProbeError> {
    let mut magic = [0u8; 8];
    read_at(reader, MAGIC_OFFSET, &mut magic)?;
    if &magic == MAGIC {
        log::trace!("exFAT probe: canonical magic matched");
        return Ok(true);
    }
    let mut corrupt = [0u8; 11];
    read_at(reader, CORRUPT_MAGIC_OFFSET, &mut corrupt)?;
    let matched = &corrupt == CORRUPT_MAGIC;
    log::trace!("exFAT probe: corrupt-variant magic matched={matched}");
    Ok(matched)
}

/// Parses the three lines of interest out of an external tool's text
/// output. Any missing/malformed line is fatal — there is no sensible
/// fallback once we already know the device is exFAT.
pub fn parse_tool_output(output: &str) -> Result<VolumeInfo, ProbeError> {
    let label = find_line(output, "\tVolume name: \"")
        .map(|rest| rest.trim_end_matches('"').to_string())
        .ok_or_else(|| malformed("missing \"Volume name\" line"))?;

    let serial_line = find_line(output, "\tVolume serial number: ")
        .ok_or_else(|| malformed("missing \"Volume serial number\" line"))?;
    let serial = u32::from_str_radix(&serial_line.replace('-', ""), 16)
        .map_err(|_| malformed("unparseable volume serial number"))?;

    let length_line = find_line(output, "\tVolume length: ")
        .ok_or_else(|| malformed("missing \"Volume length\" line"))?;
    let bytes_part = length_line
        .split('(')
        .nth(1)
        .and_then(|s| s.strip_suffix(" bytes)"))
        .ok_or_else(|| malformed("unparseable volume length"))?;
    let size_bytes = bytes_part
        .parse::<u64>()
        .map_err(|_| malformed("unparseable volume length"))?;

    Ok(VolumeInfo {
        label: Some(voldd_common::str::space_to_underscore(&label)).filter(|l| !l.is_empty()),
        serial: Some(serial),
        size_bytes: Some(size_bytes),
    })
}

fn find_line<'a>(output: &'a str, prefix: &str) -> Option<&'a str> {
    output.lines().find_map(|line| line.strip_prefix(prefix))
}

fn malformed(reason: &str) -> ProbeError {
    ProbeError::Malformed {
        fs: "exFAT",
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn detects_canonical_magic() {
        let mut img = vec![0u8; 512];
        img[3..11].copy_from_slice(b"EXFAT   ");
        assert!(detect(&mut Cursor::new(img)).unwrap());
    }

    #[test]
    fn detects_corrupt_variant_magic() {
        let mut img = vec![0u8; 512];
        img[0..11].copy_from_slice(b"RRaAXFAT   ");
        assert!(detect(&mut Cursor::new(img)).unwrap());
    }

    #[test]
    fn parses_well_formed_tool_output() {
        let output = "\tVolume name: \"KINGSTON\"\n\tVolume serial number: 1234-5678\n\tVolume length: 250069680 sectors (128035676160 bytes)\n";
        let info = parse_tool_output(output).unwrap();
        assert_eq!(info.label.as_deref(), Some("KINGSTON"));
        assert_eq!(info.serial, Some(0x1234_5678));
        assert_eq!(info.size_bytes, Some(128_035_676_160));
    }

    #[test]
    fn rejects_missing_serial_line() {
        let output = "\tVolume name: \"KINGSTON\"\n\tVolume length: 1 sectors (512 bytes)\n";
        assert!(parse_tool_output(output).is_err());
    }
}
