//! HFS+ volume header probe. Detection only — this workspace carries no
//! write driver for HFS+ (§4.2), so there is no `read_info`: a matched
//! HFS+ volume is routed straight to "unsupported", not mounted.

use crate::{read_at, ProbeError};
use std::io::{Read, Seek};

const MAGIC_OFFSET: u64 = 1024;

pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<bool, ProbeError> {
    let mut magic = [0u8; 4];
    read_at(reader, MAGIC_OFFSET, &mut magic)?;
    let matched = &magic == b"H+\0\x04" || &magic == b"HX\0\x05";
    log::trace!("HFS+ probe: magic={matched}");
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn detects_hfs_plus_magic() {
        let mut img = vec![0u8; 2048];
        img[1024..1028].copy_from_slice(b"H+\0\x04");
        assert!(detect(&mut Cursor::new(img)).unwrap());
    }

    #[test]
    fn detects_hfsx_magic() {
        let mut img = vec![0u8; 2048];
        img[1024..1028].copy_from_slice(b"HX\0\x05");
        assert!(detect(&mut Cursor::new(img)).unwrap());
    }

    #[test]
    fn rejects_unrelated_data() {
        assert!(!detect(&mut Cursor::new(vec![0u8; 2048])).unwrap());
    }
}
