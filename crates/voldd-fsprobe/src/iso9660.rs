//! ISO-9660 primary volume descriptor probe, used for optical media. This
//! is deliberately not part of [`crate::detect`]'s FAT/exFAT/NTFS/HFS+
//! chain — optical media is routed to this probe directly by whichever
//! caller already knows the device is a CD-ROM, matching how the original
//! daemon only ever calls its ISO-9660 probe from the CD-ROM-specific
//! code path.

use crate::{read_at, ProbeError, VolumeInfo};
use std::io::{Read, Seek};

const SECTOR_SIZE: u64 = 2048;
const PVD_SECTOR: u64 = 16;
const ISO_STANDARD_ID: &[u8; 5] = b"CD001";
const VD_TYPE_PRIMARY: u8 = 1;
const VD_VERSION: u8 = 1;

pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<bool, ProbeError> {
    let mut header = [0u8; 7];
    read_at(reader, PVD_SECTOR * SECTOR_SIZE, &mut header)?;
    let matched =
        header[0] == VD_TYPE_PRIMARY && &header[1..6] == ISO_STANDARD_ID && header[6] == VD_VERSION;
    log::trace!("ISO-9660 probe: primary descriptor matched={matched}");
    Ok(matched)
}

/// Volume label lives at offset 40, 32 bytes, space-padded d-characters.
pub fn read_info<R: Read + Seek>(reader: &mut R) -> Result<VolumeInfo, ProbeError> {
    let mut descriptor = [0u8; 190];
    read_at(reader, PVD_SECTOR * SECTOR_SIZE, &mut descriptor)?;

    let mut label_bytes = [0u8; 32];
    label_bytes.copy_from_slice(&descriptor[40..72]);
    let label = voldd_common::str::PaddedStr::from_bytes(label_bytes).trimmed();
    let label = voldd_common::str::space_to_underscore(&label);

    let volume_space_size =
        u32::from_le_bytes(descriptor[80..84].try_into().unwrap());
    let logical_block_size =
        u16::from_le_bytes(descriptor[128..130].try_into().unwrap());

    log::debug!("ISO-9660 probe: label={label:?}");

    Ok(VolumeInfo {
        label: Some(label).filter(|l| !l.is_empty()),
        serial: None,
        size_bytes: Some(volume_space_size as u64 * logical_block_size as u64),
    })
}
