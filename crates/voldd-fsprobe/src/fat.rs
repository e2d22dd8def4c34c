//! FAT16/FAT32 BPB parsing. FAT has no reliable magic, so `detect` always
//! succeeds — this module exists to fill in [`VolumeInfo`] once the
//! dispatcher in [`crate::detect`] has already ruled out everything else.

use crate::{read_at, ProbeError, VolumeInfo};
use std::io::{Read, Seek};

const BPB_LEN: usize = 0x5a;

/// Always reports a match; FAT is the unconditional fallback (§4.1).
pub fn detect<R: Read + Seek>(_reader: &mut R) -> Result<bool, ProbeError> {
    Ok(true)
}

pub fn read_info<R: Read + Seek>(reader: &mut R) -> Result<VolumeInfo, ProbeError> {
    let mut bpb = [0u8; BPB_LEN];
    read_at(reader, 0, &mut bpb)?;

    let bytes_per_sector = u16::from_le_bytes([bpb[0x0B], bpb[0x0C]]);
    if bytes_per_sector == 0 || !bytes_per_sector.is_power_of_two() {
        return Err(ProbeError::Malformed {
            fs: "FAT",
            reason: format!("bytes_per_sector {bytes_per_sector} is not a positive power of two"),
        });
    }
    let root_entry_count = u16::from_le_bytes([bpb[0x11], bpb[0x12]]);
    let total_sectors_16 = u16::from_le_bytes([bpb[0x13], bpb[0x14]]);
    let total_sectors_32 = u32::from_le_bytes([bpb[0x20], bpb[0x21], bpb[0x22], bpb[0x23]]);

    let is_fat32 = root_entry_count == 0;

    let serial = if is_fat32 {
        u32::from_le_bytes([bpb[0x43], bpb[0x44], bpb[0x45], bpb[0x46]])
    } else {
        u32::from_le_bytes([bpb[0x27], bpb[0x28], bpb[0x29], bpb[0x2A]])
    };

    let label_offset = if is_fat32 { 0x47 } else { 0x2B };
    let mut label_bytes = [0u8; 11];
    label_bytes.copy_from_slice(&bpb[label_offset..label_offset + 11]);
    let bpb_label = voldd_common::str::PaddedStr::from_bytes(label_bytes).trimmed();

    let label = if is_fat32 {
        root_dir_label(reader, &bpb)?.unwrap_or(bpb_label)
    } else {
        bpb_label
    };
    let label = voldd_common::str::space_to_underscore(&label);

    let total_sectors = if total_sectors_16 != 0 {
        total_sectors_16 as u64
    } else {
        total_sectors_32 as u64
    };

    log::debug!("FAT{} probe: serial={serial:08x} label={label:?}", if is_fat32 { 32 } else { 16 });

    Ok(VolumeInfo {
        label: Some(label).filter(|l| !l.is_empty()),
        serial: Some(serial),
        size_bytes: Some(total_sectors * bytes_per_sector as u64),
    })
}

/// Walks the FAT32 root-directory cluster chain looking for the volume
/// label entry (attribute byte `0x08`). Returns `Ok(None)` if no such entry
/// exists, not an error — falling back to the BPB label field is normal.
fn root_dir_label<R: Read + Seek>(
    reader: &mut R,
    bpb: &[u8; BPB_LEN],
) -> Result<Option<String>, ProbeError> {
    let bytes_per_sector = u16::from_le_bytes([bpb[0x0B], bpb[0x0C]]) as u64;
    let sectors_per_cluster = bpb[0x0D] as u64;
    let reserved = u16::from_le_bytes([bpb[0x0E], bpb[0x0F]]) as u64;
    let num_fats = bpb[0x10] as u64;
    let fat_size_32 = u32::from_le_bytes([bpb[0x24], bpb[0x25], bpb[0x26], bpb[0x27]]) as u64;
    let root_cluster = u32::from_le_bytes([bpb[0x2C], bpb[0x2D], bpb[0x2E], bpb[0x2F]]) as u64;

    if bytes_per_sector == 0 || sectors_per_cluster == 0 {
        return Ok(None);
    }

    let data_start_sector = reserved + num_fats * fat_size_32;
    let cluster_sector = data_start_sector + (root_cluster.saturating_sub(2)) * sectors_per_cluster;
    let cluster_offset = cluster_sector * bytes_per_sector;

    let cluster_size = (sectors_per_cluster * bytes_per_sector) as usize;
    let mut cluster = vec![0u8; cluster_size];
    read_at(reader, cluster_offset, &mut cluster)?;

    for entry in cluster.chunks_exact(32) {
        if entry[0] == 0x00 {
            break;
        }
        if entry[0] == 0xE5 {
            continue;
        }
        let attr = entry[11];
        if attr & 0x08 != 0 && attr & 0x10 == 0 {
            let mut name = [0u8; 11];
            name.copy_from_slice(&entry[0..11]);
            let label = voldd_common::str::PaddedStr::from_bytes(name).trimmed();
            return Ok(Some(label));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fat16_image(serial: u32, label: &[u8; 11]) -> Vec<u8> {
        let mut bpb = vec![0u8; 512];
        bpb[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());
        bpb[0x0D] = 4;
        bpb[0x0E..0x10].copy_from_slice(&1u16.to_le_bytes());
        bpb[0x10] = 2;
        bpb[0x11..0x13].copy_from_slice(&512u16.to_le_bytes());
        bpb[0x13..0x15].copy_from_slice(&20000u16.to_le_bytes());
        bpb[0x27..0x2B].copy_from_slice(&serial.to_le_bytes());
        bpb[0x2B..0x36].copy_from_slice(label);
        bpb
    }

    #[test]
    fn parses_fat16_serial_and_label() {
        let img = fat16_image(0x1234_5678, b"KINGSTON   ");
        let info = read_info(&mut Cursor::new(img)).unwrap();
        assert_eq!(info.serial, Some(0x1234_5678));
        assert_eq!(info.label.as_deref(), Some("KINGSTON"));
        assert_eq!(info.size_bytes, Some(20000 * 512));
    }

    #[test]
    fn rejects_non_power_of_two_bytes_per_sector() {
        let mut img = fat16_image(0, b"           ");
        img[0x0B..0x0D].copy_from_slice(&513u16.to_le_bytes());
        let err = read_info(&mut Cursor::new(img)).unwrap_err();
        assert!(matches!(err, ProbeError::Malformed { fs: "FAT", .. }));
    }

    #[test]
    fn detect_never_fails_to_match() {
        assert!(detect(&mut Cursor::new(vec![0u8; 512])).unwrap());
    }
}
