//! NTFS boot sector probe. Magic lives 3 bytes into the boot sector
//! (the jump instruction occupies the first 3).

use crate::{read_at, ProbeError, VolumeInfo};
use std::io::{Read, Seek};

const MAGIC_OFFSET: u64 = 3;
const MAGIC: &[u8; 8] = b"NTFS    ";
const SERIAL_OFFSET: u64 = 0x48;
const BYTES_PER_SECTOR_OFFSET: usize = 0x0B;
const SECTORS_PER_VOLUME_OFFSET: usize = 0x28;

pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<bool, ProbeError> {
    let mut magic = [0u8; 8];
    read_at(reader, MAGIC_OFFSET, &mut magic)?;
    let matched = &magic == MAGIC;
    log::trace!("NTFS probe: magic={matched}");
    Ok(matched)
}

pub fn read_info<R: Read + Seek>(reader: &mut R) -> Result<VolumeInfo, ProbeError> {
    let mut sector = [0u8; 0x50];
    read_at(reader, 0, &mut sector)?;

    let bytes_per_sector = u16::from_le_bytes([
        sector[BYTES_PER_SECTOR_OFFSET],
        sector[BYTES_PER_SECTOR_OFFSET + 1],
    ]);
    let sectors_per_volume = u64::from_le_bytes(
        sector[SECTORS_PER_VOLUME_OFFSET..SECTORS_PER_VOLUME_OFFSET + 8]
            .try_into()
            .unwrap(),
    );
    let serial_bytes: [u8; 8] = sector[SERIAL_OFFSET as usize..SERIAL_OFFSET as usize + 8]
        .try_into()
        .unwrap();
    let serial = u64::from_le_bytes(serial_bytes) as u32;

    log::debug!("NTFS probe: serial={serial:08x}");

    Ok(VolumeInfo {
        label: None,
        serial: Some(serial),
        size_bytes: Some(sectors_per_volume * bytes_per_sector as u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ntfs_image(serial: u64) -> Vec<u8> {
        let mut sector = vec![0u8; 512];
        sector[3..11].copy_from_slice(b"NTFS    ");
        sector[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());
        sector[0x28..0x30].copy_from_slice(&100_000u64.to_le_bytes());
        sector[0x48..0x50].copy_from_slice(&serial.to_le_bytes());
        sector
    }

    #[test]
    fn detects_ntfs_magic() {
        assert!(detect(&mut Cursor::new(ntfs_image(1))).unwrap());
    }

    #[test]
    fn rejects_non_ntfs() {
        assert!(!detect(&mut Cursor::new(vec![0u8; 512])).unwrap());
    }

    #[test]
    fn extracts_serial_and_size() {
        let info = read_info(&mut Cursor::new(ntfs_image(0xDEAD_BEEF_0000_0001))).unwrap();
        assert_eq!(info.serial, Some(0x0000_0001));
        assert_eq!(info.size_bytes, Some(100_000 * 512));
    }
}
