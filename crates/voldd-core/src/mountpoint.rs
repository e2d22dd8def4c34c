//! Mountpoint classification (read-only policy, §6) and the `"UNKNOWN"`
//! rewrite (§4.4.5).

use voldd_fsprobe::FsType;

/// Decides writability from the mountpoint's path class and filesystem.
/// USB is writable only for FAT; SD and generic `/storage/*` paths, plus
/// anything under `cdrom`, are read-only by policy.
pub fn is_writable(mount_point: &str, fs_type: FsType) -> bool {
    if mount_point.contains("cdrom") {
        return false;
    }
    if mount_point.starts_with("/storage/usb") {
        return fs_type == FsType::Fat;
    }
    if mount_point.starts_with("/storage/sdcard") || mount_point.starts_with("/storage/") {
        return false;
    }
    true
}

/// Rewrites the literal mountpoint `"UNKNOWN"` to `/mnt/vold/<hex volume-id>`
/// (§4.4.5); any other mountpoint passes through unchanged.
pub fn resolve_mountpoint(requested: &str, volume_id: u32) -> String {
    if requested == "UNKNOWN" {
        format!("/mnt/vold/{volume_id:08x}")
    } else {
        requested.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usb_is_writable_only_for_fat() {
        assert!(is_writable("/storage/usb0", FsType::Fat));
        assert!(!is_writable("/storage/usb0", FsType::ExFat));
        assert!(!is_writable("/storage/usb0", FsType::Ntfs));
    }

    #[test]
    fn sdcard_and_generic_storage_are_read_only() {
        assert!(!is_writable("/storage/sdcard0", FsType::Fat));
        assert!(!is_writable("/storage/emulated", FsType::Fat));
    }

    #[test]
    fn cdrom_paths_are_read_only() {
        assert!(!is_writable("/mnt/cdrom0", FsType::Fat));
    }

    #[test]
    fn unknown_mountpoint_is_rewritten_with_hex_volume_id() {
        assert_eq!(resolve_mountpoint("UNKNOWN", 0x1234_5678), "/mnt/vold/12345678");
    }

    #[test]
    fn non_unknown_mountpoint_passes_through() {
        assert_eq!(resolve_mountpoint("/storage/sdcard0", 0), "/storage/sdcard0");
    }
}
