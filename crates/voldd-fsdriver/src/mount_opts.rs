//! Mount flag and option-string construction, shared by all three drivers
//! (§4.2).

use crate::{MountFlags, MountRequest};

pub fn flags_for(request: &MountRequest<'_>) -> MountFlags {
    let mut flags = MountFlags::NODEV | MountFlags::NOSUID | MountFlags::DIRSYNC;
    if !request.executable {
        flags |= MountFlags::NOEXEC;
    }
    if request.read_only {
        flags |= MountFlags::RDONLY;
    }
    if request.remount {
        flags |= MountFlags::REMOUNT;
    }
    flags
}

/// `utf8,uid=U,gid=G,fmask=M,dmask=M`, used as-is by FAT/exFAT.
pub fn fat_like_opts(request: &MountRequest<'_>) -> String {
    let (fmask, dmask) = masks(request);
    format!(
        "utf8,uid={},gid={},fmask={:o},dmask={:o}",
        request.uid, request.gid, fmask, dmask
    )
}

/// Same shape plus `force` and `iocharset=utf8`.
pub fn ntfs_opts(request: &MountRequest<'_>) -> String {
    let (fmask, dmask) = masks(request);
    format!(
        "utf8,uid={},gid={},fmask={:o},dmask={:o},force,iocharset=utf8",
        request.uid, request.gid, fmask, dmask
    )
}

fn masks(request: &MountRequest<'_>) -> (u32, u32) {
    if request.world_writable_override {
        (0, 0)
    } else {
        (request.fmask, request.dmask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn request(world_writable_override: bool) -> MountRequest<'static> {
        MountRequest {
            device: Path::new("/dev/block/vold/8:1"),
            mount_point: Path::new("/mnt/sdcard"),
            uid: 1000,
            gid: 1000,
            fmask: 0o711,
            dmask: 0o700,
            read_only: false,
            executable: false,
            remount: false,
            world_writable_override,
        }
    }

    #[test]
    fn fat_opts_string_shape() {
        let opts = fat_like_opts(&request(false));
        assert_eq!(opts, "utf8,uid=1000,gid=1000,fmask=711,dmask=700");
    }

    #[test]
    fn ntfs_opts_adds_force_and_iocharset() {
        let opts = ntfs_opts(&request(false));
        assert_eq!(opts, "utf8,uid=1000,gid=1000,fmask=711,dmask=700,force,iocharset=utf8");
    }

    #[test]
    fn world_writable_override_forces_zero_masks() {
        let opts = fat_like_opts(&request(true));
        assert_eq!(opts, "utf8,uid=1000,gid=1000,fmask=0,dmask=0");
    }

    #[test]
    fn flags_include_noexec_when_not_executable() {
        let flags = flags_for(&request(false));
        assert!(flags.contains(MountFlags::NOEXEC));
        assert!(flags.contains(MountFlags::NODEV | MountFlags::NOSUID | MountFlags::DIRSYNC));
        assert!(!flags.contains(MountFlags::RDONLY));
    }
}
