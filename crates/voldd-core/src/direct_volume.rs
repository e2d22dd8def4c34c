//! `DirectVolume` (C4): consumes block events, tracks the disk/partition
//! model layered on top of [`Volume`]'s state machine (§4.4).

use crate::config::RuntimeConfig;
use crate::state::VolumeState;
use crate::volume::{Volume, VolumeInner, MAX_PARTITIONS};
use std::path::Path;
use voldd_fsprobe::FsType;
use voldd_proto::{Broadcast, BroadcastCode};

/// Virtual device minor used by LVM/ramdisk devices this daemon should
/// never adopt (§4.4.1).
const VIRTUAL_DEVICE_MINOR: u32 = 240;

pub struct DirectVolume {
    pub volume: Volume,
}

impl DirectVolume {
    pub fn new(volume: Volume) -> Self {
        Self { volume }
    }

    /// Event routing (§4.4.1): true if `devpath` is owned by this volume.
    pub fn owns_devpath(&self, devpath: &str) -> bool {
        self.volume.config.sysfs_paths.iter().any(|prefix| devpath.starts_with(prefix.as_str()))
    }

    /// §4.4.1 identity filter for `devtype==disk, action==Add`.
    fn accepts_disk_add(&self, inner: &VolumeInner, minor: u32, nparts: Option<u32>) -> bool {
        if inner.disk_major != -1 {
            return false;
        }
        if minor == VIRTUAL_DEVICE_MINOR && nparts.unwrap_or(0) == 0 {
            return false;
        }
        true
    }

    /// §4.4.1 identity filter for `devtype==disk, action ∈ {Remove,Change}`.
    fn accepts_disk_remove_or_change(&self, inner: &VolumeInner, major: u32, minor: u32) -> bool {
        inner.disk_major == major as i32 && inner.disk_minor == minor as i32
    }

    /// §4.4.1 identity filter for `devtype==partition`.
    fn accepts_partition(&self, inner: &VolumeInner, major: u32, minor: u32) -> bool {
        major as i32 == inner.disk_major && (minor as i32 - inner.disk_minor).abs() <= 15
    }

    fn ensure_node(major: u32, minor: u32) {
        let path = format!("/dev/block/vold/{major}:{minor}");
        // mknod requires root and a real block device; idempotent by
        // design (EEXIST is not an error, §5). Failure here is logged,
        // never fatal (§4.4.1).
        if let Err(e) = std::fs::File::create(&path) {
            if e.kind() != std::io::ErrorKind::AlreadyExists {
                log::warn!("failed to create device node {path}: {e}");
            }
        }
    }

    /// Disk-added (§4.4.2).
    pub fn disk_added(&self, major: u32, minor: u32, nparts: Option<u32>, config: &RuntimeConfig) {
        let mut guard = self.volume.inner.lock().unwrap();
        if !self.accepts_disk_add(&guard, minor, nparts) {
            return;
        }
        Self::ensure_node(major, minor);

        guard.disk_major = major as i32;
        guard.disk_minor = minor as i32;
        let nparts = nparts.unwrap_or(1);
        let _ = std::fs::create_dir_all("/dev/block/mounted");
        let _ = std::fs::File::create(format!(
            "/dev/block/mounted/{major}:{minor}"
        ));
        guard.num_parts = nparts;
        guard.pending_part_count = nparts.min(MAX_PARTITIONS as u32);
        guard.part_minors = vec![-1; MAX_PARTITIONS];

        if nparts == 0 {
            let node = format!("/dev/block/vold/{major}:{minor}");
            if Path::new(&node).exists() {
                let new_state = self.mountpoint_init(&mut guard, config);
                self.transition_locked(&mut guard, new_state);
                if guard.state == VolumeState::Idle {
                    self.broadcast_disk_inserted(&guard);
                }
                return;
            }
        }
        self.transition_locked(&mut guard, VolumeState::Pending);
    }

    fn broadcast_disk_inserted(&self, guard: &VolumeInner) {
        self.volume.collaborators_broadcast(Broadcast::new(
            BroadcastCode::VolumeDiskInserted,
            format!(
                "Volume {} disk inserted ({}:{})",
                self.volume.config.label, guard.disk_major, guard.disk_minor
            ),
        ));
    }

    /// Partition-added (§4.4.3).
    pub fn partition_added(&self, minor: u32, partn: Option<u32>, config: &RuntimeConfig) {
        let partn = partn.unwrap_or(1);
        if partn == 0 || partn as usize > MAX_PARTITIONS {
            log::warn!("partition index {partn} out of range, ignoring");
            return;
        }
        let mut guard = self.volume.inner.lock().unwrap();
        let idx = (partn - 1) as usize;
        if guard.part_minors[idx] != -1 {
            // Duplicate partition-add: redundant uevent, ignore (§4.4.3).
            return;
        }
        guard.part_minors[idx] = minor as i32;
        guard.pending_part_count = guard.pending_part_count.saturating_sub(1);

        if guard.pending_part_count == 0
            && guard.state != VolumeState::Formatting
            && guard.state != VolumeState::Mounted
        {
            let new_state = self.mountpoint_init(&mut guard, config);
            self.transition_locked(&mut guard, new_state);
            if guard.state == VolumeState::Idle {
                self.broadcast_disk_inserted(&guard);
            }
            if guard.state == VolumeState::Idle && guard.retry_mount {
                guard.retry_mount = false;
                drop(guard);
                let _ = self.volume.mount_req(config);
                return;
            }
        }
    }

    /// Partition-removed / partition-changed (§4.4.4). An individual
    /// partition disappearing while its disk is mounted, shared, or mid
    /// check runs the same unsafe-remove path a disk-remove would
    /// (§4.4.6), without tearing down the rest of the disk model — a
    /// disk-remove event still follows to do that. Grounded on
    /// `handlePartitionRemoved` -> `UnmountUnshare` in the original daemon.
    pub fn partition_removed(&self, major: u32, minor: u32) {
        let mut guard = self.volume.inner.lock().unwrap();
        if !self.accepts_partition(&guard, major, minor) {
            return;
        }
        if matches!(
            guard.state,
            VolumeState::Mounted | VolumeState::Shared | VolumeState::Checking
        ) {
            guard.removing = true;
            self.unsafe_remove(&mut guard);
            guard.removing = false;
        }
    }

    /// Disk-removed (§4.4.4).
    pub fn disk_removed(&self) {
        let mut guard = self.volume.inner.lock().unwrap();
        guard.removing = true;

        if guard.state == VolumeState::Shared {
            // unshare is a no-op here; a real mass-storage unshare lives
            // in VolumeManager (§4.5), which calls into this before
            // disk_removed when it detects removal.
        }

        if guard.num_parts == 0 {
            self.unsafe_remove(&mut guard);
        }

        if guard.state != VolumeState::NoMedia {
            self.volume.collaborators_broadcast(Broadcast::new(
                BroadcastCode::VolumeDiskRemoved,
                format!("Volume {} disk removed", self.volume.config.label),
            ));
        }
        guard.state = VolumeState::NoMedia;

        for minor in std::iter::once(guard.disk_minor)
            .chain(guard.part_minors.iter().copied())
            .filter(|&m| m >= 0)
        {
            let _ = std::fs::remove_file(format!(
                "/dev/block/vold/{}:{}",
                guard.disk_major, minor
            ));
        }

        guard.part_minors = vec![-1; MAX_PARTITIONS];
        guard.disk_major = -1;
        guard.disk_minor = -1;
        guard.num_parts = 0;
        guard.part_idx = guard.original_part_idx;
        guard.removing = false;
    }

    /// Mountpoint initialisation (§4.4.5). Returns the resulting state;
    /// caller applies it through [`Self::transition_locked`] so the
    /// broadcast-on-transition logic fires exactly once.
    fn mountpoint_init(&self, guard: &mut VolumeInner, config: &RuntimeConfig) -> VolumeState {
        let node = if guard.num_parts == 0 {
            format!("/dev/block/vold/{}:{}", guard.disk_major, guard.disk_minor)
        } else {
            let idx = if guard.part_idx >= 1 { (guard.part_idx - 1) as usize } else { 0 };
            let minor = guard.part_minors.get(idx).copied().unwrap_or(-1);
            format!("/dev/block/vold/{}:{}", guard.disk_major, minor)
        };

        let path = Path::new(&node);
        if !path.exists() {
            return VolumeState::NoMedia;
        }

        let probed = std::fs::File::open(path).ok().and_then(|mut f| {
            let fs_type = voldd_fsprobe::detect(&mut f).ok()?;
            let info = voldd_fsprobe::read_info(&mut f, fs_type).ok();
            Some((fs_type, info))
        });

        match probed {
            Some((fs, info)) if fs != FsType::HfsPlus => {
                let volume_id = info.as_ref().and_then(|i| i.serial);
                guard.uuid = volume_id;
                guard.mount_point = crate::mountpoint::resolve_mountpoint(
                    &self.volume.config.mount_point,
                    volume_id.unwrap_or(0),
                );
                let _ = std::fs::create_dir_all(&guard.mount_point);
                if config.prepared_stage {
                    self.volume.collaborators_broadcast(Broadcast::disk_prepared(
                        &self.volume.config.label,
                        &guard.mount_point,
                        guard.disk_major as u32,
                        guard.disk_minor as u32,
                        "disk",
                        info.as_ref().and_then(|i| i.label.as_deref()).unwrap_or(""),
                        volume_id.unwrap_or(0),
                    ));
                }
                VolumeState::Idle
            }
            _ => {
                self.volume.collaborators_broadcast(Broadcast::new(
                    BroadcastCode::VolumeDiskNoAvailable,
                    format!("Volume {} disk no available", self.volume.config.label),
                ));
                VolumeState::NoMedia
            }
        }
    }

    /// Applies a block-event-driven state transition, broadcasting
    /// `VolumeStateChange` the same way [`Volume::mount_req`]'s transition
    /// helper does (§4.3.1, §8 scenario 1) so insert/remove sequences are
    /// observable, not just RPC-driven ones.
    fn transition_locked(&self, guard: &mut VolumeInner, new_state: VolumeState) {
        if guard.state == new_state {
            return;
        }
        log::info!(
            "[{}] state {:?} -> {:?}",
            self.volume.config.label,
            guard.state,
            new_state
        );
        self.volume.collaborators_broadcast(Broadcast::state_change(
            &self.volume.config.label,
            &guard.mount_point,
            guard.state.name(),
            new_state.name(),
        ));
        guard.state = new_state;
    }

    /// Unsafe removal while mounted or shared (§4.4.6).
    fn unsafe_remove(&self, guard: &mut VolumeInner) {
        let was_mounted = guard.state == VolumeState::Mounted;
        let was_shared = guard.state == VolumeState::Shared;
        let was_checking = guard.state == VolumeState::Checking;

        if was_mounted {
            self.volume.collaborators_broadcast(Broadcast::bad_removal(
                &self.volume.config.label,
                &guard.mount_point,
                guard.disk_major as u32,
                guard.disk_minor as u32,
            ));
            guard.currently_mounted_kdev = None;
        }
        if was_shared {
            self.volume.collaborators_broadcast(Broadcast::bad_removal(
                &self.volume.config.label,
                &guard.mount_point,
                guard.disk_major as u32,
                guard.disk_minor as u32,
            ));
        }
        if was_checking {
            self.volume.collaborators_broadcast(Broadcast::bad_removal(
                &self.volume.config.label,
                &guard.mount_point,
                guard.disk_major as u32,
                guard.disk_minor as u32,
            ));
        }
        guard.state = VolumeState::NoMedia;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Collaborators, VolumeConfig, VolumeFlags};
    use std::path::PathBuf;
    use std::sync::Arc;
    use voldd_proto::{
        AsecController, CryptoProvider, FuseController, NullBroadcaster, ProcessKiller, PropertyStore,
    };

    struct Noop;
    impl ProcessKiller for Noop {
        fn signal_busy(&self, _m: &Path, _f: bool) -> std::io::Result<()> {
            Ok(())
        }
    }
    impl CryptoProvider for Noop {
        fn setup(&self, k: &Path) -> std::io::Result<PathBuf> {
            Ok(k.to_path_buf())
        }
    }
    impl AsecController for Noop {
        fn mount(&self, _c: &str) -> std::io::Result<()> {
            Ok(())
        }
        fn cleanup(&self, _c: &str, _f: bool) -> std::io::Result<()> {
            Ok(())
        }
    }
    impl FuseController for Noop {
        fn start(&self, _l: &str, _r: &Path, _f: &Path) -> std::io::Result<()> {
            Ok(())
        }
        fn stop(&self, _l: &str) -> std::io::Result<()> {
            Ok(())
        }
    }
    impl PropertyStore for Noop {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }
        fn set(&self, _key: &str, _value: &str) {}
    }

    fn direct_volume() -> DirectVolume {
        let collaborators = Collaborators {
            broadcaster: Arc::new(NullBroadcaster),
            process_killer: Arc::new(Noop),
            crypto: Arc::new(Noop),
            asec: Arc::new(Noop),
            fuse: Arc::new(Noop),
            properties: Arc::new(Noop),
        };
        DirectVolume::new(Volume::new(
            VolumeConfig {
                label: "usb".into(),
                mount_point: "/storage/usb0".into(),
                fs_type_hint: None,
                flags: VolumeFlags::empty(),
                sysfs_paths: vec!["/devices/usb".into()],
            },
            collaborators,
        ))
    }

    #[test]
    fn owns_devpath_matches_prefix() {
        let dv = direct_volume();
        assert!(dv.owns_devpath("/devices/usb/1-1"));
        assert!(!dv.owns_devpath("/devices/sdcard"));
    }

    #[test]
    fn disk_added_with_parts_enters_pending() {
        let dv = direct_volume();
        dv.disk_added(8, 0, Some(2), &RuntimeConfig::default());
        assert_eq!(dv.volume.state(), VolumeState::Pending);
        let guard = dv.volume.inner.lock().unwrap();
        assert_eq!(guard.pending_part_count, 2);
        assert_eq!(guard.num_parts, 2);
    }

    #[test]
    fn disk_added_rejects_second_disk_while_one_present() {
        let dv = direct_volume();
        dv.disk_added(8, 0, Some(1), &RuntimeConfig::default());
        dv.disk_added(8, 16, Some(1), &RuntimeConfig::default());
        let guard = dv.volume.inner.lock().unwrap();
        assert_eq!(guard.disk_minor, 0);
    }

    #[test]
    fn duplicate_partition_added_is_idempotent() {
        let dv = direct_volume();
        dv.disk_added(8, 0, Some(2), &RuntimeConfig::default());
        dv.partition_added(1, Some(1), &RuntimeConfig::default());
        let count_after_first = dv.volume.inner.lock().unwrap().pending_part_count;
        dv.partition_added(1, Some(1), &RuntimeConfig::default());
        let count_after_dup = dv.volume.inner.lock().unwrap().pending_part_count;
        assert_eq!(count_after_first, count_after_dup);
    }

    #[test]
    fn disk_removed_resets_disk_major_to_minus_one() {
        let dv = direct_volume();
        dv.disk_added(8, 0, Some(1), &RuntimeConfig::default());
        dv.disk_removed();
        let guard = dv.volume.inner.lock().unwrap();
        assert_eq!(guard.disk_major, -1);
        assert_eq!(guard.state, VolumeState::NoMedia);
    }
}
