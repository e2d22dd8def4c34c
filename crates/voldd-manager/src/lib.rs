//! `VolumeManager` (C5): an ordered registry of volumes that fans block
//! events to the right [`DirectVolume`] by `sysfs` path prefix and
//! coordinates cross-volume operations (§4.5).

use std::sync::Arc;
use voldd_core::{DirectVolume, RuntimeConfig, VoldError};
use voldd_proto::{Action, BlockEvent, DevType};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("no volume registered for label {0:?}")]
    UnknownLabel(String),
    #[error(transparent)]
    Vold(#[from] VoldError),
}

/// Storage-type categories published as `tcc.primary_storage.type`
/// (§4.5), keyed by the 1-based registration position of the matched
/// volume: 1 = internal, 2 = SD, 3-5 = USB, 6 = SATA.
pub fn storage_type_for_position(position: usize) -> u8 {
    match position {
        1 => 1,
        2 => 2,
        3..=5 => 3,
        6 => 6,
        _ => 0,
    }
}

pub struct VolumeManager {
    volumes: Vec<Arc<DirectVolume>>,
    config: RuntimeConfig,
}

impl VolumeManager {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { volumes: Vec::new(), config }
    }

    pub fn register(&mut self, volume: DirectVolume) {
        self.volumes.push(Arc::new(volume));
    }

    pub fn volume(&self, label: &str) -> Option<&Arc<DirectVolume>> {
        self.volumes.iter().find(|v| v.volume.config.label == label)
    }

    /// Position (1-based) of the first volume whose `sysfs_paths` prefix
    /// matches `devpath`; used for `storage_type` labelling.
    fn matched_position(&self, devpath: &str) -> Option<usize> {
        self.volumes
            .iter()
            .position(|v| v.owns_devpath(devpath))
            .map(|idx| idx + 1)
    }

    /// Dispatches a block event to the first [`DirectVolume`] whose
    /// `sysfs_paths` prefix-matches `devpath`, in registration order
    /// (§4.5).
    pub fn dispatch(&self, event: &BlockEvent) {
        let Some(position) = self.matched_position(&event.devpath) else {
            log::trace!("no volume matched devpath {}", event.devpath);
            return;
        };
        let dv = &self.volumes[position - 1];
        let storage_type = storage_type_for_position(position);
        log::trace!(
            "[{}] matched devpath {} (storage_type={storage_type})",
            dv.volume.config.label,
            event.devpath
        );
        dv.volume.publish_property("tcc.primary_storage.type", &storage_type.to_string());

        match (event.devtype, event.action) {
            (DevType::Disk, Action::Add) => {
                dv.disk_added(event.major, event.minor, Some(event.nparts()), &self.config);
            }
            (DevType::Partition, Action::Add) => {
                dv.partition_added(event.minor, Some(event.partn()), &self.config);
            }
            (DevType::Disk, Action::Remove) | (DevType::Disk, Action::Change) => {
                dv.disk_removed();
            }
            (DevType::Partition, Action::Remove) | (DevType::Partition, Action::Change) => {
                // A mounted/shared disk tracked by partition count (§4.4.4)
                // never sees its own disk-remove event race-win cleanly
                // against the kernel tearing down partitions first; run the
                // same unsafe-remove path a disk-remove would (§4.4.6),
                // per `handlePartitionRemoved` -> `UnmountUnshare` in the
                // original daemon.
                dv.partition_removed(event.major, event.minor);
            }
        }
    }

    pub fn share(&self, label: &str) -> Result<(), ManagerError> {
        let volume = self.volume(label).ok_or_else(|| ManagerError::UnknownLabel(label.to_string()))?;
        volume.volume.share_req()?;
        Ok(())
    }

    pub fn unshare(&self, label: &str) -> Result<(), ManagerError> {
        let volume = self.volume(label).ok_or_else(|| ManagerError::UnknownLabel(label.to_string()))?;
        volume.volume.unshare_req()?;
        Ok(())
    }

    pub fn mount(&self, label: &str) -> Result<(), ManagerError> {
        let volume = self.volume(label).ok_or_else(|| ManagerError::UnknownLabel(label.to_string()))?;
        volume.volume.mount_req(&self.config)?;
        Ok(())
    }

    pub fn unmount(&self, label: &str) -> Result<(), ManagerError> {
        let volume = self.volume(label).ok_or_else(|| ManagerError::UnknownLabel(label.to_string()))?;
        volume.volume.unmount_req()?;
        Ok(())
    }

    pub fn format(&self, label: &str, whole_device_bytes: u64, fs_type: Option<&str>) -> Result<(), ManagerError> {
        let volume = self.volume(label).ok_or_else(|| ManagerError::UnknownLabel(label.to_string()))?;
        volume.volume.format_req(whole_device_bytes, fs_type)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use voldd_core::{Collaborators, Volume, VolumeConfig, VolumeFlags};
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

    fn collaborators() -> Collaborators {
        Collaborators {
            broadcaster: Arc::new(NullBroadcaster),
            process_killer: Arc::new(Noop),
            crypto: Arc::new(Noop),
            asec: Arc::new(Noop),
            fuse: Arc::new(Noop),
            properties: Arc::new(Noop),
        }
    }

    fn direct_volume(label: &str, sysfs_path: &str) -> DirectVolume {
        DirectVolume::new(Volume::new(
            VolumeConfig {
                label: label.to_string(),
                mount_point: format!("/storage/{label}"),
                fs_type_hint: None,
                flags: VolumeFlags::empty(),
                sysfs_paths: vec![sysfs_path.to_string()],
            },
            collaborators(),
        ))
    }

    #[test]
    fn storage_type_mapping() {
        assert_eq!(storage_type_for_position(1), 1);
        assert_eq!(storage_type_for_position(2), 2);
        assert_eq!(storage_type_for_position(3), 3);
        assert_eq!(storage_type_for_position(5), 3);
        assert_eq!(storage_type_for_position(6), 6);
        assert_eq!(storage_type_for_position(7), 0);
    }

    #[test]
    fn dispatch_routes_to_first_matching_volume_in_registration_order() {
        let mut manager = VolumeManager::new(RuntimeConfig::default());
        manager.register(direct_volume("internal", "/devices/internal"));
        manager.register(direct_volume("sdcard", "/devices/sdcard"));

        let event = BlockEvent {
            action: Action::Add,
            devpath: "/devices/sdcard/mmc0".into(),
            devtype: DevType::Disk,
            major: 179,
            minor: 0,
            params: Default::default(),
        };
        manager.dispatch(&event);

        let sdcard = manager.volume("sdcard").unwrap();
        assert_eq!(sdcard.volume.disk_identity(), (179, 0));
        let internal = manager.volume("internal").unwrap();
        assert_eq!(internal.volume.disk_identity(), (-1, -1));
    }

    #[test]
    fn unknown_label_operations_fail() {
        let manager = VolumeManager::new(RuntimeConfig::default());
        assert!(matches!(manager.mount("ghost"), Err(ManagerError::UnknownLabel(_))));
    }
}
