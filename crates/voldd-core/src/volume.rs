//! `Volume`: state machine (§4.3.1) plus mount/unmount/format pipelines
//! (§4.3.2–4.3.4) for one managed volume.

use crate::config::RuntimeConfig;
use crate::error::VoldError;
use crate::mountpoint;
use crate::state::VolumeState;
use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use voldd_fsdriver::{CheckOutcome, FsDriver, MountRequest};
use voldd_fsprobe::FsType;
use voldd_proto::{
    AsecController, Broadcast, Broadcaster, CryptoProvider, FuseController, ProcessKiller,
    PropertyStore,
};

/// Partitions per disk this daemon will track (§4.4.2/4.4.3).
pub const MAX_PARTITIONS: usize = 32;
/// Candidate nodes considered during one mount attempt (§4.3.2 step 5).
pub const MAX_MOUNT_PART: usize = 16;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VolumeFlags: u32 {
        const ENCRYPTABLE = 0x01;
        const NONREMOVABLE = 0x02;
        const PROVIDES_ASEC = 0x04;
        const NOFUSE = 0x08;
    }
}

/// `sys.usb.format` property code (§6): 0=none, 1=FAT, 2=exFAT, 3=NTFS,
/// 4=HFS+/unsupported.
fn sys_usb_format_code(fs_type: FsType) -> u8 {
    match fs_type {
        FsType::Fat => 1,
        FsType::ExFat => 2,
        FsType::Ntfs => 3,
        FsType::HfsPlus => 4,
    }
}

/// Static configuration for a volume, derived from its fstab record.
#[derive(Debug, Clone)]
pub struct VolumeConfig {
    pub label: String,
    pub mount_point: String,
    pub fs_type_hint: Option<String>,
    pub flags: VolumeFlags,
    pub sysfs_paths: Vec<String>,
}

/// Mutable state guarded by one mutex per volume (§5). `removing` lives
/// in the same mutex so mount attempts observe it atomically with every
/// other field.
#[derive(Debug)]
pub(crate) struct VolumeInner {
    pub state: VolumeState,
    pub retry_mount: bool,
    pub removing: bool,
    pub disk_major: i32,
    pub disk_minor: i32,
    pub num_parts: u32,
    pub part_minors: Vec<i32>,
    pub pending_part_count: u32,
    pub part_idx: i32,
    pub original_part_idx: i32,
    pub currently_mounted_kdev: Option<(u32, u32)>,
    pub uuid: Option<u32>,
    pub user_label: Option<String>,
    /// Resolved mountpoint; starts as `config.mount_point` and is
    /// rewritten once by mountpoint initialisation if that was the
    /// literal `"UNKNOWN"` (§4.4.5).
    pub mount_point: String,
    /// Set once the `ENCRYPTABLE` mount path has remapped the device
    /// through crypto setup (§4.3.2 step 4); prevents re-remapping a
    /// device that is already decrypted.
    pub is_decrypted: bool,
    /// Secondary partitions mounted under `<mountpoint>/<label>{2,3,…}`
    /// when multi-mount is enabled (§4.3.2 step i); unwound in reverse by
    /// the unmount pipeline (§4.3.3).
    pub sub_mounts: Vec<String>,
}

impl VolumeInner {
    fn new(mount_point: String) -> Self {
        Self {
            state: VolumeState::NoMedia,
            retry_mount: false,
            removing: false,
            disk_major: -1,
            disk_minor: -1,
            num_parts: 0,
            part_minors: vec![-1; MAX_PARTITIONS],
            pending_part_count: 0,
            part_idx: -1,
            original_part_idx: -1,
            currently_mounted_kdev: None,
            uuid: None,
            user_label: None,
            mount_point,
            is_decrypted: false,
            sub_mounts: Vec::new(),
        }
    }
}

/// Collaborators a `Volume` needs that live outside this crate (§4.7).
pub struct Collaborators {
    pub broadcaster: Arc<dyn Broadcaster>,
    pub process_killer: Arc<dyn ProcessKiller>,
    pub crypto: Arc<dyn CryptoProvider>,
    pub asec: Arc<dyn AsecController>,
    pub fuse: Arc<dyn FuseController>,
    pub properties: Arc<dyn PropertyStore>,
}

pub struct Volume {
    pub config: VolumeConfig,
    pub(crate) inner: Mutex<VolumeInner>,
    collaborators: Collaborators,
}

impl Volume {
    pub fn new(config: VolumeConfig, collaborators: Collaborators) -> Self {
        let inner = VolumeInner::new(config.mount_point.clone());
        Self { config, inner: Mutex::new(inner), collaborators }
    }

    pub fn state(&self) -> VolumeState {
        self.inner.lock().unwrap().state
    }

    /// Current resolved mountpoint; differs from `config.mount_point`
    /// only after the `"UNKNOWN"` rewrite has fired (§4.4.5).
    pub fn mount_point(&self) -> String {
        self.inner.lock().unwrap().mount_point.clone()
    }

    pub fn currently_mounted_kdev(&self) -> Option<(u32, u32)> {
        self.inner.lock().unwrap().currently_mounted_kdev
    }

    /// Writes a key/value pair to the process-wide property store (§5, §6).
    pub fn publish_property(&self, key: &str, value: &str) {
        self.collaborators.properties.set(key, value);
    }

    pub(crate) fn collaborators_broadcast(&self, broadcast: Broadcast) {
        self.collaborators.broadcaster.send(&broadcast);
    }

    /// `(disk_major, disk_minor)`, `(-1, -1)` iff `state == NoMedia`
    /// (§8 invariant).
    pub fn disk_identity(&self) -> (i32, i32) {
        let guard = self.inner.lock().unwrap();
        (guard.disk_major, guard.disk_minor)
    }

    fn transition(&self, inner: &mut VolumeInner, new_state: VolumeState) {
        if inner.state == new_state {
            return;
        }
        log::info!("[{}] state {:?} -> {:?}", self.config.label, inner.state, new_state);
        self.collaborators.broadcaster.send(&Broadcast::state_change(
            &self.config.label,
            &inner.mount_point,
            inner.state.name(),
            new_state.name(),
        ));
        inner.state = new_state;
    }

    /// Device nodes mount candidates are drawn from (§4.3.2 step 3). When a
    /// single partition slot is pinned (`part_idx != -1`), the index is
    /// 1-based against `part_minors` per the data model; an out-of-range or
    /// unseen slot is refused rather than silently conflated with slot 0.
    fn candidate_nodes(&self, inner: &VolumeInner) -> Result<Vec<(u32, u32)>, VoldError> {
        if inner.part_idx == -1 {
            if inner.num_parts == 0 {
                Ok(vec![(inner.disk_major as u32, inner.disk_minor as u32)])
            } else {
                Ok(inner
                    .part_minors
                    .iter()
                    .take(inner.num_parts as usize)
                    .filter(|&&m| m >= 0)
                    .map(|&m| (inner.disk_major as u32, m as u32))
                    .collect())
            }
        } else {
            let idx = (inner.part_idx - 1) as usize;
            let minor = inner.part_minors.get(idx).copied().unwrap_or(-1);
            if minor < 0 {
                return Err(VoldError::Invariant(format!(
                    "part_idx {} has no known minor (slot unseen)",
                    inner.part_idx
                )));
            }
            Ok(vec![(inner.disk_major as u32, minor as u32)])
        }
    }

    fn node_path(major: u32, minor: u32) -> PathBuf {
        PathBuf::from(format!("/dev/block/vold/{major}:{minor}"))
    }

    /// Inverse of [`Self::node_path`], used to read back the remapped
    /// `major:minor` a crypto remap created (§4.3.2 step 4).
    fn parse_devnode(path: &Path) -> Option<(u32, u32)> {
        let name = path.file_name()?.to_str()?;
        let (major, minor) = name.split_once(':')?;
        Some((major.parse().ok()?, minor.parse().ok()?))
    }

    /// `mount_req` (§4.3.1, §4.3.2).
    pub fn mount_req(&self, config: &RuntimeConfig) -> Result<(), VoldError> {
        let mut guard = self.inner.lock().unwrap();
        if guard.removing {
            return Err(VoldError::Busy);
        }
        match guard.state {
            VolumeState::NoMedia => return Err(VoldError::NoMedia),
            VolumeState::Idle => {}
            VolumeState::Pending => {
                guard.retry_mount = true;
                return Err(VoldError::Busy);
            }
            _ => return Err(VoldError::Busy),
        }

        let mut nodes = match self.candidate_nodes(&guard) {
            Ok(n) => n,
            Err(e) => {
                self.transition(&mut guard, VolumeState::Idle);
                return Err(e);
            }
        };
        if self.config.flags.intersects(
            VolumeFlags::ENCRYPTABLE | VolumeFlags::NONREMOVABLE | VolumeFlags::PROVIDES_ASEC,
        ) && config.encrypted_boot
            && !guard.is_decrypted
        {
            if nodes.len() != 1 {
                return Err(VoldError::Invariant(
                    "encryptable mount requires exactly one candidate node".into(),
                ));
            }
            let (major, minor) = nodes[0];
            let remapped = self.collaborators.crypto.setup(&Self::node_path(major, minor))?;
            let (new_major, new_minor) = Self::parse_devnode(&remapped).ok_or_else(|| {
                VoldError::Invariant(format!(
                    "crypto remap returned non-device path {}",
                    remapped.display()
                ))
            })?;
            log::info!(
                "[{}] crypto remap {}:{} -> {}:{}",
                self.config.label,
                major,
                minor,
                new_major,
                new_minor
            );
            let new_node = Self::node_path(new_major, new_minor);
            if let Err(e) = std::fs::File::create(&new_node) {
                if e.kind() != std::io::ErrorKind::AlreadyExists {
                    log::warn!("failed to create remapped device node {}: {e}", new_node.display());
                }
            }
            guard.disk_major = new_major as i32;
            if guard.part_idx == -1 && guard.num_parts == 0 {
                guard.disk_minor = new_minor as i32;
            } else {
                let idx = if guard.part_idx >= 0 { (guard.part_idx - 1) as usize } else { 0 };
                if let Some(slot) = guard.part_minors.get_mut(idx) {
                    *slot = new_minor as i32;
                }
            }
            guard.is_decrypted = true;
            nodes = match self.candidate_nodes(&guard) {
                Ok(n) => n,
                Err(e) => {
                    self.transition(&mut guard, VolumeState::Idle);
                    return Err(e);
                }
            };
        }
        nodes.truncate(MAX_MOUNT_PART);
        let mount_point = guard.mount_point.clone();

        self.transition(&mut guard, VolumeState::Checking);
        drop(guard);

        let outcome = self.try_mount_candidates(&nodes, config, &mount_point);

        let mut guard = self.inner.lock().unwrap();
        match outcome {
            Ok((major, minor, fs_type, sub_mounts)) => {
                if guard.state != VolumeState::Checking {
                    // Drifted mid-pipeline (concurrent unsafe removal): roll back.
                    log::warn!("[{}] state drifted during mount, rolling back", self.config.label);
                    return Err(VoldError::Invariant("state drifted during mount".into()));
                }
                guard.currently_mounted_kdev = Some((major, minor));
                guard.sub_mounts = sub_mounts;
                let _ = fs_type;
                self.transition(&mut guard, VolumeState::Mounted);
                Ok(())
            }
            Err(e) => {
                let fallback =
                    if guard.removing { VolumeState::NoMedia } else { VolumeState::Idle };
                self.transition(&mut guard, fallback);
                Err(e)
            }
        }
    }

    /// Mounts one candidate node at `mount_point`, running probe/check/
    /// mount/ASEC/FUSE for it (§4.3.2 steps a-h). Returns the matched
    /// filesystem on success.
    fn mount_one(
        &self,
        major: u32,
        minor: u32,
        config: &RuntimeConfig,
        mount_point: &str,
        start_fuse: bool,
    ) -> Result<FsType, VoldError> {
        let node = Self::node_path(major, minor);
        let fs_type = self.probe(&node).ok().filter(|fs| fs.is_supported()).ok_or(VoldError::NotSupported)?;

        if config.fs_checks_enabled {
            let driver = voldd_fsdriver::driver_for(fs_type);
            match driver.check(&node) {
                Ok(CheckOutcome::Failed) => {
                    log::warn!("[{}] check failed on {}", self.config.label, node.display());
                    return Err(VoldError::CorruptFs(node.display().to_string()));
                }
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let read_only = !mountpoint::is_writable(mount_point, fs_type);
        let mount_mode = if self.config.flags.contains(VolumeFlags::NOFUSE) { 0o002 } else { 0o007 };
        let mount_point_path = Path::new(mount_point);
        if let Err(e) = std::fs::create_dir_all(mount_point_path) {
            if e.kind() != std::io::ErrorKind::AlreadyExists {
                return Err(e.into());
            }
        }
        let _ = std::fs::set_permissions(mount_point_path, std::fs::Permissions::from_mode(mount_mode));

        let driver = voldd_fsdriver::driver_for(fs_type);
        let request = MountRequest {
            device: &node,
            mount_point: mount_point_path,
            uid: 1000,
            gid: 1000,
            fmask: 0o711,
            dmask: 0o700,
            read_only,
            executable: false,
            remount: false,
            world_writable_override: false,
        };
        driver.mount(&request).map_err(VoldError::from)?;

        if self.config.flags.contains(VolumeFlags::PROVIDES_ASEC)
            && self.collaborators.asec.mount(&self.config.label).is_err()
        {
            return Err(VoldError::Io(std::io::Error::other("ASEC bind-mount failed")));
        }

        if start_fuse {
            let _ = self.collaborators.fuse.start(
                &self.config.label,
                mount_point_path,
                Path::new(&format!("/storage/{}", self.config.label)),
            );
        }

        Ok(fs_type)
    }

    fn try_mount_candidates(
        &self,
        nodes: &[(u32, u32)],
        config: &RuntimeConfig,
        mount_point: &str,
    ) -> Result<(u32, u32, FsType, Vec<String>), VoldError> {
        for (i, &(major, minor)) in nodes.iter().enumerate() {
            let fs_type = match self.mount_one(major, minor, config, mount_point, true) {
                Ok(fs) => fs,
                Err(_) => continue,
            };

            let mut sub_mounts = Vec::new();
            if config.multi_mount {
                let mut next = 2u32;
                for &(sub_major, sub_minor) in nodes.iter().skip(i + 1) {
                    let sub_point = format!("{mount_point}/{}{next}", self.config.label);
                    match self.mount_one(sub_major, sub_minor, config, &sub_point, false) {
                        Ok(_) => sub_mounts.push(sub_point),
                        Err(e) => log::warn!(
                            "[{}] multi-mount sub-partition {sub_major}:{sub_minor} at {sub_point} failed: {e}",
                            self.config.label
                        ),
                    }
                    next += 1;
                }
            }

            return Ok((major, minor, fs_type, sub_mounts));
        }
        Err(VoldError::NotSupported)
    }

    fn probe(&self, node: &Path) -> Result<FsType, VoldError> {
        let mut file = File::open(node)?;
        Ok(voldd_fsprobe::detect(&mut file)?)
    }

    /// `unmount_req` (§4.3.3).
    pub fn unmount_req(&self) -> Result<(), VoldError> {
        let mut guard = self.inner.lock().unwrap();
        if guard.state != VolumeState::Mounted {
            return Err(VoldError::Invariant(format!(
                "unmount requires Mounted, found {:?}",
                guard.state
            )));
        }
        let mount_point = guard.mount_point.clone();
        let sub_mounts = guard.sub_mounts.clone();
        self.transition(&mut guard, VolumeState::Unmounting);
        drop(guard);

        let _ = self.collaborators.fuse.stop(&self.config.label);

        for sub_point in sub_mounts.iter().rev() {
            let _ = std::process::Command::new("umount").args(["-l"]).arg(sub_point).status();
        }

        let mut retries_left = 10u32;
        let mut unmounted = false;
        while retries_left > 0 {
            if std::process::Command::new("umount")
                .args(["-l"])
                .arg(&mount_point)
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
            {
                unmounted = true;
                break;
            }
            let force = retries_left <= 1;
            let _ = self.collaborators.process_killer.signal_busy(Path::new(&mount_point), force);
            retries_left -= 1;
            std::thread::sleep(std::time::Duration::from_secs(1));
        }

        let mut guard = self.inner.lock().unwrap();
        if !unmounted {
            self.transition(&mut guard, VolumeState::Mounted);
            return Err(VoldError::Io(std::io::Error::other("unmount failed after retries")));
        }

        if self.config.flags.contains(VolumeFlags::PROVIDES_ASEC) {
            let _ = self.collaborators.asec.cleanup(&self.config.label, false);
        }

        guard.currently_mounted_kdev = None;
        guard.uuid = None;
        guard.user_label = None;
        guard.sub_mounts.clear();
        self.transition(&mut guard, VolumeState::Idle);
        Ok(())
    }

    /// `format_req` (§4.3.4).
    pub fn format_req(&self, whole_device_bytes: u64, explicit_fstype: Option<&str>) -> Result<(), VoldError> {
        let mut guard = self.inner.lock().unwrap();
        match guard.state {
            VolumeState::NoMedia => return Err(VoldError::NoMedia),
            VolumeState::Idle => {}
            _ => return Err(VoldError::Busy),
        }
        self.transition(&mut guard, VolumeState::Formatting);
        let whole_device = guard.part_idx == -1;
        let nodes = self.candidate_nodes(&guard).unwrap_or_default();
        drop(guard);

        let fs_type = if let Some("ntfs") = explicit_fstype {
            FsType::Ntfs
        } else if voldd_fsdriver::check_size(whole_device_bytes) {
            FsType::ExFat
        } else {
            FsType::Fat
        };

        if let Some((major, minor)) = nodes.first() {
            let node = Self::node_path(*major, *minor);
            let driver = voldd_fsdriver::driver_for(fs_type);
            let sectors = whole_device_bytes / 512;
            if driver.format(&node, sectors, whole_device).is_ok() {
                self.collaborators.properties.set("sys.usb.format", &sys_usb_format_code(fs_type).to_string());
            }
        }

        let mut guard = self.inner.lock().unwrap();
        self.transition(&mut guard, VolumeState::Idle);
        Ok(())
    }

    /// `share_req` (§4.3.1).
    pub fn share_req(&self) -> Result<(), VoldError> {
        let mut guard = self.inner.lock().unwrap();
        if guard.state != VolumeState::Idle {
            return Err(VoldError::Invariant("share requires Idle".into()));
        }
        self.transition(&mut guard, VolumeState::Shared);
        Ok(())
    }

    /// `unshare_req` (§4.3.1).
    pub fn unshare_req(&self) -> Result<(), VoldError> {
        let mut guard = self.inner.lock().unwrap();
        if guard.state != VolumeState::Shared {
            return Err(VoldError::Invariant("unshare requires Shared".into()));
        }
        self.transition(&mut guard, VolumeState::Idle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voldd_proto::NullBroadcaster;

    struct NoopCollaborator;
    impl ProcessKiller for NoopCollaborator {
        fn signal_busy(&self, _mount_point: &Path, _force: bool) -> std::io::Result<()> {
            Ok(())
        }
    }
    impl CryptoProvider for NoopCollaborator {
        fn setup(&self, kernel_device: &Path) -> std::io::Result<PathBuf> {
            Ok(kernel_device.to_path_buf())
        }
    }
    impl AsecController for NoopCollaborator {
        fn mount(&self, _container_id: &str) -> std::io::Result<()> {
            Ok(())
        }
        fn cleanup(&self, _container_id: &str, _force: bool) -> std::io::Result<()> {
            Ok(())
        }
    }
    impl FuseController for NoopCollaborator {
        fn start(&self, _label: &str, _raw_path: &Path, _fuse_path: &Path) -> std::io::Result<()> {
            Ok(())
        }
        fn stop(&self, _label: &str) -> std::io::Result<()> {
            Ok(())
        }
    }
    impl PropertyStore for NoopCollaborator {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }
        fn set(&self, _key: &str, _value: &str) {}
    }

    fn test_volume() -> Volume {
        let collaborators = Collaborators {
            broadcaster: Arc::new(NullBroadcaster),
            process_killer: Arc::new(NoopCollaborator),
            crypto: Arc::new(NoopCollaborator),
            asec: Arc::new(NoopCollaborator),
            fuse: Arc::new(NoopCollaborator),
            properties: Arc::new(NoopCollaborator),
        };
        Volume::new(
            VolumeConfig {
                label: "test".into(),
                mount_point: "/storage/test".into(),
                fs_type_hint: None,
                flags: VolumeFlags::empty(),
                sysfs_paths: vec!["/devices/test".into()],
            },
            collaborators,
        )
    }

    #[test]
    fn mount_in_no_media_fails_with_no_media() {
        let volume = test_volume();
        let err = volume.mount_req(&RuntimeConfig::default()).unwrap_err();
        assert!(matches!(err, VoldError::NoMedia));
    }

    #[test]
    fn unmount_requires_mounted_state() {
        let volume = test_volume();
        let err = volume.unmount_req().unwrap_err();
        assert!(matches!(err, VoldError::Invariant(_)));
    }

    #[test]
    fn share_requires_idle() {
        let volume = test_volume();
        let err = volume.share_req().unwrap_err();
        assert!(matches!(err, VoldError::Invariant(_)));
    }

    #[test]
    fn format_req_in_no_media_fails() {
        let volume = test_volume();
        let err = volume.format_req(1 << 30, None).unwrap_err();
        assert!(matches!(err, VoldError::NoMedia));
    }

    #[test]
    fn disk_major_minus_one_iff_no_media() {
        let volume = test_volume();
        let guard = volume.inner.lock().unwrap();
        assert_eq!(guard.disk_major, -1);
        assert_eq!(guard.state, VolumeState::NoMedia);
    }
}
