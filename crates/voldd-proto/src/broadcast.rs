//! Typed framework broadcast (§4.6). `voldd-core`/`voldd-manager` build
//! one of these per lifecycle transition; a [`crate::Broadcaster`]
//! renders it to whatever wire format the embedding framework expects.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastCode {
    VolumeStateChange,
    VolumeUuidChange,
    VolumeUserLabelChange,
    VolumeDiskInserted,
    VolumeDiskRemoved,
    /// May be suppressed entirely depending on `RuntimeConfig::prepared_stage`.
    VolumeDiskPrepared,
    VolumeBadRemoval,
    VolumeMountFailedNoMedia,
    VolumeDiskNoAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    pub code: BroadcastCode,
    pub message: String,
    pub with_uuid_flag: bool,
}

impl Broadcast {
    pub fn new(code: BroadcastCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), with_uuid_flag: false }
    }

    pub fn with_uuid_flag(mut self) -> Self {
        self.with_uuid_flag = true;
        self
    }

    /// `Volume <label> <fuse_mp> state changed from <old> (<oldname>) to <new> (<newname>)`.
    pub fn state_change(label: &str, fuse_mp: &str, old: &str, new: &str) -> Self {
        Self::new(
            BroadcastCode::VolumeStateChange,
            format!("Volume {label} {fuse_mp} state changed from {old} ({old}) to {new} ({new})"),
        )
    }

    /// `Volume <label> <fuse_mp> disk prepared (<maj>:<min>) <devtype> <volumelabel> <volumeid>`.
    pub fn disk_prepared(
        label: &str,
        fuse_mp: &str,
        major: u32,
        minor: u32,
        devtype: &str,
        volume_label: &str,
        volume_id: u32,
    ) -> Self {
        Self::new(
            BroadcastCode::VolumeDiskPrepared,
            format!(
                "Volume {label} {fuse_mp} disk prepared ({major}:{minor}) {devtype} {volume_label} {volume_id:08x}"
            ),
        )
    }

    /// `Volume <label> <fuse_mp> bad removal (<maj>:<min>)`.
    pub fn bad_removal(label: &str, fuse_mp: &str, major: u32, minor: u32) -> Self {
        Self::new(
            BroadcastCode::VolumeBadRemoval,
            format!("Volume {label} {fuse_mp} bad removal ({major}:{minor})"),
        )
    }
}

/// External collaborator (§4.7): emits a [`Broadcast`] to the embedding
/// framework. `voldd-core` never knows the wire format.
pub trait Broadcaster: Send + Sync {
    fn send(&self, broadcast: &Broadcast);
}

/// No-op default, used in tests and as a safe fallback when no real
/// framework connection exists.
#[derive(Debug, Default)]
pub struct NullBroadcaster;

impl Broadcaster for NullBroadcaster {
    fn send(&self, broadcast: &Broadcast) {
        log::debug!("broadcast (discarded): {:?} {}", broadcast.code, broadcast.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_change_message_shape() {
        let b = Broadcast::state_change("sdcard", "/storage/sdcard", "Idle", "Checking");
        assert_eq!(
            b.message,
            "Volume sdcard /storage/sdcard state changed from Idle (Idle) to Checking (Checking)"
        );
    }

    #[test]
    fn bad_removal_message_shape() {
        let b = Broadcast::bad_removal("sdcard", "/storage/sdcard", 8, 1);
        assert_eq!(b.message, "Volume sdcard /storage/sdcard bad removal (8:1)");
    }
}
