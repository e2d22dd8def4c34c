//! Runtime configuration (§4.9, ambient). Replaces the source's four
//! `#ifdef` build variants (automotive / Tuxera fs-driver pack / CD-ROM
//! support / prepared-stage removal) with one struct threaded through
//! `VolumeManager::new`, per the Design Note in the original spec's open
//! questions — no `#[cfg]` gates.

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Disables the `check` (C2) step of the mount pipeline entirely
    /// (§4.3.2 step b).
    pub fs_checks_enabled: bool,
    /// Enables mounting secondary candidate partitions under
    /// `<mountpoint>/<label>{2,3,...}` (§4.3.2 step i).
    pub multi_mount: bool,
    /// Enables the optional `VolumeDiskPrepared` broadcast (§4.6).
    pub prepared_stage: bool,
    /// Simulates `ro.crypto.state=encrypted` for the `ENCRYPTABLE` mount
    /// path, standing in for a real property-store read at the caller's
    /// option.
    pub encrypted_boot: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fs_checks_enabled: true,
            multi_mount: false,
            prepared_stage: false,
            encrypted_boot: false,
        }
    }
}
