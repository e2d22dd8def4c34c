//! External collaborator traits (§4.7). These are the Rust-level seams
//! for subsystems that always live outside this process: signalling,
//! device-mapper crypto, ASEC containers, the FUSE sdcard daemon, and
//! the process-wide property store. `voldd-core` depends only on these
//! traits, never on a concrete OS mechanism.

use std::path::Path;

/// SIGHUP/SIGKILL escalation against processes holding a mountpoint open
/// (unmount pipeline, §4.3.3).
pub trait ProcessKiller: Send + Sync {
    fn signal_busy(&self, mount_point: &Path, force: bool) -> std::io::Result<()>;
}

/// `setup(kdev) -> KernelDevice` remap used by the `ENCRYPTABLE` mount
/// path (§4.3.2 step 4).
pub trait CryptoProvider: Send + Sync {
    fn setup(&self, kernel_device: &Path) -> std::io::Result<std::path::PathBuf>;
}

/// Bind-mount / cleanup of the secure container directory (§4.3.2 step g,
/// §4.4.6).
pub trait AsecController: Send + Sync {
    fn mount(&self, container_id: &str) -> std::io::Result<()>;
    fn cleanup(&self, container_id: &str, force: bool) -> std::io::Result<()>;
}

/// Start/stop of the per-volume FUSE daemon via the `ctl.start`/`ctl.stop`
/// property protocol (§6).
pub trait FuseController: Send + Sync {
    fn start(&self, label: &str, raw_path: &Path, fuse_path: &Path) -> std::io::Result<()>;
    fn stop(&self, label: &str) -> std::io::Result<()>;
}

/// The process-wide key/value property store (§5, §6).
pub trait PropertyStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Minimal in-memory property store, used to exercise the trait
    /// boundary in tests that don't care about a real implementation.
    struct MapPropertyStore(Mutex<HashMap<String, String>>);

    impl PropertyStore for MapPropertyStore {
        fn get(&self, key: &str) -> Option<String> {
            self.0.lock().unwrap().get(key).cloned()
        }

        fn set(&self, key: &str, value: &str) {
            self.0.lock().unwrap().insert(key.to_string(), value.to_string());
        }
    }

    #[test]
    fn property_store_round_trips() {
        let store = MapPropertyStore(Mutex::new(HashMap::new()));
        store.set("ro.crypto.state", "encrypted");
        assert_eq!(store.get("ro.crypto.state").as_deref(), Some("encrypted"));
        assert_eq!(store.get("missing"), None);
    }
}
