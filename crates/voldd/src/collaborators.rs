//! Default collaborator implementations (§4.7). These are safe,
//! dependency-free stand-ins for the real OS mechanisms; a production
//! embedding framework is expected to supply its own.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use voldd_proto::{AsecController, CryptoProvider, FuseController, ProcessKiller, PropertyStore};

pub struct SignalProcessKiller;

impl ProcessKiller for SignalProcessKiller {
    fn signal_busy(&self, mount_point: &Path, force: bool) -> std::io::Result<()> {
        let signal = if force { "-KILL" } else { "-HUP" };
        log::warn!("signalling processes holding {} open ({signal})", mount_point.display());
        Command::new("fuser")
            .arg(signal)
            .arg("-m")
            .arg(mount_point)
            .status()
            .map(|_| ())
    }
}

/// Remaps a block device through device-mapper crypto. This workspace
/// has no real `cryptfs` integration; it returns the device unchanged
/// and logs, so the `ENCRYPTABLE` mount path is exercised without a real
/// dm-crypt target present.
pub struct NoopCryptoProvider;

impl CryptoProvider for NoopCryptoProvider {
    fn setup(&self, kernel_device: &Path) -> std::io::Result<PathBuf> {
        log::debug!("crypto setup (noop) for {}", kernel_device.display());
        Ok(kernel_device.to_path_buf())
    }
}

pub struct AsecBindController;

impl AsecController for AsecBindController {
    fn mount(&self, container_id: &str) -> std::io::Result<()> {
        log::info!("binding ASEC container {container_id} at /mnt/secure/asec");
        Command::new("mount")
            .args(["--bind", "/mnt/asec", "/mnt/secure/asec"])
            .status()
            .map(|_| ())
    }

    fn cleanup(&self, container_id: &str, force: bool) -> std::io::Result<()> {
        log::info!("cleaning up ASEC container {container_id} (force={force})");
        let mut cmd = Command::new("umount");
        if force {
            cmd.arg("-f");
        }
        cmd.arg("/mnt/secure/asec").status().map(|_| ())
    }
}

/// Starts/stops the per-volume FUSE daemon via the `ctl.start`/`ctl.stop`
/// property protocol (§6).
pub struct FuseServiceController {
    pub properties: Arc<dyn PropertyStore>,
}

impl FuseController for FuseServiceController {
    fn start(&self, label: &str, raw_path: &Path, fuse_path: &Path) -> std::io::Result<()> {
        log::info!(
            "starting fuse_{label}: {} -> {}",
            raw_path.display(),
            fuse_path.display()
        );
        self.properties.set("ctl.start", &format!("fuse_{label}"));
        Ok(())
    }

    fn stop(&self, label: &str) -> std::io::Result<()> {
        log::info!("stopping fuse_{label}");
        self.properties.set("ctl.stop", &format!("fuse_{label}"));
        Ok(())
    }
}

/// In-process property store (§5, §6). A real embedding would back this
/// with the host's actual property service.
#[derive(Default)]
pub struct InMemoryPropertyStore(Mutex<HashMap<String, String>>);

impl PropertyStore for InMemoryPropertyStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.0.lock().unwrap().insert(key.to_string(), value.to_string());
    }
}
