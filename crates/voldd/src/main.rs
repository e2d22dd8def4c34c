mod cli;
mod collaborators;

use clap::Parser;
use std::sync::mpsc;
use std::sync::Arc;
use voldd_core::{Collaborators, DirectVolume, Volume, VolumeConfig, VolumeFlags};
use voldd_manager::VolumeManager;
use voldd_proto::{BlockEvent, NullBroadcaster};

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let fstab_contents = std::fs::read_to_string(&args.fstab)?;
    let records = voldd_proto::fstab::parse(&fstab_contents)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    log::info!("loaded {} volume record(s) from {}", records.len(), args.fstab.display());

    let properties: Arc<dyn voldd_proto::PropertyStore> =
        Arc::new(collaborators::InMemoryPropertyStore::default());

    let mut manager = VolumeManager::new(args.runtime_config());
    for record in &records {
        let mut flags = VolumeFlags::empty();
        if record.flags.encryptable {
            flags |= VolumeFlags::ENCRYPTABLE;
        }
        if record.flags.nonremovable {
            flags |= VolumeFlags::NONREMOVABLE;
        }
        if record.flags.nofuse {
            flags |= VolumeFlags::NOFUSE;
        }

        let mut sysfs_paths = vec![record.blk_device.clone()];
        sysfs_paths.extend(record.blk_device2.iter().cloned());

        let volume = Volume::new(
            VolumeConfig {
                label: record.label.clone(),
                mount_point: format!("/storage/{}", record.label),
                fs_type_hint: Some(record.fs_type.clone()),
                flags,
                sysfs_paths,
            },
            Collaborators {
                broadcaster: Arc::new(NullBroadcaster),
                process_killer: Arc::new(collaborators::SignalProcessKiller),
                crypto: Arc::new(collaborators::NoopCryptoProvider),
                asec: Arc::new(collaborators::AsecBindController),
                fuse: Arc::new(collaborators::FuseServiceController { properties: properties.clone() }),
                properties: properties.clone(),
            },
        );
        manager.register(DirectVolume::new(volume));
        log::info!("registered volume {:?}", record.label);
    }

    let manager = Arc::new(manager);

    // One ingress thread feeds block events over this channel (§5); the
    // decoder that turns raw netlink messages into `BlockEvent`s is an
    // external collaborator and lives outside this workspace (§1).
    let (event_tx, event_rx) = mpsc::channel::<BlockEvent>();
    drop(event_tx);

    run_event_loop(&manager, event_rx);
    Ok(())
}

/// Owns the receiving end of the block-event channel. Each event is
/// dispatched on its own worker thread so a long mount/unmount triggered
/// by one volume's event never blocks ingress for another volume
/// (§5) — per-volume serialization is still enforced by each `Volume`'s
/// own mutex.
fn run_event_loop(manager: &Arc<VolumeManager>, event_rx: mpsc::Receiver<BlockEvent>) {
    for event in event_rx {
        let manager = Arc::clone(manager);
        std::thread::spawn(move || {
            manager.dispatch(&event);
        });
    }
    log::info!("event ingress channel closed, shutting down");
}
