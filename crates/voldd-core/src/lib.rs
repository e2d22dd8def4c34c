//! Per-volume state machine, mount/unmount/format pipelines (C3), and
//! block-event-driven disk/partition tracking (C4).

pub mod config;
pub mod direct_volume;
pub mod error;
pub mod mountpoint;
pub mod state;
pub mod volume;

pub use config::RuntimeConfig;
pub use direct_volume::DirectVolume;
pub use error::VoldError;
pub use state::VolumeState;
pub use volume::{Collaborators, Volume, VolumeConfig, VolumeFlags, MAX_MOUNT_PART, MAX_PARTITIONS};
