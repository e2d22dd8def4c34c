//! Event ingress / framework egress types (C6): the typed block event and
//! broadcast that cross the boundary to/from the embedding framework, the
//! fstab parser, and the external-collaborator trait definitions that
//! keep `voldd-core` free of direct OS dependencies.

pub mod broadcast;
pub mod collaborators;
pub mod event;
pub mod fstab;

pub use broadcast::{Broadcast, BroadcastCode, Broadcaster, NullBroadcaster};
pub use collaborators::{AsecController, CryptoProvider, FuseController, ProcessKiller, PropertyStore};
pub use event::{Action, BlockEvent, DevType};
pub use fstab::{FstabError, FstabFlags, FstabRecord};
