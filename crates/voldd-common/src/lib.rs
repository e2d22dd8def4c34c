//! Byte/number/string primitives shared by the voldd filesystem probes.
//!
//! Unlike the upstream filesystem-format crates this workspace grew out of,
//! voldd always runs as a hosted daemon, so this crate (and everything
//! downstream of it) targets `std` unconditionally rather than carrying
//! `no_std` support that has no consumer here.

pub mod str;
pub mod types;
