//! Command-line surface (§4.9, ambient). Replaces the source's four
//! `#ifdef` build variants with runtime flags threaded into a single
//! [`voldd_core::RuntimeConfig`].

use clap::Parser;
use std::path::PathBuf;
use voldd_core::RuntimeConfig;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum FsChecks {
    Enabled,
    Disabled,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the fstab-format volume configuration file.
    #[arg(default_value = "/etc/vold.fstab")]
    pub fstab: PathBuf,

    /// Toggles the check (C2) step of the mount pipeline.
    #[arg(long, value_enum, default_value_t = FsChecks::Enabled)]
    pub fs_checks: FsChecks,

    /// Enables mounting secondary candidate partitions under
    /// `<mountpoint>/<label>{2,3,...}`.
    #[arg(long)]
    pub multi_mount: bool,

    /// Enables the optional `VolumeDiskPrepared` broadcast.
    #[arg(long)]
    pub prepared_stage: bool,

    /// Simulates `ro.crypto.state=encrypted` for the `ENCRYPTABLE` mount
    /// path.
    #[arg(long)]
    pub encrypted_boot: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            fs_checks_enabled: matches!(self.fs_checks, FsChecks::Enabled),
            multi_mount: self.multi_mount,
            prepared_stage: self.prepared_stage,
            encrypted_boot: self.encrypted_boot,
        }
    }
}
