//! Error taxonomy (§7), mapped to OS error numbers at the boundary each
//! RPC handler returns across.

#[derive(Debug, thiserror::Error)]
pub enum VoldError {
    /// State does not permit the operation (`ENODEV`).
    #[error("no media present")]
    NoMedia,
    /// Volume in a transient state (`EBUSY`).
    #[error("volume busy")]
    Busy,
    /// Filesystem not buildable here (`ENOTSUP`/`ENODATA`).
    #[error("filesystem not supported")]
    NotSupported,
    /// Check failed beyond repair (`EIO`).
    #[error("filesystem corrupt: {0}")]
    CorruptFs(String),
    /// Underlying read/write failed (`EIO`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Called in the wrong state (`EINVAL`).
    #[error("invalid operation in current state: {0}")]
    Invariant(String),
    /// Label buffer undersized (`ERANGE`).
    #[error("value out of range: {0}")]
    Range(String),
    #[error(transparent)]
    Probe(#[from] voldd_fsprobe::ProbeError),
    #[error(transparent)]
    Driver(#[from] voldd_fsdriver::DriverError),
}

impl VoldError {
    /// Maps each taxonomy kind to the errno a command RPC would surface
    /// back to the framework (§7).
    pub fn errno(&self) -> i32 {
        match self {
            VoldError::NoMedia => libc_errno::ENODEV,
            VoldError::Busy => libc_errno::EBUSY,
            VoldError::NotSupported => libc_errno::ENOTSUP,
            VoldError::CorruptFs(_) | VoldError::Io(_) | VoldError::Driver(_) => libc_errno::EIO,
            VoldError::Invariant(_) => libc_errno::EINVAL,
            VoldError::Range(_) => libc_errno::ERANGE,
            VoldError::Probe(_) => libc_errno::ENODATA,
        }
    }
}

/// Avoids a dependency on the `libc` crate for six integer constants;
/// values match Linux's `errno.h`.
mod libc_errno {
    pub const ENODEV: i32 = 19;
    pub const EBUSY: i32 = 16;
    pub const ENOTSUP: i32 = 95;
    pub const EIO: i32 = 5;
    pub const EINVAL: i32 = 22;
    pub const ERANGE: i32 = 34;
    pub const ENODATA: i32 = 61;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_errno() {
        assert_eq!(VoldError::NoMedia.errno(), 19);
        assert_eq!(VoldError::Busy.errno(), 16);
        assert_eq!(VoldError::NotSupported.errno(), 95);
        assert_eq!(VoldError::Invariant("bad state".into()).errno(), 22);
        assert_eq!(VoldError::Range("label too long".into()).errno(), 34);
    }
}
