//! Typed block hot-plug event (§4.6, §6). Decoding the raw netlink
//! message into this shape is the ingress thread's job and stays external
//! to this workspace (§1); this type is the boundary it hands events
//! across.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    Remove,
    Change,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevType {
    Disk,
    Partition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEvent {
    pub action: Action,
    pub devpath: String,
    pub devtype: DevType,
    pub major: u32,
    pub minor: u32,
    pub params: HashMap<String, String>,
}

impl BlockEvent {
    /// `NPARTS`; missing defaults to 1 (§4.4.2).
    pub fn nparts(&self) -> u32 {
        self.params
            .get("NPARTS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }

    /// `PARTN`, 1-based; missing defaults to 1 (§4.4.3).
    pub fn partn(&self) -> u32 {
        self.params
            .get("PARTN")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }

    pub fn devname(&self) -> Option<&str> {
        self.params.get("DEVNAME").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(params: &[(&str, &str)]) -> BlockEvent {
        BlockEvent {
            action: Action::Add,
            devpath: "/devices/platform/soc/usb".into(),
            devtype: DevType::Disk,
            major: 8,
            minor: 0,
            params: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn nparts_defaults_to_one() {
        assert_eq!(event(&[]).nparts(), 1);
    }

    #[test]
    fn nparts_reads_param() {
        assert_eq!(event(&[("NPARTS", "3")]).nparts(), 3);
    }

    #[test]
    fn partn_defaults_to_one() {
        assert_eq!(event(&[]).partn(), 1);
    }
}
