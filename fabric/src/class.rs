// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Network device hardware classes and operational states.

/// Hardware class of a network device, as the kernel's ARP hardware type
/// (`ARPHRD_*`).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct NetDevClass(pub u32);

impl NetDevClass {
    pub const NETROM: Self = Self(0);
    pub const ETHER: Self = Self(1);
    pub const EETHER: Self = Self(2);
    pub const AX25: Self = Self(3);
    pub const PRONET: Self = Self(4);
    pub const CHAOS: Self = Self(5);
    pub const IEEE802: Self = Self(6);
    pub const ARCNET: Self = Self(7);
    pub const APPLETLK: Self = Self(8);
    pub const DLCI: Self = Self(15);
    pub const ATM: Self = Self(19);
    pub const METRICOM: Self = Self(23);
    pub const IEEE1394: Self = Self(24);
    pub const EUI64: Self = Self(27);
    pub const INFINIBAND: Self = Self(32);
    pub const LOOPBACK: Self = Self(772);
    /// Matches any class.
    pub const ANY: Self = Self(u32::MAX);

    /// Name of a known class.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::NETROM => "NETROM",
            Self::ETHER => "ETHER",
            Self::EETHER => "EETHER",
            Self::AX25 => "AX25",
            Self::PRONET => "PRONET",
            Self::CHAOS => "CHAOS",
            Self::IEEE802 => "IEEE802",
            Self::ARCNET => "ARCNET",
            Self::APPLETLK => "APPLETLK",
            Self::DLCI => "DLCI",
            Self::ATM => "ATM",
            Self::METRICOM => "METRICOM",
            Self::IEEE1394 => "IEEE1394",
            Self::EUI64 => "EUI64",
            Self::INFINIBAND => "INFINIBAND",
            Self::LOOPBACK => "LOOPBACK",
            Self::ANY => "ANY",
            _ => return None,
        })
    }
}

impl std::fmt::Display for NetDevClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "UNKNOWN (0x{:x})", self.0),
        }
    }
}

impl From<u32> for NetDevClass {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Operational state of a network device.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    strum::Display,
    strum::EnumIs,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum NetDevState {
    #[default]
    #[strum(serialize = "unknown")]
    Unknown,
    #[strum(serialize = "not ready")]
    NotReady,
    #[strum(serialize = "ready")]
    Ready,
    #[strum(serialize = "down")]
    Down,
}
