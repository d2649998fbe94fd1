// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI device addressing.
//!
//! Addresses use the extended BDF (Bus Device Function) notation:
//! `domain:bus:device.function` (e.g. `0000:03:00.0`).
//!
//! # Address Components
//!
//! - **Domain**: 16-bit value (0x0000-0xFFFF)
//! - **Bus**: 8-bit value (0x00-0xFF)
//! - **Device**: 5-bit value (0x00-0x1F), represented as 8-bit
//! - **Function**: 3-bit value (0x0-0x7), represented as 8-bit
//!
//! # VMD backing devices
//!
//! Devices sitting behind a VMD (Volume Management Device) fan-out
//! controller are reported with a six hex digit domain which does not fit in
//! 16 bits. That domain is the packed BDF of the controller itself: digits
//! 0-1 are its bus, 2-3 its device and 5 its function, on domain `0000`.
//!
//! ```
//! use hwtopo_hardware::pci::address::PciAddress;
//!
//! let backing = PciAddress::try_from("5d0505:01:00.0").unwrap();
//! assert!(backing.is_vmd_backing_address());
//! assert_eq!(backing.domain(), 0xffff);
//! assert_eq!(backing.to_string(), "5d0505:01:00.0");
//! assert_eq!(
//!     backing.backing_to_vmd_address().unwrap().to_string(),
//!     "0000:5d:05.5"
//! );
//! ```

use std::str::FromStr;

/// Largest valid PCI device number.
pub const MAX_DEVICE: u8 = 0x1f;
/// Largest valid PCI function number.
pub const MAX_FUNCTION: u8 = 0x7;

/// Domain reported for devices behind a VMD controller.
const VMD_DOMAIN: u16 = 0xffff;

/// Address of a VMD controller.
///
/// VMD controllers always live in domain `0000`, so only bus, device and
/// function are recorded.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    rkyv::Archive,
    rkyv::Deserialize,
    rkyv::Serialize,
)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct VmdAddress {
    bus: u8,
    device: u8,
    function: u8,
}

impl VmdAddress {
    /// Creates the address of a VMD controller at `0000:bus:device.function`.
    ///
    /// # Errors
    ///
    /// Returns an error if `device` or `function` is out of range.
    pub fn new(bus: u8, device: u8, function: u8) -> Result<Self, InvalidPciAddress> {
        check_device_function(device, function)?;
        Ok(Self {
            bus,
            device,
            function,
        })
    }

    /// Bus of the controller.
    #[must_use]
    pub fn bus(&self) -> u8 {
        self.bus
    }

    /// Device of the controller.
    #[must_use]
    pub fn device(&self) -> u8 {
        self.device
    }

    /// Function of the controller.
    #[must_use]
    pub fn function(&self) -> u8 {
        self.function
    }

    /// Decodes a packed six hex digit domain into a controller address.
    fn unpack(domain: u32) -> Result<Self, InvalidPciAddress> {
        let bus = (domain >> 16) & 0xff;
        let device = (domain >> 8) & 0xff;
        let function = domain & 0xf;
        #[allow(clippy::cast_possible_truncation)] // masked above
        Self::new(bus as u8, device as u8, function as u8)
    }

    /// The controller's address packed back into domain form.
    fn packed(self) -> String {
        format!("{:02x}{:02x}{:02x}", self.bus, self.device, self.function)
    }
}

impl std::fmt::Display for VmdAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "0000:{:02x}:{:02x}.{:01x}",
            self.bus, self.device, self.function
        )
    }
}

impl From<VmdAddress> for PciAddress {
    fn from(value: VmdAddress) -> Self {
        PciAddress {
            vmd: None,
            domain: 0,
            bus: value.bus,
            device: value.device,
            function: value.function,
        }
    }
}

impl From<VmdAddress> for String {
    fn from(value: VmdAddress) -> String {
        value.to_string()
    }
}

impl TryFrom<String> for VmdAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let address = PciAddress::from_str(&value)?;
        if address.domain != 0 || address.vmd.is_some() {
            return Err(InvalidPciAddress::Syntax(value));
        }
        Self::new(address.bus, address.device, address.function)
    }
}

/// A PCI device address.
///
/// Equality requires matching VMD controllers (or both absent) and an exact
/// BDF match. Addresses order by VMD controller first (plain addresses sort
/// before backing addresses), then by domain, bus, device and function.
///
/// # Examples
///
/// ```
/// use hwtopo_hardware::pci::address::PciAddress;
///
/// let addr = PciAddress::new(1, 2, 3, 4).unwrap();
/// let parsed = PciAddress::try_from("0001:02:03.4").unwrap();
/// assert_eq!(addr, parsed);
/// ```
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    rkyv::Archive,
    rkyv::Deserialize,
    rkyv::Serialize,
)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct PciAddress {
    // field order drives the derived ordering
    vmd: Option<VmdAddress>,
    domain: u16,
    bus: u8,
    device: u8,
    function: u8,
}

impl PciAddress {
    /// Creates a new PCI address from its components.
    ///
    /// # Errors
    ///
    /// Returns an error if `device` or `function` is out of range.
    pub fn new(domain: u16, bus: u8, device: u8, function: u8) -> Result<Self, InvalidPciAddress> {
        check_device_function(device, function)?;
        Ok(Self {
            vmd: None,
            domain,
            bus,
            device,
            function,
        })
    }

    /// Creates the address of a device sitting behind the VMD controller at
    /// `vmd`.
    ///
    /// # Errors
    ///
    /// Returns an error if `device` or `function` is out of range.
    pub fn new_vmd_backing(
        vmd: VmdAddress,
        bus: u8,
        device: u8,
        function: u8,
    ) -> Result<Self, InvalidPciAddress> {
        check_device_function(device, function)?;
        Ok(Self {
            vmd: Some(vmd),
            domain: VMD_DOMAIN,
            bus,
            device,
            function,
        })
    }

    /// PCI domain. Always `0xffff` for VMD backing addresses.
    #[must_use]
    pub fn domain(&self) -> u16 {
        self.domain
    }

    /// PCI bus number.
    #[must_use]
    pub fn bus(&self) -> u8 {
        self.bus
    }

    /// Device number on the bus.
    #[must_use]
    pub fn device(&self) -> u8 {
        self.device
    }

    /// Function number within the device.
    #[must_use]
    pub fn function(&self) -> u8 {
        self.function
    }

    /// The VMD controller this device sits behind, if any.
    #[must_use]
    pub fn vmd_address(&self) -> Option<VmdAddress> {
        self.vmd
    }

    /// Returns true if this is the address of a device behind a VMD
    /// controller.
    #[must_use]
    pub fn is_vmd_backing_address(&self) -> bool {
        self.vmd.is_some()
    }

    /// Returns the address of the VMD controller this device sits behind.
    ///
    /// # Errors
    ///
    /// Returns [`NotVmdBackingAddress`] if this address is not behind a VMD
    /// controller.
    pub fn backing_to_vmd_address(&self) -> Result<PciAddress, NotVmdBackingAddress> {
        match self.vmd {
            Some(vmd) => Ok(vmd.into()),
            None => Err(NotVmdBackingAddress(*self)),
        }
    }
}

impl std::fmt::Display for PciAddress {
    /// Formats the address as `DDDD:BB:DD.F`, or `VVVVVV:BB:DD.F` with the
    /// packed VMD controller address as domain.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.vmd {
            Some(vmd) => write!(f, "{}", vmd.packed())?,
            None => write!(f, "{:04x}", self.domain)?,
        }
        write!(
            f,
            ":{:02x}:{:02x}.{:01x}",
            self.bus, self.device, self.function
        )
    }
}

/// Errors that can occur when parsing or building a PCI address.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPciAddress {
    /// Invalid address syntax.
    #[error("Invalid syntax (should be domain:bus:device.function): {0:?}")]
    Syntax(String),
    /// A component is not a hex number of acceptable width.
    #[error("Invalid PCI {component}: {value:?}")]
    Component {
        /// Which component failed to parse.
        component: &'static str,
        /// The offending text.
        value: String,
    },
    /// Device number larger than 0x1f.
    #[error("PCI device {0:#04x} out of range (max {MAX_DEVICE:#04x})")]
    Device(u8),
    /// Function number larger than 0x7.
    #[error("PCI function {0:#x} out of range (max {MAX_FUNCTION:#x})")]
    Function(u8),
}

/// Error returned when asking for the VMD controller of an address that is
/// not behind one.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0} is not a VMD backing address")]
pub struct NotVmdBackingAddress(pub PciAddress);

fn check_device_function(device: u8, function: u8) -> Result<(), InvalidPciAddress> {
    if device > MAX_DEVICE {
        return Err(InvalidPciAddress::Device(device));
    }
    if function > MAX_FUNCTION {
        return Err(InvalidPciAddress::Function(function));
    }
    Ok(())
}

fn parse_component(
    component: &'static str,
    value: &str,
    max_digits: usize,
) -> Result<u32, InvalidPciAddress> {
    let invalid = || InvalidPciAddress::Component {
        component,
        value: value.to_string(),
    };
    if value.is_empty() || value.len() > max_digits || !value.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(invalid());
    }
    u32::from_str_radix(value, 16).map_err(|_| invalid())
}

impl FromStr for PciAddress {
    type Err = InvalidPciAddress;

    /// Parses a PCI address.
    ///
    /// The domain may have up to six hex digits; a domain too large for
    /// 16 bits is decoded as a packed VMD controller address.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let syntax = || InvalidPciAddress::Syntax(value.to_string());
        let mut parts = value.trim().split(':');
        let (Some(domain), Some(bus), Some(dev_func), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(syntax());
        };
        let Some((device, function)) = dev_func.split_once('.') else {
            return Err(syntax());
        };

        let domain = parse_component("domain", domain, 6)?;
        let bus = parse_component("bus", bus, 2)?;
        let device = parse_component("device", device, 2)?;
        let function = parse_component("function", function, 1)?;

        #[allow(clippy::cast_possible_truncation)] // widths checked while parsing
        let (bus, device, function) = (bus as u8, device as u8, function as u8);
        match u16::try_from(domain) {
            Ok(domain) => Self::new(domain, bus, device, function),
            Err(_) => Self::new_vmd_backing(VmdAddress::unpack(domain)?, bus, device, function),
        }
    }
}

impl TryFrom<&str> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

impl TryFrom<String> for PciAddress {
    type Error = InvalidPciAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<PciAddress> for String {
    fn from(value: PciAddress) -> String {
        format!("{value}")
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use bolero::{Driver, TypeGenerator};

    use crate::pci::address::{MAX_DEVICE, MAX_FUNCTION, PciAddress, VmdAddress};

    impl TypeGenerator for VmdAddress {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            // a zero bus would pack into a domain that still fits 16 bits
            let bus = driver.produce::<u8>()?.max(1);
            let device = driver.produce::<u8>()? & MAX_DEVICE;
            let function = driver.produce::<u8>()? & MAX_FUNCTION;
            VmdAddress::new(bus, device, function).ok()
        }
    }

    impl TypeGenerator for PciAddress {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let bus = driver.produce::<u8>()?;
            let device = driver.produce::<u8>()? & MAX_DEVICE;
            let function = driver.produce::<u8>()? & MAX_FUNCTION;
            match driver.produce::<Option<VmdAddress>>()? {
                Some(vmd) => PciAddress::new_vmd_backing(vmd, bus, device, function).ok(),
                None => PciAddress::new(driver.produce()?, bus, device, function).ok(),
            }
        }
    }
}
