// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Physical and virtual devices.

use std::collections::BTreeMap;

use crate::NumaId;
use crate::merge::{Unset, fill_unset};
use crate::pci::address::PciAddress;
use crate::topology::numa::PciBus;

/// What kind of device a topology entry describes.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    strum::EnumIs,
    strum::Display,
    strum::IntoStaticStr,
)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum DeviceType {
    #[default]
    #[strum(to_string = "unknown")]
    Unknown,
    /// An OS network interface (e.g. `eth0`, `ib0`).
    #[strum(to_string = "network interface")]
    NetInterface,
    /// An OFI fabric domain (e.g. `mlx5_0`).
    #[strum(to_string = "OFI domain")]
    OfiDomain,
    /// An OS block device.
    #[strum(to_string = "block device")]
    Block,
}

impl Unset for DeviceType {
    fn is_unset(&self) -> bool {
        self.is_unknown()
    }
}

/// A block device exposed by the OS on top of a PCI device.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct BlockDevice {
    pub name: String,
}

impl BlockDevice {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A device found on the PCI bus.
///
/// `numa_node` and `pci_bus` point back at the owning NUMA node and bus.
/// They are filled in when the device is added to a
/// [`NumaNode`](crate::topology::numa::NumaNode) and are not owned by the
/// device.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PciDevice {
    pub name: String,
    pub device_type: DeviceType,
    pub address: PciAddress,
    /// Link speed in Gb/s, zero if unknown.
    pub link_speed: f64,
    pub numa_node: Option<NumaId>,
    pub pci_bus: Option<PciBus>,
    pub block_device: Option<BlockDevice>,
}

impl PciDevice {
    #[must_use]
    pub fn new(name: impl Into<String>, device_type: DeviceType, address: PciAddress) -> Self {
        Self {
            name: name.into(),
            device_type,
            address,
            link_speed: 0.0,
            numa_node: None,
            pci_bus: None,
            block_device: None,
        }
    }

    #[must_use]
    pub fn with_link_speed(mut self, link_speed: f64) -> Self {
        self.link_speed = link_speed;
        self
    }

    #[must_use]
    pub fn with_block_device(mut self, block_device: BlockDevice) -> Self {
        self.block_device = Some(block_device);
        self
    }

    /// Copies the fields `incoming` knows and this device does not.
    pub(crate) fn fill_from(&mut self, incoming: PciDevice) {
        fill_unset(&mut self.device_type, incoming.device_type);
        fill_unset(&mut self.link_speed, incoming.link_speed);
        fill_unset(&mut self.block_device, incoming.block_device);
    }
}

/// A device with no PCI address of its own, e.g. a bond or a VLAN
/// interface.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct VirtualDevice {
    pub name: String,
    pub device_type: DeviceType,
    /// Name of the physical device this one rides on.
    pub backing_device: Option<String>,
}

impl VirtualDevice {
    #[must_use]
    pub fn new(name: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            name: name.into(),
            device_type,
            backing_device: None,
        }
    }

    #[must_use]
    pub fn with_backing_device(mut self, backing_device: impl Into<String>) -> Self {
        self.backing_device = Some(backing_device.into());
        self
    }

    pub(crate) fn fill_from(&mut self, incoming: VirtualDevice) {
        fill_unset(&mut self.device_type, incoming.device_type);
        fill_unset(&mut self.backing_device, incoming.backing_device);
    }
}

/// A device in the topology, physical or virtual.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeviceRef<'a> {
    Pci(&'a PciDevice),
    Virtual(&'a VirtualDevice),
}

impl DeviceRef<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            DeviceRef::Pci(device) => &device.name,
            DeviceRef::Virtual(device) => &device.name,
        }
    }

    #[must_use]
    pub fn device_type(&self) -> DeviceType {
        match self {
            DeviceRef::Pci(device) => device.device_type,
            DeviceRef::Virtual(device) => device.device_type,
        }
    }

    #[must_use]
    pub fn is_virtual(&self) -> bool {
        matches!(self, DeviceRef::Virtual(_))
    }
}

/// PCI devices of one NUMA node, grouped by address.
///
/// Several devices may share an address: a network adapter typically shows
/// up as both an OS network interface and an OFI domain.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct PciDevices(BTreeMap<PciAddress, Vec<PciDevice>>);

impl PciDevices {
    /// Adds a device under its address.
    pub fn add(&mut self, device: PciDevice) {
        self.0.entry(device.address).or_default().push(device);
    }

    /// Devices at `address`, in insertion order.
    #[must_use]
    pub fn get(&self, address: &PciAddress) -> &[PciDevice] {
        self.0.get(address).map_or(&[], Vec::as_slice)
    }

    /// The device at `address` called `name`.
    #[must_use]
    pub fn find(&self, address: &PciAddress, name: &str) -> Option<&PciDevice> {
        self.get(address).iter().find(|device| device.name == name)
    }

    pub(crate) fn find_mut(&mut self, address: &PciAddress, name: &str) -> Option<&mut PciDevice> {
        self.0
            .get_mut(address)?
            .iter_mut()
            .find(|device| device.name == name)
    }

    /// Addresses with at least one device, in order.
    pub fn keys(&self) -> impl Iterator<Item = &PciAddress> {
        self.0.keys()
    }

    /// All devices, by address.
    pub fn iter(&self) -> impl Iterator<Item = &PciDevice> {
        self.0.values().flatten()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut PciDevice> {
        self.0.values_mut().flatten()
    }

    #[must_use]
    pub fn num_devices(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for PciDevices {
    type Item = PciDevice;
    type IntoIter = std::iter::Flatten<std::collections::btree_map::IntoValues<PciAddress, Vec<PciDevice>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values().flatten()
    }
}
