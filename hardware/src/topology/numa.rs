// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! NUMA nodes and what hangs off them.

use crate::NumaId;
use crate::pci::address::PciAddress;
use crate::topology::device::{PciDevice, PciDevices};

/// A CPU core.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct CpuCore {
    pub id: u32,
    pub numa_node: NumaId,
}

/// A range of PCI buses within one domain, attached to a NUMA node.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PciBus {
    pub low_address: PciAddress,
    pub high_address: PciAddress,
    pub numa_node: NumaId,
}

impl PciBus {
    #[must_use]
    pub fn new(numa_node: NumaId, low_address: PciAddress, high_address: PciAddress) -> Self {
        Self {
            low_address,
            high_address,
            numa_node,
        }
    }

    /// Returns true if `address` is on one of the buses in this range.
    #[must_use]
    pub fn contains(&self, address: &PciAddress) -> bool {
        self.low_address.domain() == address.domain()
            && self.low_address.vmd_address() == address.vmd_address()
            && (self.low_address.bus()..=self.high_address.bus()).contains(&address.bus())
    }

    /// Returns true if both describe the same bus range.
    #[must_use]
    pub fn same_range(&self, other: &PciBus) -> bool {
        self.low_address == other.low_address && self.high_address == other.high_address
    }
}

/// A NUMA node with its cores, PCI buses and PCI devices.
///
/// The node owns its devices. Devices remember which node and bus they
/// belong to, so adding a bus after a device still links the two.
///
/// # Examples
///
/// ```
/// use hwtopo_hardware::pci::address::PciAddress;
/// use hwtopo_hardware::topology::device::{DeviceType, PciDevice};
/// use hwtopo_hardware::topology::numa::{NumaNode, PciBus};
///
/// let low = PciAddress::try_from("0000:00:00.0").unwrap();
/// let high = PciAddress::try_from("0000:0f:00.0").unwrap();
/// let eth0 = PciDevice::new("eth0", DeviceType::NetInterface, PciAddress::try_from("0000:01:00.0").unwrap());
///
/// let node = NumaNode::new(1)
///     .with_cores([0, 1, 2, 3])
///     .with_devices([eth0])
///     .with_pci_buses([PciBus::new(1, low, high)]);
///
/// let bus = node.pci_buses()[0];
/// assert_eq!(node.bus_devices(&bus).len(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NumaNode {
    id: NumaId,
    cores: Vec<CpuCore>,
    pci_buses: Vec<PciBus>,
    pci_devices: PciDevices,
}

impl NumaNode {
    #[must_use]
    pub fn new(id: NumaId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_cores(mut self, cores: impl IntoIterator<Item = u32>) -> Self {
        for core in cores {
            self.add_core(core);
        }
        self
    }

    #[must_use]
    pub fn with_pci_buses(mut self, buses: impl IntoIterator<Item = PciBus>) -> Self {
        for bus in buses {
            self.add_pci_bus(bus);
        }
        self
    }

    #[must_use]
    pub fn with_devices(mut self, devices: impl IntoIterator<Item = PciDevice>) -> Self {
        for device in devices {
            self.add_device(device);
        }
        self
    }

    #[must_use]
    pub fn id(&self) -> NumaId {
        self.id
    }

    #[must_use]
    pub fn cores(&self) -> &[CpuCore] {
        &self.cores
    }

    #[must_use]
    pub fn pci_buses(&self) -> &[PciBus] {
        &self.pci_buses
    }

    #[must_use]
    pub fn pci_devices(&self) -> &PciDevices {
        &self.pci_devices
    }

    #[must_use]
    pub fn has_core(&self, id: u32) -> bool {
        self.cores.iter().any(|core| core.id == id)
    }

    /// Adds a core. Returns false if the core was already present.
    pub fn add_core(&mut self, id: u32) -> bool {
        if self.has_core(id) {
            return false;
        }
        self.cores.push(CpuCore {
            id,
            numa_node: self.id,
        });
        true
    }

    /// Adds a bus range to this node.
    ///
    /// Devices already on the node that fall in the range and have no bus
    /// yet are attached to it. Returns false if the range was already
    /// present.
    pub fn add_pci_bus(&mut self, bus: PciBus) -> bool {
        if self.pci_buses.iter().any(|known| known.same_range(&bus)) {
            return false;
        }
        let bus = PciBus {
            numa_node: self.id,
            ..bus
        };
        for device in self.pci_devices.iter_mut() {
            if device.pci_bus.is_none() && bus.contains(&device.address) {
                device.pci_bus = Some(bus);
            }
        }
        self.pci_buses.push(bus);
        true
    }

    /// Adds a device, linking it to this node and to the bus it sits on.
    pub fn add_device(&mut self, mut device: PciDevice) {
        device.numa_node = Some(self.id);
        device.pci_bus = self
            .pci_buses
            .iter()
            .find(|bus| bus.contains(&device.address))
            .copied();
        self.pci_devices.add(device);
    }

    /// Devices sitting on `bus`.
    #[must_use]
    pub fn bus_devices(&self, bus: &PciBus) -> Vec<&PciDevice> {
        self.pci_devices
            .iter()
            .filter(|device| device.pci_bus.is_some_and(|b| b.same_range(bus)))
            .collect()
    }

    pub(crate) fn pci_devices_mut(&mut self) -> &mut PciDevices {
        &mut self.pci_devices
    }

    pub(crate) fn into_pci_devices(self) -> PciDevices {
        self.pci_devices
    }
}
