// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! NUMA and PCI topology of a machine.
//!
//! Discovery backends each build a [`Topology`] of what they can see. The
//! partial topologies are then combined with [`Topology::merge`], which only
//! ever adds information.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::NumaId;

pub mod device;
pub mod numa;

pub use device::{BlockDevice, DeviceRef, DeviceType, PciDevice, PciDevices, VirtualDevice};
pub use numa::{CpuCore, NumaNode, PciBus};

/// Errors raised while querying or combining topologies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("NUMA node {0} not found")]
    NumaNodeNotFound(NumaId),
    #[error("device {0:?} not found")]
    DeviceNotFound(String),
    #[error("device name {0:?} is used by both a physical and a virtual device")]
    NameCollision(String),
    #[error("backing device {backing:?} of virtual device {name:?} not found")]
    BackingDeviceNotFound { name: String, backing: String },
    #[error("backing device {backing:?} of virtual device {name:?} is a virtual device")]
    BackingDeviceIsVirtual { name: String, backing: String },
}

/// NUMA nodes of a machine and the devices attached to them.
///
/// # Examples
///
/// ```
/// use hwtopo_hardware::pci::address::PciAddress;
/// use hwtopo_hardware::topology::{DeviceType, PciDevice, Topology, VirtualDevice};
///
/// let mut topology = Topology::new();
/// let address = PciAddress::try_from("0000:18:00.0").unwrap();
/// topology.add_device(1, PciDevice::new("eth0", DeviceType::NetInterface, address));
/// topology
///     .add_virtual_device(
///         VirtualDevice::new("bond0", DeviceType::NetInterface).with_backing_device("eth0"),
///     )
///     .unwrap();
///
/// let backing = topology.pci_device_for("bond0").unwrap();
/// assert_eq!(backing.numa_node, Some(1));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Topology {
    numa_nodes: BTreeMap<NumaId, NumaNode>,
    virtual_devices: Vec<VirtualDevice>,
}

impl Topology {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_numa_nodes(mut self, nodes: impl IntoIterator<Item = NumaNode>) -> Self {
        for node in nodes {
            self.add_numa_node(node);
        }
        self
    }

    /// Adds a NUMA node, returning the node it replaced if any.
    pub fn add_numa_node(&mut self, node: NumaNode) -> Option<NumaNode> {
        self.numa_nodes.insert(node.id(), node)
    }

    /// Adds a device to NUMA node `numa_id`, creating the node if needed.
    pub fn add_device(&mut self, numa_id: NumaId, device: PciDevice) {
        self.numa_nodes
            .entry(numa_id)
            .or_insert_with(|| NumaNode::new(numa_id))
            .add_device(device);
    }

    /// Adds a virtual device, or completes the one with the same name.
    ///
    /// # Errors
    ///
    /// Fails if a physical device has the same name, or if the backing device
    /// is not a known physical device.
    pub fn add_virtual_device(&mut self, device: VirtualDevice) -> Result<(), TopologyError> {
        self.insert_virtual_device(device, &BTreeSet::new())
    }

    /// NUMA nodes in id order.
    pub fn numa_nodes(&self) -> impl Iterator<Item = &NumaNode> {
        self.numa_nodes.values()
    }

    /// # Errors
    ///
    /// Returns [`TopologyError::NumaNodeNotFound`] for an unknown id.
    pub fn numa_node(&self, id: NumaId) -> Result<&NumaNode, TopologyError> {
        self.numa_nodes
            .get(&id)
            .ok_or(TopologyError::NumaNodeNotFound(id))
    }

    #[must_use]
    pub fn num_numa_nodes(&self) -> usize {
        self.numa_nodes.len()
    }

    /// Number of cores on the first NUMA node, zero if there are none.
    ///
    /// Nodes are assumed to be symmetric.
    #[must_use]
    pub fn num_cores_per_numa(&self) -> usize {
        self.numa_nodes
            .values()
            .next()
            .map_or(0, |node| node.cores().len())
    }

    #[must_use]
    pub fn virtual_devices(&self) -> &[VirtualDevice] {
        &self.virtual_devices
    }

    /// Every device by name.
    #[must_use]
    pub fn all_devices(&self) -> BTreeMap<&str, DeviceRef<'_>> {
        self.physical_devices()
            .map(|device| (device.name.as_str(), DeviceRef::Pci(device)))
            .chain(
                self.virtual_devices
                    .iter()
                    .map(|device| (device.name.as_str(), DeviceRef::Virtual(device))),
            )
            .collect()
    }

    /// The device called `name`.
    #[must_use]
    pub fn device(&self, name: &str) -> Option<DeviceRef<'_>> {
        self.physical_device(name)
            .map(DeviceRef::Pci)
            .or_else(|| self.virtual_device(name).map(DeviceRef::Virtual))
    }

    /// The PCI device behind `name`: the device itself if it is physical, its
    /// backing device if it is virtual.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::DeviceNotFound`] if there is no such device,
    /// or if a virtual device has no backing device.
    pub fn pci_device_for(&self, name: &str) -> Result<&PciDevice, TopologyError> {
        let not_found = || TopologyError::DeviceNotFound(name.to_string());
        match self.device(name).ok_or_else(not_found)? {
            DeviceRef::Pci(device) => Ok(device),
            DeviceRef::Virtual(device) => device
                .backing_device
                .as_deref()
                .and_then(|backing| self.physical_device(backing))
                .ok_or_else(not_found),
        }
    }

    /// Virtual devices riding on the physical device `name`.
    pub fn virtual_devices_backed_by<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a VirtualDevice> {
        self.virtual_devices
            .iter()
            .filter(move |device| device.backing_device.as_deref() == Some(name))
    }

    /// Merges `other` into this topology.
    ///
    /// Nothing is ever removed. NUMA nodes, cores, buses, devices and virtual
    /// devices missing here are added; for devices known to both sides only
    /// fields still unset here are taken from `other`. On error this
    /// topology is left unchanged.
    ///
    /// # Errors
    ///
    /// Fails if a physical and a virtual device share a name, or if a virtual
    /// device's backing device is missing or virtual.
    pub fn merge(&mut self, other: Topology) -> Result<(), TopologyError> {
        let mut merged = self.clone();
        for (id, node) in other.numa_nodes {
            for device in node.pci_devices().iter() {
                if merged.virtual_device(&device.name).is_some() {
                    return Err(TopologyError::NameCollision(device.name.clone()));
                }
            }
            let Some(existing) = merged.numa_nodes.get_mut(&id) else {
                trace!("adding NUMA node {id}");
                merged.numa_nodes.insert(id, node);
                continue;
            };
            for core in node.cores() {
                existing.add_core(core.id);
            }
            for bus in node.pci_buses() {
                existing.add_pci_bus(*bus);
            }
            for device in node.into_pci_devices() {
                match existing
                    .pci_devices_mut()
                    .find_mut(&device.address, &device.name)
                {
                    Some(known) => known.fill_from(device),
                    None => existing.add_device(device),
                }
            }
        }
        let incoming_virtual: BTreeSet<String> = other
            .virtual_devices
            .iter()
            .map(|device| device.name.clone())
            .collect();
        for device in other.virtual_devices {
            merged.insert_virtual_device(device, &incoming_virtual)?;
        }
        *self = merged;
        Ok(())
    }

    fn physical_devices(&self) -> impl Iterator<Item = &PciDevice> {
        self.numa_nodes
            .values()
            .flat_map(|node| node.pci_devices().iter())
    }

    fn physical_device(&self, name: &str) -> Option<&PciDevice> {
        self.physical_devices().find(|device| device.name == name)
    }

    fn virtual_device(&self, name: &str) -> Option<&VirtualDevice> {
        self.virtual_devices
            .iter()
            .find(|device| device.name == name)
    }

    /// `pending` names virtual devices about to be inserted alongside this
    /// one.
    fn insert_virtual_device(
        &mut self,
        incoming: VirtualDevice,
        pending: &BTreeSet<String>,
    ) -> Result<(), TopologyError> {
        if self.physical_device(&incoming.name).is_some() {
            return Err(TopologyError::NameCollision(incoming.name));
        }
        let position = self
            .virtual_devices
            .iter()
            .position(|device| device.name == incoming.name);
        let device = match position {
            Some(i) => {
                let mut known = self.virtual_devices[i].clone();
                known.fill_from(incoming);
                known
            }
            None => incoming,
        };
        if let Some(backing) = &device.backing_device {
            if self.physical_device(backing).is_none() {
                let virtual_names: BTreeSet<&str> = self
                    .virtual_devices
                    .iter()
                    .map(|device| device.name.as_str())
                    .collect();
                let (name, backing) = (device.name.clone(), backing.clone());
                if virtual_names.contains(backing.as_str())
                    || pending.contains(&backing)
                    || backing == name
                {
                    return Err(TopologyError::BackingDeviceIsVirtual { name, backing });
                }
                return Err(TopologyError::BackingDeviceNotFound { name, backing });
            }
        }
        match position {
            Some(i) => self.virtual_devices[i] = device,
            None => self.virtual_devices.push(device),
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::pci::address::PciAddress;
    use crate::topology::{
        BlockDevice, DeviceRef, DeviceType, NumaNode, PciBus, PciDevice, Topology, TopologyError,
        VirtualDevice,
    };

    fn addr(s: &str) -> PciAddress {
        PciAddress::try_from(s).unwrap()
    }

    fn two_node_topology() -> Topology {
        Topology::new().with_numa_nodes([
            NumaNode::new(0)
                .with_cores([0, 1])
                .with_pci_buses([PciBus::new(0, addr("0000:00:00.0"), addr("0000:7f:00.0"))])
                .with_devices([
                    PciDevice::new("eth0", DeviceType::NetInterface, addr("0000:18:00.0"))
                        .with_link_speed(100.0),
                    PciDevice::new("mlx5_0", DeviceType::OfiDomain, addr("0000:18:00.0")),
                ]),
            NumaNode::new(1)
                .with_cores([2, 3])
                .with_pci_buses([PciBus::new(1, addr("0000:80:00.0"), addr("0000:ff:00.0"))])
                .with_devices([PciDevice::new(
                    "nvme0",
                    DeviceType::Block,
                    addr("0000:81:00.0"),
                )
                .with_block_device(BlockDevice::new("nvme0n1"))]),
        ])
    }

    #[test]
    fn merge_with_self_is_unchanged() {
        let mut topology = two_node_topology();
        topology
            .add_virtual_device(
                VirtualDevice::new("bond0", DeviceType::NetInterface).with_backing_device("eth0"),
            )
            .unwrap();
        let before = topology.clone();
        topology.merge(before.clone()).unwrap();
        assert_eq!(topology, before);
    }

    #[test]
    fn merge_with_self_is_unchanged_for_any_devices() {
        bolero::check!().with_type().for_each(
            |devices: &Vec<(u8, PciAddress, u8, bool)>| {
                let mut topology = Topology::new();
                for (numa, address, name, is_net) in devices {
                    let device_type = if *is_net {
                        DeviceType::NetInterface
                    } else {
                        DeviceType::OfiDomain
                    };
                    topology.add_device(
                        u32::from(numa % 4),
                        PciDevice::new(format!("dev{}", name % 8), device_type, *address),
                    );
                }
                let before = topology.clone();
                topology.merge(before.clone()).unwrap();
                assert_eq!(topology, before);
            },
        );
    }

    #[test]
    fn merge_adds_new_nodes_and_unions_existing() {
        let mut topology = two_node_topology();
        let other = Topology::new().with_numa_nodes([
            NumaNode::new(0)
                .with_cores([1, 4])
                .with_pci_buses([
                    PciBus::new(0, addr("0000:00:00.0"), addr("0000:7f:00.0")),
                    PciBus::new(0, addr("0001:00:00.0"), addr("0001:0f:00.0")),
                ])
                .with_devices([
                    PciDevice::new("eth0", DeviceType::Unknown, addr("0000:18:00.0"))
                        .with_link_speed(25.0),
                    PciDevice::new("eth2", DeviceType::NetInterface, addr("0001:01:00.0")),
                ]),
            NumaNode::new(3).with_cores([8]),
        ]);
        topology.merge(other).unwrap();

        assert_eq!(topology.num_numa_nodes(), 3);
        let node0 = topology.numa_node(0).unwrap();
        let cores: Vec<_> = node0.cores().iter().map(|core| core.id).collect();
        assert_eq!(cores, vec![0, 1, 4]);
        assert_eq!(node0.pci_buses().len(), 2);

        let eth0 = topology.pci_device_for("eth0").unwrap();
        assert_eq!(eth0.device_type, DeviceType::NetInterface);
        assert!((eth0.link_speed - 100.0).abs() < f64::EPSILON);

        let eth2 = topology.pci_device_for("eth2").unwrap();
        assert_eq!(eth2.numa_node, Some(0));
        assert_eq!(eth2.pci_bus.map(|bus| bus.low_address), Some(addr("0001:00:00.0")));
        assert_eq!(topology.num_cores_per_numa(), 3);
    }

    #[test]
    fn merge_fills_unset_fields() {
        let mut topology = Topology::new();
        topology.add_device(
            0,
            PciDevice::new("nvme0", DeviceType::Unknown, addr("0000:81:00.0")),
        );
        let mut other = Topology::new();
        other.add_device(
            0,
            PciDevice::new("nvme0", DeviceType::Block, addr("0000:81:00.0"))
                .with_link_speed(16.0)
                .with_block_device(BlockDevice::new("nvme0n1")),
        );
        topology.merge(other).unwrap();
        let nvme0 = topology.pci_device_for("nvme0").unwrap();
        assert_eq!(nvme0.device_type, DeviceType::Block);
        assert_eq!(nvme0.block_device, Some(BlockDevice::new("nvme0n1")));
        assert!((nvme0.link_speed - 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn merge_virtual_devices() {
        let mut topology = two_node_topology();
        let mut other = Topology::new();
        other.add_virtual_device_unchecked(VirtualDevice::new("bond0", DeviceType::Unknown));
        topology.merge(other).unwrap();

        let mut other = Topology::new();
        other.add_virtual_device_unchecked(
            VirtualDevice::new("bond0", DeviceType::NetInterface).with_backing_device("eth0"),
        );
        topology.merge(other).unwrap();

        assert_eq!(topology.virtual_devices().len(), 1);
        let Some(DeviceRef::Virtual(bond0)) = topology.device("bond0") else {
            unreachable!("bond0 should be virtual");
        };
        assert_eq!(bond0.device_type, DeviceType::NetInterface);
        assert_eq!(bond0.backing_device.as_deref(), Some("eth0"));
        assert_eq!(topology.pci_device_for("bond0").unwrap().name, "eth0");
        let backed: Vec<_> = topology
            .virtual_devices_backed_by("eth0")
            .map(|device| device.name.as_str())
            .collect();
        assert_eq!(backed, vec!["bond0"]);
    }

    #[test]
    fn merge_rejects_virtual_with_physical_name() {
        let mut topology = two_node_topology();
        let before = topology.clone();
        let mut other = Topology::new();
        other.add_device(
            2,
            PciDevice::new("eth9", DeviceType::NetInterface, addr("0002:00:00.0")),
        );
        other.add_virtual_device_unchecked(VirtualDevice::new("eth0", DeviceType::NetInterface));
        match topology.merge(other) {
            Err(TopologyError::NameCollision(name)) => assert_eq!(name, "eth0"),
            other => unreachable!("unexpected result {other:?}"),
        }
        assert_eq!(topology, before);
    }

    #[test]
    fn merge_rejects_physical_with_virtual_name() {
        let mut topology = two_node_topology();
        topology
            .add_virtual_device(VirtualDevice::new("bond0", DeviceType::NetInterface))
            .unwrap();
        let mut other = Topology::new();
        other.add_device(
            0,
            PciDevice::new("bond0", DeviceType::NetInterface, addr("0000:19:00.0")),
        );
        assert_eq!(
            topology.merge(other),
            Err(TopologyError::NameCollision("bond0".to_string()))
        );
    }

    #[test]
    fn merge_rejects_bad_backing_devices() {
        let mut topology = two_node_topology();
        topology
            .add_virtual_device(VirtualDevice::new("bond0", DeviceType::NetInterface))
            .unwrap();

        let mut other = Topology::new();
        other.add_virtual_device_unchecked(
            VirtualDevice::new("vlan0", DeviceType::NetInterface).with_backing_device("eth7"),
        );
        assert_eq!(
            topology.merge(other),
            Err(TopologyError::BackingDeviceNotFound {
                name: "vlan0".to_string(),
                backing: "eth7".to_string(),
            })
        );

        let mut other = Topology::new();
        other.add_virtual_device_unchecked(
            VirtualDevice::new("vlan0", DeviceType::NetInterface).with_backing_device("bond0"),
        );
        assert_eq!(
            topology.merge(other),
            Err(TopologyError::BackingDeviceIsVirtual {
                name: "vlan0".to_string(),
                backing: "bond0".to_string(),
            })
        );
    }

    #[test]
    fn merge_rejects_backing_device_declared_virtual_later() {
        let mut topology = two_node_topology();
        let mut other = Topology::new();
        other.add_virtual_device_unchecked(
            VirtualDevice::new("vlan0", DeviceType::NetInterface).with_backing_device("bond0"),
        );
        other.add_virtual_device_unchecked(
            VirtualDevice::new("bond0", DeviceType::NetInterface).with_backing_device("eth0"),
        );
        let before = topology.clone();
        assert_eq!(
            topology.merge(other),
            Err(TopologyError::BackingDeviceIsVirtual {
                name: "vlan0".to_string(),
                backing: "bond0".to_string(),
            })
        );
        assert_eq!(topology, before);
    }

    #[test]
    fn backing_device_resolved_against_merged_devices() {
        let mut topology = Topology::new();
        let mut other = Topology::new();
        other.add_device(
            0,
            PciDevice::new("eth0", DeviceType::NetInterface, addr("0000:18:00.0")),
        );
        other.add_virtual_device_unchecked(
            VirtualDevice::new("bond0", DeviceType::NetInterface).with_backing_device("eth0"),
        );
        topology.merge(other).unwrap();
        assert_eq!(topology.pci_device_for("bond0").unwrap().numa_node, Some(0));
    }

    #[test]
    fn lookups() {
        let topology = two_node_topology();
        assert_eq!(
            topology.numa_node(7),
            Err(TopologyError::NumaNodeNotFound(7))
        );
        assert_eq!(
            topology.pci_device_for("eth9"),
            Err(TopologyError::DeviceNotFound("eth9".to_string()))
        );
        let names: Vec<_> = topology.all_devices().into_keys().collect();
        assert_eq!(names, vec!["eth0", "mlx5_0", "nvme0"]);
        assert!(!topology.device("nvme0").unwrap().is_virtual());
    }

    #[test]
    fn serde_round_trip() {
        let topology = two_node_topology();
        let yaml = serde_yaml_ng::to_string(&topology).unwrap();
        let back: Topology = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, topology);
    }

    impl Topology {
        /// Adds a virtual device without validating its backing device, the
        /// way a discovery backend would before merging.
        fn add_virtual_device_unchecked(&mut self, device: VirtualDevice) {
            self.virtual_devices.push(device);
        }
    }
}
