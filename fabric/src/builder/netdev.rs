// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use hardware::topology::{DeviceType, Topology};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::builder::FabricInterfaceSetBuilder;
use crate::class::NetDevClass;
use crate::error::FabricError;
use crate::interface::FabricInterface;
use crate::set::FabricInterfaceSet;

const LOOPBACK_NET_DEVICE: &str = "lo";

/// Maps each fabric interface to the OS network devices it is reachable
/// through.
///
/// A network interface maps to itself. An OFI domain maps to the network
/// interfaces sharing its PCI address, plus the virtual devices riding on
/// those. Loopback interfaces map to `lo` whatever the topology says.
/// Interfaces that map to nothing are dropped.
pub struct NetworkDeviceBuilder {
    topology: Arc<Topology>,
}

impl NetworkDeviceBuilder {
    #[must_use]
    pub fn new(topology: Arc<Topology>) -> Self {
        Self { topology }
    }

    /// Network devices for topology device `name`, or `None` if the topology
    /// does not know it.
    fn net_devices(&self, name: &str) -> Option<BTreeSet<String>> {
        let device = self.topology.device(name)?;
        let mut found = BTreeSet::new();
        match device.device_type() {
            DeviceType::NetInterface => {
                found.insert(device.name().to_string());
            }
            DeviceType::OfiDomain => {
                let Ok(pci) = self.topology.pci_device_for(name) else {
                    return Some(found);
                };
                let siblings = pci
                    .numa_node
                    .and_then(|id| self.topology.numa_node(id).ok())
                    .map(|node| node.pci_devices().get(&pci.address))
                    .unwrap_or_default();
                for sibling in siblings
                    .iter()
                    .filter(|sibling| sibling.device_type.is_net_interface())
                {
                    found.insert(sibling.name.clone());
                    found.extend(
                        self.topology
                            .virtual_devices_backed_by(&sibling.name)
                            .map(|virt| virt.name.clone()),
                    );
                }
            }
            DeviceType::Block | DeviceType::Unknown => {}
        }
        Some(found)
    }
}

#[async_trait]
impl FabricInterfaceSetBuilder for NetworkDeviceBuilder {
    fn name(&self) -> &'static str {
        "network devices"
    }

    async fn build_part(
        &self,
        _cancel: &CancellationToken,
        set: &mut FabricInterfaceSet,
    ) -> Result<(), FabricError> {
        for name in set.names() {
            let interface = set.interface(&name)?;
            let topology_name = interface.topology_name().to_string();
            if interface.device_class == Some(NetDevClass::LOOPBACK)
                || topology_name == LOOPBACK_NET_DEVICE
            {
                set.update(
                    FabricInterface::new(&name).with_net_interfaces([LOOPBACK_NET_DEVICE]),
                )?;
                continue;
            }
            match self.net_devices(&topology_name) {
                None => {
                    debug!("dropping fabric interface {name:?}: {topology_name:?} not in topology");
                    set.remove(&name);
                }
                Some(net_devices) if net_devices.is_empty() => {
                    debug!("dropping fabric interface {name:?}: no network device for {topology_name:?}");
                    set.remove(&name);
                }
                Some(net_devices) => {
                    set.update(FabricInterface::new(&name).with_net_interfaces(net_devices))?;
                }
            }
        }
        Ok(())
    }
}
