// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::sync::Arc;

use async_trait::async_trait;
use hardware::topology::Topology;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::builder::FabricInterfaceSetBuilder;
use crate::class::NetDevClass;
use crate::error::FabricError;
use crate::interface::FabricInterface;
use crate::set::FabricInterfaceSet;

/// Records the NUMA node each interface's PCI device is attached to.
///
/// Virtual devices report the node of their backing device. Loopback
/// interfaces have no NUMA affinity and are left alone.
pub struct NumaAffinityBuilder {
    topology: Arc<Topology>,
}

impl NumaAffinityBuilder {
    #[must_use]
    pub fn new(topology: Arc<Topology>) -> Self {
        Self { topology }
    }
}

#[async_trait]
impl FabricInterfaceSetBuilder for NumaAffinityBuilder {
    fn name(&self) -> &'static str {
        "NUMA affinity"
    }

    async fn build_part(
        &self,
        _cancel: &CancellationToken,
        set: &mut FabricInterfaceSet,
    ) -> Result<(), FabricError> {
        for name in set.names() {
            let interface = set.interface(&name)?;
            if interface.device_class == Some(NetDevClass::LOOPBACK) {
                continue;
            }
            let numa_node = std::iter::once(interface.topology_name())
                .chain(interface.net_interfaces.iter().map(String::as_str))
                .find_map(|device| self.topology.pci_device_for(device).ok())
                .and_then(|device| device.numa_node);
            match numa_node {
                Some(numa_node) => {
                    set.update(FabricInterface::new(&name).with_numa_node(numa_node))?;
                }
                None => debug!("no NUMA affinity found for fabric interface {name:?}"),
            }
        }
        Ok(())
    }
}
