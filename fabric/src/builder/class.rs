// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backend::NetDevClassProvider;
use crate::builder::FabricInterfaceSetBuilder;
use crate::error::FabricError;
use crate::interface::FabricInterface;
use crate::set::FabricInterfaceSet;

/// Records the hardware class of each interface, taken from its first
/// network device.
pub struct NetDevClassBuilder {
    provider: Arc<dyn NetDevClassProvider>,
}

impl NetDevClassBuilder {
    #[must_use]
    pub fn new(provider: Arc<dyn NetDevClassProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl FabricInterfaceSetBuilder for NetDevClassBuilder {
    fn name(&self) -> &'static str {
        "device classes"
    }

    async fn build_part(
        &self,
        _cancel: &CancellationToken,
        set: &mut FabricInterfaceSet,
    ) -> Result<(), FabricError> {
        for name in set.names() {
            let Some(net_dev) = set.interface(&name)?.net_interfaces.first().cloned() else {
                continue;
            };
            match self.provider.net_dev_class(&net_dev) {
                Ok(class) => set.update(FabricInterface::new(&name).with_device_class(class))?,
                Err(e) => warn!("unable to get device class of {net_dev:?} for {name:?}: {e}"),
            }
        }
        Ok(())
    }
}
