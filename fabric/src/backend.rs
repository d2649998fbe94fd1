// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Discovery backend contracts.
//!
//! The native mechanisms (libfabric, UCX, sysfs, ...) live outside this
//! crate. They plug in through these traits; topology discovery uses
//! [`TopologyProvider`] from the hardware crate.

use async_trait::async_trait;

pub use hardware::provider::{
    ProviderError, TopologyFactory, TopologyProvider, WeightedTopologyProvider,
};

use crate::class::{NetDevClass, NetDevState};
use crate::set::FabricInterfaceSet;

/// A source of fabric interfaces, such as libfabric or UCX.
#[async_trait]
pub trait FabricInterfaceProvider: Send + Sync {
    /// Lists the fabric interfaces this backend knows about.
    ///
    /// With a `provider` filter only interfaces supporting that provider are
    /// expected; `None` asks for every provider.
    async fn fabric_interfaces(
        &self,
        provider: Option<&str>,
    ) -> Result<FabricInterfaceSet, ProviderError>;
}

/// Looks up the hardware class of an OS network device.
pub trait NetDevClassProvider: Send + Sync {
    /// # Errors
    ///
    /// Fails if the class of `net_dev` cannot be determined.
    fn net_dev_class(&self, net_dev: &str) -> Result<NetDevClass, ProviderError>;
}

/// Looks up the operational state of an OS network device.
pub trait NetDevStateProvider: Send + Sync {
    /// # Errors
    ///
    /// Fails if the state of `net_dev` cannot be determined.
    fn net_dev_state(&self, net_dev: &str) -> Result<NetDevState, ProviderError>;
}
