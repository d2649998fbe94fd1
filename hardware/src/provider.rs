// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Topology discovery backends.
//!
//! A backend (hwloc, sysfs, a vendor library, ...) implements
//! [`TopologyProvider`]. Several backends are combined by a
//! [`TopologyFactory`], which asks each in order of decreasing weight and
//! merges the answers. Since [`Topology::merge`] never overwrites a known
//! value, the heaviest backend has the last word on every field it fills.

use std::cmp::Reverse;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::topology::{Topology, TopologyError};

/// Errors reported by discovery backends.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The native library the backend relies on cannot be loaded.
    #[error("library unavailable: {0}")]
    LibraryUnavailable(String),
    /// The backend works but does not support the requested fabric.
    #[error("fabric not supported: {0}")]
    FabricUnsupported(String),
    /// The backend's answer conflicts with what is already known.
    #[error(transparent)]
    Topology(#[from] TopologyError),
    /// Anything else.
    #[error("{context}: {source}")]
    Failed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ProviderError {
    /// Wraps an arbitrary backend failure.
    pub fn failed(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ProviderError::Failed {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Returns true for failures meaning "this backend has nothing to offer
    /// here", which callers may skip over.
    #[must_use]
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(
            self,
            ProviderError::LibraryUnavailable(_) | ProviderError::FabricUnsupported(_)
        )
    }
}

/// A source of topology information.
#[async_trait]
pub trait TopologyProvider: Send + Sync {
    /// Discovers the topology visible to this backend.
    async fn topology(&self) -> Result<Topology, ProviderError>;
}

/// A [`TopologyProvider`] with a precedence weight. Higher weights win.
#[derive(Clone)]
pub struct WeightedTopologyProvider {
    pub provider: Arc<dyn TopologyProvider>,
    pub weight: i32,
}

impl WeightedTopologyProvider {
    #[must_use]
    pub fn new(provider: Arc<dyn TopologyProvider>, weight: i32) -> Self {
        Self { provider, weight }
    }
}

/// Combines several backends into one.
#[derive(Clone, Default)]
pub struct TopologyFactory {
    providers: Vec<WeightedTopologyProvider>,
}

impl TopologyFactory {
    /// Creates a factory asking `providers` in decreasing weight order.
    /// Providers of equal weight are asked in the order given.
    #[must_use]
    pub fn new(providers: impl IntoIterator<Item = WeightedTopologyProvider>) -> Self {
        let mut providers: Vec<_> = providers.into_iter().collect();
        providers.sort_by_key(|provider| Reverse(provider.weight));
        Self { providers }
    }
}

#[async_trait]
impl TopologyProvider for TopologyFactory {
    async fn topology(&self) -> Result<Topology, ProviderError> {
        let mut topology = Topology::new();
        for weighted in &self.providers {
            debug!("fetching topology from provider of weight {}", weighted.weight);
            topology.merge(weighted.provider.topology().await?)?;
        }
        Ok(topology)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tracing_test::traced_test;

    use crate::pci::address::PciAddress;
    use crate::provider::{
        ProviderError, TopologyFactory, TopologyProvider, WeightedTopologyProvider,
    };
    use crate::topology::{DeviceType, PciDevice, Topology, TopologyError, VirtualDevice};

    struct Fixed(Result<Topology, &'static str>);

    #[async_trait]
    impl TopologyProvider for Fixed {
        async fn topology(&self) -> Result<Topology, ProviderError> {
            self.0
                .clone()
                .map_err(|e| ProviderError::failed("fixed", e))
        }
    }

    fn with_eth0(link_speed: f64, device_type: DeviceType) -> Topology {
        let mut topology = Topology::new();
        topology.add_device(
            0,
            PciDevice::new(
                "eth0",
                device_type,
                PciAddress::try_from("0000:18:00.0").unwrap(),
            )
            .with_link_speed(link_speed),
        );
        topology
    }

    fn weighted(result: Result<Topology, &'static str>, weight: i32) -> WeightedTopologyProvider {
        WeightedTopologyProvider::new(Arc::new(Fixed(result)), weight)
    }

    #[tokio::test]
    #[traced_test]
    async fn heavier_provider_wins() {
        let factory = TopologyFactory::new([
            weighted(Ok(with_eth0(10.0, DeviceType::Unknown)), 1),
            weighted(Ok(with_eth0(100.0, DeviceType::Unknown)), 10),
            weighted(Ok(with_eth0(1.0, DeviceType::NetInterface)), 5),
        ]);
        let topology = factory.topology().await.unwrap();
        let eth0 = topology.pci_device_for("eth0").unwrap();
        assert!((eth0.link_speed - 100.0).abs() < f64::EPSILON);
        assert_eq!(eth0.device_type, DeviceType::NetInterface);
        assert!(logs_contain("fetching topology from provider of weight 10"));
    }

    #[tokio::test]
    async fn empty_factory_gives_empty_topology() {
        let topology = TopologyFactory::default().topology().await.unwrap();
        assert_eq!(topology, Topology::new());
    }

    #[tokio::test]
    async fn provider_error_aborts() {
        let factory = TopologyFactory::new([
            weighted(Ok(with_eth0(10.0, DeviceType::NetInterface)), 2),
            weighted(Err("hwloc exploded"), 1),
        ]);
        match factory.topology().await {
            Err(ProviderError::Failed { context, source }) => {
                assert_eq!(context, "fixed");
                assert_eq!(source.to_string(), "hwloc exploded");
            }
            other => unreachable!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn merge_conflict_aborts() {
        let mut conflicting = Topology::new();
        conflicting
            .add_virtual_device(VirtualDevice::new("bond0", DeviceType::NetInterface))
            .unwrap();
        let mut clashing = Topology::new();
        clashing.add_device(
            1,
            PciDevice::new(
                "bond0",
                DeviceType::NetInterface,
                PciAddress::try_from("0000:81:00.0").unwrap(),
            ),
        );
        let factory = TopologyFactory::new([weighted(Ok(conflicting), 2), weighted(Ok(clashing), 1)]);
        match factory.topology().await {
            Err(ProviderError::Topology(TopologyError::NameCollision(name))) => {
                assert_eq!(name, "bond0");
            }
            other => unreachable!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn unavailable_kinds() {
        assert!(ProviderError::LibraryUnavailable("libfabric".into()).is_backend_unavailable());
        assert!(ProviderError::FabricUnsupported("ucx".into()).is_backend_unavailable());
        assert!(!ProviderError::failed("sysfs", "boom").is_backend_unavailable());
    }
}
