// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fabric interfaces.

use std::collections::BTreeSet;

use hardware::NumaId;
use hardware::merge::{fill_unset, union};

use crate::class::NetDevClass;
use crate::provider::{FabricProvider, FabricProviderSet};

/// A fabric interface, as reported by a discovery backend and completed
/// from the machine topology.
///
/// `name` is the fabric-level name (e.g. an OFI domain like `mlx5_0`);
/// `os_name` is the OS-level device name if it differs. `net_interfaces`
/// are the OS network devices through which the interface is reachable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct FabricInterface {
    pub name: String,
    pub os_name: String,
    pub net_interfaces: BTreeSet<String>,
    pub device_class: Option<NetDevClass>,
    pub providers: FabricProviderSet,
    pub numa_node: Option<NumaId>,
}

impl FabricInterface {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_os_name(mut self, os_name: impl Into<String>) -> Self {
        self.os_name = os_name.into();
        self
    }

    #[must_use]
    pub fn with_net_interfaces<S: Into<String>>(mut self, net_interfaces: impl IntoIterator<Item = S>) -> Self {
        self.net_interfaces
            .extend(net_interfaces.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_providers(mut self, providers: impl IntoIterator<Item = FabricProvider>) -> Self {
        for provider in providers {
            self.providers.add(provider);
        }
        self
    }

    #[must_use]
    pub fn with_device_class(mut self, device_class: NetDevClass) -> Self {
        self.device_class = Some(device_class);
        self
    }

    #[must_use]
    pub fn with_numa_node(mut self, numa_node: NumaId) -> Self {
        self.numa_node = Some(numa_node);
        self
    }

    /// Name under which the interface appears in the machine topology: the
    /// OS name if known, the fabric name otherwise.
    #[must_use]
    pub fn topology_name(&self) -> &str {
        if self.os_name.is_empty() {
            &self.name
        } else {
            &self.os_name
        }
    }

    /// Returns true if the interface supports `provider`.
    ///
    /// `provider` may list several providers of one library, as in
    /// `ofi+tcp,ofi_rxm` or `ucx+rc,ud`; all of them must be supported.
    ///
    /// ```
    /// use hwtopo_fabric::interface::FabricInterface;
    /// use hwtopo_fabric::provider::FabricProvider;
    ///
    /// let fi = FabricInterface::new("mlx5_0").with_providers([
    ///     FabricProvider::new("ucx+rc", 0),
    ///     FabricProvider::new("ucx+ud", 1),
    /// ]);
    /// assert!(fi.supports_provider("ucx+rc,ud"));
    /// assert!(!fi.supports_provider("ucx+rc,dc"));
    /// ```
    #[must_use]
    pub fn supports_provider(&self, provider: &str) -> bool {
        if provider.is_empty() {
            return false;
        }
        let (prefix, providers) = match provider.split_once('+') {
            Some((library, providers)) => (format!("{library}+"), providers),
            None => (String::new(), provider),
        };
        providers
            .split(',')
            .all(|sub| !sub.is_empty() && self.providers.has(&format!("{prefix}{sub}")))
    }

    /// Folds `incoming` into this interface: unset scalars are filled in,
    /// provider and network device sets are extended.
    pub(crate) fn merge_from(&mut self, incoming: FabricInterface) {
        fill_unset(&mut self.os_name, incoming.os_name);
        fill_unset(&mut self.device_class, incoming.device_class);
        fill_unset(&mut self.numa_node, incoming.numa_node);
        union(&mut self.net_interfaces, incoming.net_interfaces);
        self.providers.add_all(incoming.providers);
    }
}

impl std::fmt::Display for FabricInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "<no name>")?;
        } else {
            write!(f, "{}", self.name)?;
        }
        if !self.net_interfaces.is_empty() {
            let net_interfaces: Vec<_> = self.net_interfaces.iter().map(String::as_str).collect();
            write!(f, " (interface: {})", net_interfaces.join(", "))?;
        }
        if self.providers.is_empty() {
            write!(f, " (providers: none)")
        } else {
            write!(f, " (providers: {})", self.providers)
        }
    }
}
