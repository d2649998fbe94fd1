// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Registry of discovered fabric interfaces.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::FabricError;
use crate::interface::FabricInterface;

/// Fabric interfaces indexed by name and by OS network device.
///
/// Updates only ever add information: an interface seen again has its unset
/// fields filled in and its provider and network device sets extended.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Vec<FabricInterface>", into = "Vec<FabricInterface>")
)]
pub struct FabricInterfaceSet {
    by_name: BTreeMap<String, FabricInterface>,
    // network device -> names of the interfaces using it
    by_net_dev: BTreeMap<String, BTreeSet<String>>,
}

impl FabricInterfaceSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from `interfaces`, merging duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::NameRequired`] if an interface has no name.
    pub fn from_interfaces(
        interfaces: impl IntoIterator<Item = FabricInterface>,
    ) -> Result<Self, FabricError> {
        let mut set = Self::new();
        for interface in interfaces {
            set.update(interface)?;
        }
        Ok(set)
    }

    /// Adds an interface, or merges it into the known one with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`FabricError::NameRequired`] if the interface has no name.
    pub fn update(&mut self, interface: FabricInterface) -> Result<(), FabricError> {
        if interface.name.is_empty() {
            return Err(FabricError::NameRequired);
        }
        for net_dev in &interface.net_interfaces {
            self.by_net_dev
                .entry(net_dev.clone())
                .or_default()
                .insert(interface.name.clone());
        }
        match self.by_name.entry(interface.name.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(interface);
            }
            Entry::Occupied(mut entry) => entry.get_mut().merge_from(interface),
        }
        Ok(())
    }

    /// Removes the interface called `name`.
    pub fn remove(&mut self, name: &str) -> Option<FabricInterface> {
        let interface = self.by_name.remove(name)?;
        for net_dev in &interface.net_interfaces {
            if let Some(names) = self.by_net_dev.get_mut(net_dev) {
                names.remove(name);
                if names.is_empty() {
                    self.by_net_dev.remove(net_dev);
                }
            }
        }
        Some(interface)
    }

    /// # Errors
    ///
    /// Fails if `name` is empty or unknown.
    pub fn interface(&self, name: &str) -> Result<&FabricInterface, FabricError> {
        if name.is_empty() {
            return Err(FabricError::NameRequired);
        }
        self.by_name
            .get(name)
            .ok_or_else(|| FabricError::InterfaceNotFound(name.to_string()))
    }

    /// The first interface (by name) on network device `net_dev` supporting
    /// `provider`.
    ///
    /// # Errors
    ///
    /// Fails if either argument is empty, if no interface uses `net_dev`
    /// ([`FabricError::NetDeviceNotFound`]), or if none of them supports
    /// `provider` ([`FabricError::ProviderNotSupported`]).
    pub fn interface_on_net_device(
        &self,
        net_dev: &str,
        provider: &str,
    ) -> Result<&FabricInterface, FabricError> {
        if net_dev.is_empty() {
            return Err(FabricError::NetDeviceRequired);
        }
        if provider.is_empty() {
            return Err(FabricError::ProviderRequired);
        }
        let names = self
            .by_net_dev
            .get(net_dev)
            .ok_or_else(|| FabricError::NetDeviceNotFound(net_dev.to_string()))?;
        names
            .iter()
            .filter_map(|name| self.by_name.get(name))
            .find(|interface| interface.supports_provider(provider))
            .ok_or_else(|| FabricError::ProviderNotSupported {
                net_device: net_dev.to_string(),
                provider: provider.to_string(),
            })
    }

    /// Interface names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    /// Network devices in order.
    #[must_use]
    pub fn net_devices(&self) -> Vec<String> {
        self.by_net_dev.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    #[must_use]
    pub fn num_net_devices(&self) -> usize {
        self.by_net_dev.len()
    }

    /// Interfaces in name order.
    pub fn iter(&self) -> impl Iterator<Item = &FabricInterface> {
        self.by_name.values()
    }
}

impl std::fmt::Display for FabricInterfaceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, interface) in self.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{interface}")?;
        }
        Ok(())
    }
}

impl IntoIterator for FabricInterfaceSet {
    type Item = FabricInterface;
    type IntoIter = std::collections::btree_map::IntoValues<String, FabricInterface>;

    fn into_iter(self) -> Self::IntoIter {
        self.by_name.into_values()
    }
}

impl TryFrom<Vec<FabricInterface>> for FabricInterfaceSet {
    type Error = FabricError;

    fn try_from(value: Vec<FabricInterface>) -> Result<Self, Self::Error> {
        Self::from_interfaces(value)
    }
}

impl From<FabricInterfaceSet> for Vec<FabricInterface> {
    fn from(value: FabricInterfaceSet) -> Self {
        value.into_iter().collect()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::class::NetDevClass;
    use crate::error::FabricError;
    use crate::interface::FabricInterface;
    use crate::provider::FabricProvider;
    use crate::set::FabricInterfaceSet;

    fn sample() -> FabricInterfaceSet {
        FabricInterfaceSet::from_interfaces([
            FabricInterface::new("fi0")
                .with_net_interfaces(["net0"])
                .with_providers([FabricProvider::new("ofi+tcp", 1)]),
            FabricInterface::new("fi1")
                .with_net_interfaces(["net0"])
                .with_providers([
                    FabricProvider::new("ofi+verbs", 0),
                    FabricProvider::new("ofi+tcp", 2),
                ]),
            FabricInterface::new("fi2")
                .with_net_interfaces(["net1", "net2"])
                .with_providers([FabricProvider::new("ucx+rc", 0)]),
        ])
        .unwrap()
    }

    #[test]
    fn indexes() {
        let set = sample();
        assert_eq!(set.names(), vec!["fi0", "fi1", "fi2"]);
        assert_eq!(set.net_devices(), vec!["net0", "net1", "net2"]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.num_net_devices(), 3);
    }

    #[test]
    fn update_requires_name() {
        let mut set = FabricInterfaceSet::new();
        assert!(matches!(
            set.update(FabricInterface::default()),
            Err(FabricError::NameRequired)
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn update_merges() {
        let mut set = sample();
        set.update(
            FabricInterface::new("fi0")
                .with_net_interfaces(["net3"])
                .with_device_class(NetDevClass::ETHER)
                .with_providers([FabricProvider::new("ofi+sockets", 0)]),
        )
        .unwrap();
        set.update(
            FabricInterface::new("fi0")
                .with_device_class(NetDevClass::INFINIBAND)
                .with_numa_node(1),
        )
        .unwrap();
        let fi0 = set.interface("fi0").unwrap();
        assert_eq!(fi0.device_class, Some(NetDevClass::ETHER));
        assert_eq!(fi0.numa_node, Some(1));
        assert_eq!(fi0.providers.names(), vec!["ofi+sockets", "ofi+tcp"]);
        assert_eq!(
            fi0.net_interfaces.iter().collect::<Vec<_>>(),
            vec!["net0", "net3"]
        );
        assert_eq!(
            set.interface_on_net_device("net3", "ofi+tcp").unwrap().name,
            "fi0"
        );
    }

    #[test]
    fn update_never_loses_information() {
        bolero::check!()
            .with_type()
            .for_each(|updates: &Vec<(u8, Option<u32>, Option<u8>, u8, u8)>| {
                let mut set = FabricInterfaceSet::new();
                for (name, class, numa, net_dev, provider) in updates {
                    let name = format!("fi{}", name % 3);
                    let before = set.interface(&name).ok().cloned();
                    let mut fi = FabricInterface::new(&name)
                        .with_net_interfaces([format!("net{}", net_dev % 4)])
                        .with_providers([FabricProvider::new(format!("p{}", provider % 4), 0)]);
                    fi.device_class = class.map(NetDevClass);
                    fi.numa_node = numa.map(u32::from);
                    set.update(fi.clone()).unwrap();
                    let after = set.interface(&name).unwrap();
                    match before {
                        Some(before) => {
                            if before.device_class.is_some() {
                                assert_eq!(after.device_class, before.device_class);
                            }
                            if before.numa_node.is_some() {
                                assert_eq!(after.numa_node, before.numa_node);
                            }
                            assert!(before.net_interfaces.is_subset(&after.net_interfaces));
                            assert!(before.providers.iter().all(|p| after.providers.has(&p.name)));
                            assert!(after.providers.len() >= before.providers.len());
                        }
                        None => assert_eq!(*after, fi),
                    }
                }
            });
    }

    #[test]
    fn remove_updates_both_indexes() {
        let mut set = sample();
        assert_eq!(set.remove("fi2").map(|fi| fi.name), Some("fi2".to_string()));
        assert!(set.remove("fi2").is_none());
        assert_eq!(set.net_devices(), vec!["net0"]);
        set.remove("fi0");
        assert_eq!(
            set.interface_on_net_device("net0", "ofi+tcp").unwrap().name,
            "fi1"
        );
    }

    #[test]
    fn interface_lookup() {
        let set = sample();
        assert!(matches!(set.interface(""), Err(FabricError::NameRequired)));
        match set.interface("fi9") {
            Err(FabricError::InterfaceNotFound(name)) => assert_eq!(name, "fi9"),
            other => unreachable!("unexpected result {other:?}"),
        }
        assert_eq!(set.interface("fi1").unwrap().providers.len(), 2);
    }

    #[test]
    fn interface_on_net_device() {
        let set = sample();
        assert_eq!(
            set.interface_on_net_device("net0", "ofi+tcp").unwrap().name,
            "fi0"
        );
        assert_eq!(
            set.interface_on_net_device("net0", "ofi+verbs").unwrap().name,
            "fi1"
        );
        assert!(matches!(
            set.interface_on_net_device("", "ofi+tcp"),
            Err(FabricError::NetDeviceRequired)
        ));
        assert!(matches!(
            set.interface_on_net_device("net0", ""),
            Err(FabricError::ProviderRequired)
        ));
        match set.interface_on_net_device("net9", "ofi+tcp") {
            Err(e @ FabricError::NetDeviceNotFound(_)) => {
                assert_eq!(e.to_string(), "network/OS device \"net9\" not found");
            }
            other => unreachable!("unexpected result {other:?}"),
        }
        match set.interface_on_net_device("net1", "ofi+tcp") {
            Err(e @ FabricError::ProviderNotSupported { .. }) => assert_eq!(
                e.to_string(),
                "provider \"ofi+tcp\" not supported on network device \"net1\""
            ),
            other => unreachable!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn serde_round_trip() {
        let set = sample();
        let yaml = serde_yaml_ng::to_string(&set).unwrap();
        let back: FabricInterfaceSet = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, set);
    }
}
