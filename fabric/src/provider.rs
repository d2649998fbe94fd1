// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fabric transport providers.
//!
//! A provider is a named transport implementation such as `ofi+tcp` or
//! `ucx+rc_mlx5`. When an interface supports several providers, the one with
//! the lowest priority value is preferred.

use std::collections::{BTreeMap, HashMap};

/// Priority of a provider. Lower is more preferred.
pub type Priority = u32;

/// A transport provider supported by a fabric interface.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct FabricProvider {
    pub name: String,
    pub priority: Priority,
}

impl FabricProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, priority: Priority) -> Self {
        Self {
            name: name.into(),
            priority,
        }
    }
}

impl std::fmt::Display for FabricProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A set of providers, unique by name, ordered by priority then name.
///
/// Adding a provider whose name is already present only has an effect if the
/// newcomer is strictly more preferred.
///
/// # Examples
///
/// ```
/// use hwtopo_fabric::provider::{FabricProvider, FabricProviderSet};
///
/// let mut set: FabricProviderSet = [
///     FabricProvider::new("ofi+tcp", 2),
///     FabricProvider::new("ofi+verbs", 1),
/// ]
/// .into_iter()
/// .collect();
/// set.add(FabricProvider::new("ofi+tcp", 0));
/// assert_eq!(set.to_string(), "ofi+tcp, ofi+verbs");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "Vec<FabricProvider>", into = "Vec<FabricProvider>")
)]
pub struct FabricProviderSet {
    by_name: HashMap<String, FabricProvider>,
    by_priority: BTreeMap<Priority, BTreeMap<String, FabricProvider>>,
}

impl FabricProviderSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider. Returns true if the set changed.
    pub fn add(&mut self, provider: FabricProvider) -> bool {
        if let Some(known) = self.by_name.get(&provider.name) {
            if provider.priority >= known.priority {
                return false;
            }
            let priority = known.priority;
            if let Some(bucket) = self.by_priority.get_mut(&priority) {
                bucket.remove(&provider.name);
                if bucket.is_empty() {
                    self.by_priority.remove(&priority);
                }
            }
        }
        self.by_priority
            .entry(provider.priority)
            .or_default()
            .insert(provider.name.clone(), provider.clone());
        self.by_name.insert(provider.name.clone(), provider);
        true
    }

    /// Adds every provider of `other`.
    pub fn add_all(&mut self, other: FabricProviderSet) {
        for provider in other.to_vec() {
            self.add(provider);
        }
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FabricProvider> {
        self.by_name.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Providers in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &FabricProvider> {
        self.by_priority.values().flat_map(BTreeMap::values)
    }

    /// Providers in preference order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<FabricProvider> {
        self.iter().cloned().collect()
    }

    /// Provider names in preference order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|provider| provider.name.as_str()).collect()
    }
}

impl std::fmt::Display for FabricProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.names().join(", "))
    }
}

impl FromIterator<FabricProvider> for FabricProviderSet {
    fn from_iter<T: IntoIterator<Item = FabricProvider>>(iter: T) -> Self {
        let mut set = Self::new();
        for provider in iter {
            set.add(provider);
        }
        set
    }
}

impl From<Vec<FabricProvider>> for FabricProviderSet {
    fn from(value: Vec<FabricProvider>) -> Self {
        value.into_iter().collect()
    }
}

impl From<FabricProviderSet> for Vec<FabricProvider> {
    fn from(value: FabricProviderSet) -> Self {
        value.to_vec()
    }
}
