// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ordered, deduplicated sets of PCI addresses.

use std::collections::BTreeSet;

use crate::pci::address::{InvalidPciAddress, PciAddress};

/// A deduplicated set of PCI addresses, iterated in address order.
///
/// # Examples
///
/// ```
/// use hwtopo_hardware::pci::set::PciAddressSet;
///
/// let set = PciAddressSet::from_strings(["0000:81:00.0", "0000:01:00.0", "0000:81:00.0"]).unwrap();
/// assert_eq!(set.len(), 2);
/// assert_eq!(set.to_string(), "0000:01:00.0 0000:81:00.0");
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct PciAddressSet(BTreeSet<PciAddress>);

impl PciAddressSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses every string and collects the results.
    ///
    /// # Errors
    ///
    /// Returns the first parse failure.
    pub fn from_strings<S: AsRef<str>>(
        strings: impl IntoIterator<Item = S>,
    ) -> Result<Self, InvalidPciAddress> {
        let mut set = Self::new();
        set.add_strings(strings)?;
        Ok(set)
    }

    /// Adds an address. Returns true if it was not already present.
    pub fn add(&mut self, address: PciAddress) -> bool {
        self.0.insert(address)
    }

    /// Parses and adds every string.
    ///
    /// # Errors
    ///
    /// Returns the first parse failure; addresses parsed before it remain in
    /// the set.
    pub fn add_strings<S: AsRef<str>>(
        &mut self,
        strings: impl IntoIterator<Item = S>,
    ) -> Result<(), InvalidPciAddress> {
        for s in strings {
            self.add(PciAddress::try_from(s.as_ref())?);
        }
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, address: &PciAddress) -> bool {
        self.0.contains(address)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the addresses in order.
    pub fn iter(&self) -> impl Iterator<Item = &PciAddress> {
        self.0.iter()
    }

    /// The addresses in order.
    #[must_use]
    pub fn addresses(&self) -> Vec<PciAddress> {
        self.0.iter().copied().collect()
    }

    /// The canonical string form of each address, in address order.
    #[must_use]
    pub fn strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    /// Addresses present in both sets.
    #[must_use]
    pub fn intersect(&self, other: &PciAddressSet) -> PciAddressSet {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    /// Addresses present in this set but not in `other`.
    #[must_use]
    pub fn difference(&self, other: &PciAddressSet) -> PciAddressSet {
        Self(self.0.difference(&other.0).copied().collect())
    }

    /// Returns true if any address in the set sits behind a VMD controller.
    #[must_use]
    pub fn has_vmd(&self) -> bool {
        self.0.iter().any(PciAddress::is_vmd_backing_address)
    }

    /// Replaces every VMD backing address with the address of its controller.
    ///
    /// Addresses that are not behind a controller are kept as they are;
    /// controllers shared by several backing devices appear once.
    #[must_use]
    pub fn backing_to_vmd_addresses(&self) -> PciAddressSet {
        self.0
            .iter()
            .map(|address| address.backing_to_vmd_address().unwrap_or(*address))
            .collect()
    }
}

impl std::fmt::Display for PciAddressSet {
    /// Space separated addresses in order.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, address) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{address}")?;
        }
        Ok(())
    }
}

impl FromIterator<PciAddress> for PciAddressSet {
    fn from_iter<T: IntoIterator<Item = PciAddress>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<PciAddress> for PciAddressSet {
    fn extend<T: IntoIterator<Item = PciAddress>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl IntoIterator for PciAddressSet {
    type Item = PciAddress;
    type IntoIter = std::collections::btree_set::IntoIter<PciAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PciAddressSet {
    type Item = &'a PciAddress;
    type IntoIter = std::collections::btree_set::Iter<'a, PciAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
