// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PCI addressing.

/// PCI addresses, including devices behind VMD controllers.
pub mod address;
/// Ordered sets of PCI addresses.
pub mod set;

pub use address::{InvalidPciAddress, NotVmdBackingAddress, PciAddress, VmdAddress};
pub use set::PciAddressSet;
