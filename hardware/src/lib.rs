// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![doc = include_str!("../README.md")]
#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod merge;
pub mod pci;
pub mod provider;
pub mod topology;

/// Identifier of a NUMA node.
pub type NumaId = u32;
