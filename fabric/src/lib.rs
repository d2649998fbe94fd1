// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![doc = include_str!("../README.md")]
#![deny(clippy::pedantic, clippy::unwrap_used)]

pub mod backend;
pub mod builder;
pub mod class;
pub mod error;
pub mod interface;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
pub mod provider;
pub mod ready;
pub mod scanner;
pub mod set;
mod task;

pub use error::FabricError;
