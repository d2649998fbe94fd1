// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The fabric interface pipeline.
//!
//! A scan runs a fixed sequence of stages over one initially empty
//! [`FabricInterfaceSet`]:
//!
//! 1. [`FabricInterfaceBuilder`] collects interfaces from every backend.
//! 2. [`NetworkDeviceBuilder`] maps each interface to its OS network devices
//!    and drops the ones it cannot map.
//! 3. [`NetDevClassBuilder`] records the hardware class of each interface.
//! 4. [`NumaAffinityBuilder`] records the NUMA node of each interface.

use std::sync::Arc;

use async_trait::async_trait;
use hardware::topology::Topology;
use tokio_util::sync::CancellationToken;

use crate::backend::{FabricInterfaceProvider, NetDevClassProvider};
use crate::error::FabricError;
use crate::set::FabricInterfaceSet;

mod class;
mod interfaces;
mod netdev;
mod numa;

pub use class::NetDevClassBuilder;
pub use interfaces::FabricInterfaceBuilder;
pub use netdev::NetworkDeviceBuilder;
pub use numa::NumaAffinityBuilder;

/// One stage of the pipeline.
#[async_trait]
pub trait FabricInterfaceSetBuilder: Send + Sync {
    /// Short stage name for logs.
    fn name(&self) -> &'static str;

    /// Adds what this stage knows to `set`.
    async fn build_part(
        &self,
        cancel: &CancellationToken,
        set: &mut FabricInterfaceSet,
    ) -> Result<(), FabricError>;
}

/// The standard pipeline, in execution order.
#[must_use]
pub fn default_builders(
    topology: &Arc<Topology>,
    backends: &[Arc<dyn FabricInterfaceProvider>],
    class_provider: &Arc<dyn NetDevClassProvider>,
    provider_filters: Vec<String>,
) -> Vec<Box<dyn FabricInterfaceSetBuilder>> {
    vec![
        Box::new(FabricInterfaceBuilder::new(
            backends.to_vec(),
            provider_filters,
        )),
        Box::new(NetworkDeviceBuilder::new(Arc::clone(topology))),
        Box::new(NetDevClassBuilder::new(Arc::clone(class_provider))),
        Box::new(NumaAffinityBuilder::new(Arc::clone(topology))),
    ]
}

/// Runs `builders` in order over a fresh set.
///
/// # Errors
///
/// Stops at the first failing stage.
pub async fn run_builders(
    cancel: &CancellationToken,
    builders: &[Box<dyn FabricInterfaceSetBuilder>],
) -> Result<FabricInterfaceSet, FabricError> {
    let mut set = FabricInterfaceSet::new();
    for builder in builders {
        if cancel.is_cancelled() {
            return Err(FabricError::Cancelled);
        }
        tracing::trace!("running fabric builder {}", builder.name());
        builder.build_part(cancel, &mut set).await?;
    }
    Ok(set)
}
