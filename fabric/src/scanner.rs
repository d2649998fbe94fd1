// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fabric scanning.

use std::collections::BTreeSet;
use std::sync::Arc;

use derive_builder::Builder;
use hardware::topology::Topology;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{FabricInterfaceProvider, NetDevClassProvider, TopologyProvider};
use crate::builder::{FabricInterfaceSetBuilder, default_builders, run_builders};
use crate::error::FabricError;
use crate::set::FabricInterfaceSet;
use crate::task::run_cancellable;

const NO_FABRIC_INTERFACE_PROVIDERS: &str = "at least one fabric interface provider is required";

/// Backends used by a [`FabricScanner`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use hwtopo_fabric::mock::{MockFabricInterfaceProvider, MockNetDevClassProvider, MockTopologyProvider};
/// use hwtopo_fabric::scanner::FabricScannerConfigBuilder;
/// use hwtopo_fabric::set::FabricInterfaceSet;
/// use hardware::topology::Topology;
///
/// let config = FabricScannerConfigBuilder::default()
///     .topology_provider(Arc::new(MockTopologyProvider::new(Topology::new())))
///     .fabric_interface_provider(Arc::new(MockFabricInterfaceProvider::new(FabricInterfaceSet::new())))
///     .net_dev_class_provider(Arc::new(MockNetDevClassProvider::new()))
///     .build()
///     .unwrap();
/// assert_eq!(config.fabric_interface_providers.len(), 1);
///
/// assert!(
///     FabricScannerConfigBuilder::default()
///         .topology_provider(Arc::new(MockTopologyProvider::new(Topology::new())))
///         .net_dev_class_provider(Arc::new(MockNetDevClassProvider::new()))
///         .build()
///         .is_err()
/// );
/// ```
#[derive(Builder, Clone)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct FabricScannerConfig {
    pub topology_provider: Arc<dyn TopologyProvider>,
    #[builder(setter(each(name = "fabric_interface_provider")), default)]
    pub fabric_interface_providers: Vec<Arc<dyn FabricInterfaceProvider>>,
    pub net_dev_class_provider: Arc<dyn NetDevClassProvider>,
}

impl FabricScannerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self
            .fabric_interface_providers
            .as_ref()
            .is_none_or(Vec::is_empty)
        {
            return Err(NO_FABRIC_INTERFACE_PROVIDERS.to_string());
        }
        Ok(())
    }
}

impl FabricScannerConfig {
    /// # Errors
    ///
    /// Fails if there is no fabric interface provider.
    pub fn validate(&self) -> Result<(), FabricError> {
        if self.fabric_interface_providers.is_empty() {
            return Err(FabricError::InvalidConfig(
                NO_FABRIC_INTERFACE_PROVIDERS.to_string(),
            ));
        }
        Ok(())
    }
}

/// A pipeline built for one set of provider filters.
struct Pipeline {
    provider_filters: BTreeSet<String>,
    builders: Vec<Box<dyn FabricInterfaceSetBuilder>>,
}

#[derive(Default)]
struct ScannerState {
    topology: Option<Arc<Topology>>,
    pipeline: Option<Pipeline>,
}

/// Discovers the fabric interfaces of the machine.
///
/// The topology is fetched on the first scan and kept. The pipeline is
/// built on the first scan and rebuilt whenever the provider filters change.
/// Scans are serialized.
pub struct FabricScanner {
    config: FabricScannerConfig,
    state: Mutex<ScannerState>,
}

impl FabricScanner {
    /// # Errors
    ///
    /// Fails if `config` is invalid.
    pub fn new(config: FabricScannerConfig) -> Result<Self, FabricError> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(ScannerState::default()),
        })
    }

    /// Scans for fabric interfaces supporting any of `providers`, or all
    /// fabric interfaces if `providers` is empty.
    ///
    /// # Errors
    ///
    /// Fails if `cancel` fires, if a backend fails (other than by being
    /// unavailable), or if no interface is found.
    #[tracing::instrument(level = "debug", skip(self, cancel))]
    pub async fn scan(
        &self,
        cancel: &CancellationToken,
        providers: &[String],
    ) -> Result<FabricInterfaceSet, FabricError> {
        // request order, without blanks or repeats
        let mut seen = BTreeSet::new();
        let requested: Vec<String> = providers
            .iter()
            .filter(|provider| !provider.is_empty() && seen.insert(provider.as_str()))
            .cloned()
            .collect();
        let provider_filters: BTreeSet<String> = requested.iter().cloned().collect();

        let mut state = self.state.lock().await;
        let pipeline = match state.pipeline.take() {
            Some(pipeline) if pipeline.provider_filters == provider_filters => pipeline,
            _ => {
                self.init_pipeline(cancel, &mut state, provider_filters, &requested)
                    .await?
            }
        };
        let result = run_builders(cancel, &pipeline.builders).await;
        state.pipeline = Some(pipeline);

        let set = result?;
        if set.is_empty() {
            return Err(FabricError::NoInterfacesFound(requested));
        }
        info!("found {} fabric interfaces", set.len());
        Ok(set)
    }

    /// Replaces the cached topology. The next scan rebuilds its pipeline
    /// around it.
    pub async fn cache_topology(&self, topology: Topology) {
        let mut state = self.state.lock().await;
        state.topology = Some(Arc::new(topology));
        state.pipeline = None;
    }

    /// The cached topology, if one has been fetched or set.
    pub async fn topology(&self) -> Option<Arc<Topology>> {
        self.state.lock().await.topology.clone()
    }

    async fn init_pipeline(
        &self,
        cancel: &CancellationToken,
        state: &mut ScannerState,
        provider_filters: BTreeSet<String>,
        requested: &[String],
    ) -> Result<Pipeline, FabricError> {
        let topology = match &state.topology {
            Some(topology) => Arc::clone(topology),
            None => {
                debug!("fetching topology");
                let provider = Arc::clone(&self.config.topology_provider);
                let topology = run_cancellable(cancel, async move { provider.topology().await })
                    .await??;
                let topology = Arc::new(topology);
                state.topology = Some(Arc::clone(&topology));
                topology
            }
        };
        debug!("building fabric pipeline for providers {requested:?}");
        let builders = default_builders(
            &topology,
            &self.config.fabric_interface_providers,
            &self.config.net_dev_class_provider,
            requested.to_vec(),
        );
        Ok(Pipeline {
            provider_filters,
            builders,
        })
    }
}
