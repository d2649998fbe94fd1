// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::FabricInterfaceProvider;
use crate::builder::FabricInterfaceSetBuilder;
use crate::error::FabricError;
use crate::set::FabricInterfaceSet;
use crate::task::run_cancellable;

/// Collects fabric interfaces from every backend.
///
/// Each backend is asked once per provider filter, or once for all
/// providers when there is no filter. A backend whose library is missing or
/// which does not support the fabric is skipped.
pub struct FabricInterfaceBuilder {
    backends: Vec<Arc<dyn FabricInterfaceProvider>>,
    provider_filters: Vec<String>,
}

impl FabricInterfaceBuilder {
    #[must_use]
    pub fn new(
        backends: Vec<Arc<dyn FabricInterfaceProvider>>,
        provider_filters: Vec<String>,
    ) -> Self {
        Self {
            backends,
            provider_filters,
        }
    }

    fn filters(&self) -> Vec<Option<String>> {
        if self.provider_filters.is_empty() {
            vec![None]
        } else {
            self.provider_filters.iter().cloned().map(Some).collect()
        }
    }
}

#[async_trait]
impl FabricInterfaceSetBuilder for FabricInterfaceBuilder {
    fn name(&self) -> &'static str {
        "fabric interfaces"
    }

    async fn build_part(
        &self,
        cancel: &CancellationToken,
        set: &mut FabricInterfaceSet,
    ) -> Result<(), FabricError> {
        let filters = self.filters();
        'backends: for (index, backend) in self.backends.iter().enumerate() {
            for filter in &filters {
                let query = {
                    let backend = Arc::clone(backend);
                    let filter = filter.clone();
                    async move { backend.fabric_interfaces(filter.as_deref()).await }
                };
                match run_cancellable(cancel, query).await? {
                    Ok(found) => {
                        debug!(
                            "fabric interface backend {index} reported {} interfaces for {}",
                            found.len(),
                            filter.as_deref().unwrap_or("all providers")
                        );
                        for interface in found {
                            set.update(interface)?;
                        }
                    }
                    Err(e) if e.is_backend_unavailable() => {
                        warn!("skipping fabric interface backend {index}: {e}");
                        continue 'backends;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}
