// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Fabric discovery errors.

use hardware::provider::ProviderError;

use crate::class::NetDevState;

/// Errors raised by fabric discovery and readiness checks.
#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    #[error("fabric interface name is required")]
    NameRequired,
    #[error("network/OS device name is required")]
    NetDeviceRequired,
    #[error("provider is required")]
    ProviderRequired,
    #[error("no fabric interfaces requested")]
    NoInterfacesRequested,
    #[error("invalid fabric scanner configuration: {0}")]
    InvalidConfig(String),
    #[error("fabric interface {0:?} not found")]
    InterfaceNotFound(String),
    #[error("network/OS device {0:?} not found")]
    NetDeviceNotFound(String),
    #[error("provider {provider:?} not supported on network device {net_device:?}")]
    ProviderNotSupported {
        net_device: String,
        provider: String,
    },
    /// A discovery backend failed.
    #[error(transparent)]
    Backend(#[from] ProviderError),
    /// The scan completed but found nothing usable.
    #[error("no fabric interfaces found{}", with_providers(.0))]
    NoInterfacesFound(Vec<String>),
    #[error("fabric interface {name:?} cannot be used (state: {state})")]
    InterfaceUnusable { name: String, state: NetDevState },
    #[error("no usable fabric interfaces")]
    NoUsableInterfaces,
    #[error("operation cancelled")]
    Cancelled,
    /// A background discovery task panicked or was aborted.
    #[error("background task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

fn with_providers(providers: &[String]) -> String {
    if providers.is_empty() {
        String::new()
    } else {
        format!(" with providers: {}", providers.join(", "))
    }
}

#[cfg(test)]
mod test {
    use crate::class::NetDevState;
    use crate::error::FabricError;

    #[test]
    fn messages() {
        assert_eq!(
            FabricError::NoInterfacesFound(vec![]).to_string(),
            "no fabric interfaces found"
        );
        assert_eq!(
            FabricError::NoInterfacesFound(vec!["ofi+tcp".into(), "ucx+rc".into()]).to_string(),
            "no fabric interfaces found with providers: ofi+tcp, ucx+rc"
        );
        assert_eq!(
            FabricError::InterfaceUnusable {
                name: "ib0".into(),
                state: NetDevState::Down,
            }
            .to_string(),
            "fabric interface \"ib0\" cannot be used (state: down)"
        );
    }
}
