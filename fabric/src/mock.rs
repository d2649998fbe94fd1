// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Canned discovery backends for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hardware::topology::Topology;
use parking_lot::Mutex;

use crate::backend::{
    FabricInterfaceProvider, NetDevClassProvider, NetDevStateProvider, ProviderError,
    TopologyProvider,
};
use crate::class::{NetDevClass, NetDevState};
use crate::set::FabricInterfaceSet;

/// A failure a mock backend can be told to report.
#[derive(Clone, Debug)]
pub enum MockFailure {
    LibraryUnavailable,
    FabricUnsupported,
    Failed(String),
}

impl From<MockFailure> for ProviderError {
    fn from(value: MockFailure) -> Self {
        match value {
            MockFailure::LibraryUnavailable => ProviderError::LibraryUnavailable("mock".into()),
            MockFailure::FabricUnsupported => ProviderError::FabricUnsupported("mock".into()),
            MockFailure::Failed(message) => ProviderError::failed("mock", message),
        }
    }
}

/// Returns the same topology (or failure) on every call.
pub struct MockTopologyProvider {
    result: Result<Topology, MockFailure>,
    calls: AtomicUsize,
}

impl MockTopologyProvider {
    #[must_use]
    pub fn new(topology: Topology) -> Self {
        Self {
            result: Ok(topology),
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn failing(failure: MockFailure) -> Self {
        Self {
            result: Err(failure),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times the topology was asked for.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TopologyProvider for MockTopologyProvider {
    async fn topology(&self) -> Result<Topology, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.result.clone().map_err(Into::into)
    }
}

/// Returns a fixed set of fabric interfaces.
///
/// A provider filter narrows the answer down to the interfaces supporting
/// that provider.
pub struct MockFabricInterfaceProvider {
    result: Result<FabricInterfaceSet, MockFailure>,
    delay: Option<Duration>,
    requests: Mutex<Vec<Option<String>>>,
}

impl MockFabricInterfaceProvider {
    #[must_use]
    pub fn new(interfaces: FabricInterfaceSet) -> Self {
        Self {
            result: Ok(interfaces),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn failing(failure: MockFailure) -> Self {
        Self {
            result: Err(failure),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Makes every call take `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Provider filters received so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<Option<String>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl FabricInterfaceProvider for MockFabricInterfaceProvider {
    async fn fabric_interfaces(
        &self,
        provider: Option<&str>,
    ) -> Result<FabricInterfaceSet, ProviderError> {
        self.requests.lock().push(provider.map(ToString::to_string));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let interfaces = self.result.clone()?;
        let Some(provider) = provider else {
            return Ok(interfaces);
        };
        let mut filtered = FabricInterfaceSet::new();
        for interface in interfaces
            .into_iter()
            .filter(|interface| interface.supports_provider(provider))
        {
            filtered
                .update(interface)
                .map_err(|e| ProviderError::failed("mock", e))?;
        }
        Ok(filtered)
    }
}

/// Maps network device names to classes; unknown devices fail.
#[derive(Default)]
pub struct MockNetDevClassProvider {
    classes: HashMap<String, Result<NetDevClass, MockFailure>>,
}

impl MockNetDevClassProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_class(mut self, net_dev: impl Into<String>, class: NetDevClass) -> Self {
        self.classes.insert(net_dev.into(), Ok(class));
        self
    }

    #[must_use]
    pub fn with_failure(mut self, net_dev: impl Into<String>, failure: MockFailure) -> Self {
        self.classes.insert(net_dev.into(), Err(failure));
        self
    }
}

impl NetDevClassProvider for MockNetDevClassProvider {
    fn net_dev_class(&self, net_dev: &str) -> Result<NetDevClass, ProviderError> {
        match self.classes.get(net_dev) {
            Some(result) => result.clone().map_err(Into::into),
            None => Err(ProviderError::failed(
                "mock",
                format!("no class for {net_dev}"),
            )),
        }
    }
}

/// Plays back a sequence of states per network device.
///
/// Each call consumes one entry; the last entry repeats forever. Unknown
/// devices fail.
#[derive(Default)]
pub struct MockNetDevStateProvider {
    states: Mutex<HashMap<String, VecDeque<Result<NetDevState, MockFailure>>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockNetDevStateProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_states(
        self,
        net_dev: impl Into<String>,
        states: impl IntoIterator<Item = NetDevState>,
    ) -> Self {
        self.states
            .lock()
            .entry(net_dev.into())
            .or_default()
            .extend(states.into_iter().map(Ok));
        self
    }

    #[must_use]
    pub fn with_failure(self, net_dev: impl Into<String>, failure: MockFailure) -> Self {
        self.states
            .lock()
            .entry(net_dev.into())
            .or_default()
            .push_back(Err(failure));
        self
    }

    /// Number of times the state of `net_dev` was asked for.
    #[must_use]
    pub fn calls(&self, net_dev: &str) -> usize {
        self.calls.lock().get(net_dev).copied().unwrap_or_default()
    }
}

impl NetDevStateProvider for MockNetDevStateProvider {
    fn net_dev_state(&self, net_dev: &str) -> Result<NetDevState, ProviderError> {
        *self.calls.lock().entry(net_dev.to_string()).or_default() += 1;
        let mut states = self.states.lock();
        let Some(queue) = states.get_mut(net_dev) else {
            return Err(ProviderError::failed(
                "mock",
                format!("no state for {net_dev}"),
            ));
        };
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match next {
            Some(result) => result.map_err(Into::into),
            None => Err(ProviderError::failed(
                "mock",
                format!("no state for {net_dev}"),
            )),
        }
    }
}
