// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Waiting for fabric interfaces to come up.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::NetDevStateProvider;
use crate::class::NetDevState;
use crate::error::FabricError;
use crate::task::run_cancellable;

/// Pause between two polling passes unless configured otherwise.
pub const DEFAULT_ITERATION_SLEEP: Duration = Duration::from_secs(1);

/// What to wait for.
#[derive(Builder, Clone)]
pub struct WaitFabricReadyParams {
    pub state_provider: Arc<dyn NetDevStateProvider>,
    #[builder(setter(into, each(name = "fabric_interface", into)), default)]
    pub fabric_interfaces: Vec<String>,
    /// Treat interfaces that are down or in an unknown state as absent
    /// instead of failing.
    #[builder(default)]
    pub ignore_unusable: bool,
    #[builder(default = "DEFAULT_ITERATION_SLEEP")]
    pub iteration_sleep: Duration,
}

/// Polls interface states until every requested interface is ready, or
/// unusable when `ignore_unusable` is set.
///
/// # Errors
///
/// Fails if no interface was requested, if an interface is unusable and
/// unusable interfaces are not ignored, if every interface is unusable, if a
/// state query fails, or if `cancel` fires.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn wait_fabric_ready(
    cancel: &CancellationToken,
    params: WaitFabricReadyParams,
) -> Result<(), FabricError> {
    let interfaces: BTreeSet<String> = params.fabric_interfaces.iter().cloned().collect();
    if interfaces.is_empty() {
        return Err(FabricError::NoInterfacesRequested);
    }
    // stops the polling task once we stop waiting for it
    let stop = cancel.child_token();
    let _stop_on_return = stop.clone().drop_guard();
    run_cancellable(cancel, poll(stop, params, interfaces)).await?
}

async fn poll(
    stop: CancellationToken,
    params: WaitFabricReadyParams,
    interfaces: BTreeSet<String>,
) -> Result<(), FabricError> {
    let mut ready = BTreeSet::new();
    let mut unusable = BTreeSet::new();
    loop {
        for name in &interfaces {
            if ready.contains(name) || unusable.contains(name) {
                continue;
            }
            match params.state_provider.net_dev_state(name)? {
                NetDevState::Ready => {
                    debug!("fabric interface {name:?} is ready");
                    ready.insert(name.clone());
                }
                state @ (NetDevState::Down | NetDevState::Unknown) => {
                    if !params.ignore_unusable {
                        return Err(FabricError::InterfaceUnusable {
                            name: name.clone(),
                            state,
                        });
                    }
                    warn!("ignoring fabric interface {name:?} (state: {state})");
                    unusable.insert(name.clone());
                }
                NetDevState::NotReady => debug!("fabric interface {name:?} is not ready yet"),
            }
        }
        if ready.len() + unusable.len() == interfaces.len() {
            if ready.is_empty() {
                return Err(FabricError::NoUsableInterfaces);
            }
            return Ok(());
        }
        tokio::select! {
            () = stop.cancelled() => return Err(FabricError::Cancelled),
            () = tokio::time::sleep(params.iteration_sleep) => {}
        }
    }
}
