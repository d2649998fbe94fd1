// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::FabricError;

/// Runs `work` on its own task and waits for it unless `cancel` fires first.
///
/// On cancellation the task is left to finish on its own and its result is
/// dropped.
pub(crate) async fn run_cancellable<F>(
    cancel: &CancellationToken,
    work: F,
) -> Result<F::Output, FabricError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handle = tokio::spawn(work);
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!("cancelled while waiting on background task");
            Err(FabricError::Cancelled)
        }
        joined = handle => Ok(joined?),
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::error::FabricError;
    use crate::task::run_cancellable;

    #[tokio::test]
    async fn returns_result() {
        let cancel = CancellationToken::new();
        assert_eq!(run_cancellable(&cancel, async { 42 }).await.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_stuck_work() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let stuck = async { tokio::time::sleep(Duration::from_secs(3600)).await };
        assert!(matches!(
            run_cancellable(&cancel, stuck).await,
            Err(FabricError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            run_cancellable(&cancel, async { 1 }).await,
            Err(FabricError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn panicking_work_is_reported() {
        let cancel = CancellationToken::new();
        let result = run_cancellable(&cancel, async {
            let broken = true;
            assert!(!broken, "backend bug");
            1
        })
        .await;
        assert!(matches!(result, Err(FabricError::Worker(_))));
    }
}
