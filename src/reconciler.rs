//! Keeps a [BackendSetRepo] in sync with live placement.

use crate::backend::BackendSetRepo;
use crate::backoff::ExponentialBackoff;
use crate::join::propagate_panics;
use crate::placement::SharedPlacementQuery;
use crate::policy::{Policy, ReconcilerConfig};
#[cfg(feature = "probes")]
use crate::probes;

use debug_ignore::DebugIgnore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{event, instrument, Level};

struct ReconcilerWorker {
    placement: DebugIgnore<SharedPlacementQuery>,
    repo: Arc<BackendSetRepo>,
    policy: Policy,
    config: ReconcilerConfig,

    // Delay before the next retry, if the last query failed.
    retry_delay: Option<Duration>,
}

impl ReconcilerWorker {
    // Queries placement once, returning how long to wait before the next
    // query.
    #[instrument(skip(self), name = "ReconcilerWorker::reconcile")]
    async fn reconcile(&mut self) -> Duration {
        #[cfg(feature = "probes")]
        probes::reconcile__start!(|| ());

        match self.placement.instances().await {
            Ok(placements) => {
                let groups = self
                    .repo
                    .replace_from_placements(&placements, self.policy.reserved_port);
                event!(
                    Level::DEBUG,
                    instances = placements.len(),
                    groups,
                    "Replaced backend sets"
                );
                #[cfg(feature = "probes")]
                probes::reconcile__done!(|| groups as u64);

                self.retry_delay = None;
                self.config.interval
            }
            Err(err) => {
                event!(Level::ERROR, ?err, "Placement query failed");
                #[cfg(feature = "probes")]
                probes::reconcile__failed!(|| err.as_str());

                let delay = match self.retry_delay {
                    None => self.config.failure_backoff,
                    Some(delay) => delay.exponential_backoff(self.config.max_failure_backoff),
                };
                self.retry_delay = Some(delay);
                delay.add_spread(self.config.backoff_spread)
            }
        }
    }

    async fn run(mut self, mut terminate_rx: oneshot::Receiver<()>) {
        loop {
            let delay = tokio::select! {
                _ = &mut terminate_rx => return,
                delay = self.reconcile() => delay,
            };

            tokio::select! {
                _ = &mut terminate_rx => return,
                _ = tokio::time::sleep(delay) => {},
            }
        }
    }
}

/// Periodically rebuilds a [BackendSetRepo] from live placement.
///
/// Queries run immediately on construction and then every
/// [ReconcilerConfig::interval]. A failed query leaves the repo untouched
/// and is retried with exponential backoff.
///
/// Must be constructed within a tokio runtime.
pub struct BackendSetReconciler {
    handle: Option<JoinHandle<()>>,
    terminate_tx: Option<oneshot::Sender<()>>,
}

impl BackendSetReconciler {
    pub fn new(
        placement: SharedPlacementQuery,
        repo: Arc<BackendSetRepo>,
        policy: Policy,
        config: ReconcilerConfig,
    ) -> Self {
        let worker = ReconcilerWorker {
            placement: DebugIgnore(placement),
            repo,
            policy,
            config,
            retry_delay: None,
        };
        let (terminate_tx, terminate_rx) = oneshot::channel();
        let handle = Some(tokio::task::spawn(async move {
            worker.run(terminate_rx).await;
        }));

        Self {
            handle,
            terminate_tx: Some(terminate_tx),
        }
    }

    /// Cleanly stops the background worker.
    pub async fn terminate(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let Some(terminate_tx) = self.terminate_tx.take() else {
            return;
        };

        let _send_result = terminate_tx.send(());
        propagate_panics(handle.await);
    }
}

impl Drop for BackendSetReconciler {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.abort();
    }
}
