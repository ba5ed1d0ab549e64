use std::{ops::Sub, time::Duration};

use chrono::{TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::{JobStore, StoreError};

use super::PrunerConfig;

pub(crate) struct PrunerRunner<S: JobStore> {
    config: PrunerConfig,
    store: S,
}

impl<S> PrunerRunner<S>
where
    S: JobStore,
{
    pub fn new(store: S, config: PrunerConfig) -> Self {
        Self { store, config }
    }

    pub fn spawn(self, cancellation_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn({
            async move {
                loop {
                    let Some(next) = self.config.schedule.upcoming(Utc).next() else {
                        tracing::warn!("No future scheduled time for the job pruner");
                        break;
                    };
                    let delay = next
                        .sub(Utc::now())
                        .sub(TimeDelta::milliseconds(10))
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            let _ = self.prune().await;
                            if let Ok(delay) = (next - Utc::now()).to_std() {
                                tokio::time::sleep(delay).await;
                            }
                        }
                        _ = cancellation_token.cancelled() => {
                            tracing::debug!("Shutting down the job pruner");
                            break;
                        },
                    }
                }
            }
        })
    }

    async fn prune(&self) -> Result<usize, StoreError> {
        match self.config.max_age {
            Some(max_age) => self.store.prune_terminal(Utc::now() - max_age).await,
            None => self.store.remove_terminal().await,
        }
        .inspect(|pruned| tracing::debug!(pruned, "Pruned {pruned} terminal jobs"))
        .inspect_err(|err| tracing::error!(?err, "Failed to clean up jobs with error {err}"))
    }
}
