//! Per-Location work queues
//!
//! Every Location gets a bounded channel drained by a single worker, so
//! jobs touching one Location run strictly in arrival order while
//! different Locations progress independently. A worker that stays idle
//! retires its queue; the next job for the Location starts a fresh one.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::adapter::SyncAdapter;
use crate::application::mapping::OcpiField;
use crate::domain::network::{DomainEvseId, PoolId};

#[derive(Debug)]
pub(crate) enum Job {
    /// Rebuild the Location from the current network state.
    Reproject,
    PoolField(OcpiField),
    UpsertEvse(DomainEvseId),
    EvseField { evse: DomainEvseId, field: OcpiField },
    RemoveEvse(DomainEvseId),
    /// Completed once every job queued before it has run.
    Barrier(oneshot::Sender<()>),
}

pub(crate) type JobSender = mpsc::Sender<Job>;
pub(crate) type WeakJobSender = mpsc::WeakSender<Job>;

/// Start the worker for `pool` and return its queue.
pub(crate) fn spawn_worker(
    pool: PoolId,
    capacity: usize,
    idle_timeout: Duration,
    adapter: Weak<SyncAdapter>,
) -> JobSender {
    let (sender, mut receiver) = mpsc::channel(capacity.max(1));
    let own = sender.downgrade();
    tokio::spawn(async move {
        debug!(%pool, "Sync worker started");
        loop {
            let job = match tokio::time::timeout(idle_timeout, receiver.recv()).await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(_) => {
                    let Some(adapter) = adapter.upgrade() else {
                        break;
                    };
                    if adapter.retire_queue(&pool, &own) {
                        // Run whatever slipped in, then stop.
                        receiver.close();
                    }
                    continue;
                }
            };
            let Some(adapter) = adapter.upgrade() else {
                break;
            };
            adapter.execute(&pool, job).await;
        }
        debug!(%pool, "Sync worker stopped");
    });
    sender
}
