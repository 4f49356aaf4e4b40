//! Synchronization adapter
//!
//! Consumes the network event feed and keeps the Locations owned by this
//! platform in the object store in step with the pools they project. Events
//! are routed to the queue of the Location they affect and applied as
//! field-level updates; membership changes (re-parenting, removal) and
//! anything that cannot be applied incrementally fall back to a full
//! reprojection of the Location.

use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::filter::InclusionFilter;
use super::queue::{spawn_worker, Job, JobSender, WeakJobSender};
use crate::application::mapping::{
    apply_evse_field, apply_pool_field, from_location_id, project_evse, project_location,
    property_mapping, to_evse_uid, to_location_id, MappingError, OcpiField, Projection,
};
use crate::application::store::{LocationKey, RemovalPolicy, SharedObjectStore, StoreError};
use crate::domain::network::{
    DomainEvseId, EntityKind, EntityRef, NetworkChange, NetworkEvent, PoolId, SharedNetworkView,
    StationId,
};
use crate::domain::ocpi::{EvseStatus, Location, PartyScope};
use crate::shared::{retry_with_backoff, RetryPolicy, ShutdownSignal};

const MAX_RECORDED_FAILURES: usize = 1000;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub queue_capacity: usize,
    pub enqueue_timeout: Duration,
    /// A Location queue without work for this long is dropped.
    pub queue_idle_timeout: Duration,
    pub removal_policy: RemovalPolicy,
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            enqueue_timeout: Duration::from_secs(1),
            queue_idle_timeout: Duration::from_secs(60),
            removal_policy: RemovalPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    fn kind(&self) -> FailureKind {
        match self {
            Self::Mapping(_) => FailureKind::Mapping,
            Self::Store(_) => FailureKind::Store,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A network id outside the OCPI identifier grammar.
    Mapping,
    /// The store refused the write, or stayed contended past every retry.
    Store,
    /// The Location's queue stayed full past the enqueue timeout; the event was dropped.
    Overflow,
}

impl FailureKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Mapping => "mapping",
            Self::Store => "store",
            Self::Overflow => "overflow",
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncFailure {
    pub at: DateTime<Utc>,
    /// Pool the failed work was about.
    pub pool: String,
    pub kind: FailureKind,
    pub reason: String,
}

pub struct SyncAdapter {
    view: SharedNetworkView,
    store: SharedObjectStore,
    owner: PartyScope,
    filter: RwLock<InclusionFilter>,
    config: SyncConfig,
    queues: DashMap<PoolId, JobSender>,
    /// Last known placement, needed once an entity is gone from the network.
    evse_pools: DashMap<DomainEvseId, PoolId>,
    station_pools: DashMap<StationId, PoolId>,
    failures: Mutex<VecDeque<SyncFailure>>,
}

impl SyncAdapter {
    pub fn new(
        view: SharedNetworkView,
        store: SharedObjectStore,
        owner: PartyScope,
        filter: InclusionFilter,
        config: SyncConfig,
    ) -> Self {
        Self {
            view,
            store,
            owner,
            filter: RwLock::new(filter),
            config,
            queues: DashMap::new(),
            evse_pools: DashMap::new(),
            station_pools: DashMap::new(),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn filter(&self) -> InclusionFilter {
        match self.filter.read() {
            Ok(filter) => filter.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Recorded failures, oldest first.
    pub fn failures(&self) -> Vec<SyncFailure> {
        self.failures
            .lock()
            .map(|failures| failures.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, pool: &PoolId, kind: FailureKind, reason: String) {
        warn!(%pool, kind = kind.as_str(), %reason, "Synchronization failure");
        metrics::counter!("ocpi_sync_failures_total", "kind" => kind.as_str()).increment(1);
        if let Ok(mut failures) = self.failures.lock() {
            if failures.len() == MAX_RECORDED_FAILURES {
                failures.pop_front();
            }
            failures.push_back(SyncFailure {
                at: Utc::now(),
                pool: pool.to_string(),
                kind,
                reason,
            });
        }
    }

    // ── Event routing ──────────────────────────────────────────

    /// Route one network event to the queue of the Location it affects.
    pub async fn handle(self: &Arc<Self>, event: NetworkEvent) {
        metrics::counter!("ocpi_sync_events_total", "change" => event.event_type()).increment(1);
        debug!(entity = %event.entity, change = event.event_type(), "Network event received");

        match (&event.entity, &event.change) {
            (EntityRef::Pool(pool), NetworkChange::Created | NetworkChange::Removed) => {
                self.enqueue(pool, Job::Reproject).await;
            }
            (EntityRef::Pool(pool), NetworkChange::PropertyChanged { property, .. }) => {
                match property_mapping(EntityKind::Pool, property) {
                    Some(field) => self.enqueue(pool, Job::PoolField(field)).await,
                    None => dropped(&event.entity, property),
                }
            }
            (EntityRef::Station(station), NetworkChange::Created) => {
                if let Some(pool) = self.view.pool_of_station(station) {
                    self.station_pools.insert(station.clone(), pool.clone());
                    self.enqueue(&pool, Job::Reproject).await;
                }
            }
            (EntityRef::Station(station), NetworkChange::Removed) => {
                if let Some((_, pool)) = self.station_pools.remove(station) {
                    self.enqueue(&pool, Job::Reproject).await;
                }
            }
            (EntityRef::Station(station), NetworkChange::PropertyChanged { property, old, new }) => {
                match property_mapping(EntityKind::Station, property) {
                    Some(OcpiField::EvseSet) => self.reparent_station(station, old, new).await,
                    _ => dropped(&event.entity, property),
                }
            }
            (EntityRef::Evse(evse), NetworkChange::Created) => {
                if let Some(pool) = self.pool_of_evse(evse) {
                    self.enqueue(&pool, Job::UpsertEvse(evse.clone())).await;
                }
            }
            (EntityRef::Evse(evse), NetworkChange::Removed) => {
                if let Some((_, pool)) = self.evse_pools.remove(evse) {
                    self.enqueue(&pool, Job::RemoveEvse(evse.clone())).await;
                }
            }
            (EntityRef::Evse(evse), NetworkChange::StatusChanged { .. }) => {
                self.evse_field(evse, OcpiField::EvseStatus).await;
            }
            (EntityRef::Evse(evse), NetworkChange::PropertyChanged { property, .. }) => {
                match property_mapping(EntityKind::Evse, property) {
                    Some(OcpiField::EvseSet) => self.reparent_evse(evse).await,
                    Some(field) => self.evse_field(evse, field).await,
                    None => dropped(&event.entity, property),
                }
            }
            (_, NetworkChange::StatusChanged { .. }) => dropped(&event.entity, "status"),
        }
    }

    async fn evse_field(self: &Arc<Self>, evse: &DomainEvseId, field: OcpiField) {
        if let Some(pool) = self.pool_of_evse(evse) {
            let job = Job::EvseField {
                evse: evse.clone(),
                field,
            };
            self.enqueue(&pool, job).await;
        }
    }

    fn pool_of_evse(&self, evse: &DomainEvseId) -> Option<PoolId> {
        match self.view.pool_of_evse(evse) {
            Some(pool) => {
                self.evse_pools.insert(evse.clone(), pool.clone());
                Some(pool)
            }
            None => self.evse_pools.get(evse).map(|pool| pool.clone()),
        }
    }

    async fn reparent_station(self: &Arc<Self>, station: &StationId, old: &Value, new: &Value) {
        let previous = old
            .as_str()
            .map(PoolId::new)
            .or_else(|| self.station_pools.get(station).map(|pool| pool.clone()));
        let current = new
            .as_str()
            .map(PoolId::new)
            .or_else(|| self.view.pool_of_station(station));

        if let Some(current) = &current {
            self.station_pools.insert(station.clone(), current.clone());
            for evse in self.view.evses_of_station(station) {
                self.evse_pools.insert(evse.id, current.clone());
            }
        }
        info!(%station, from = ?previous, to = ?current, "Station moved between pools");
        self.reproject_both(previous, current).await;
    }

    async fn reparent_evse(self: &Arc<Self>, evse: &DomainEvseId) {
        let previous = self.evse_pools.get(evse).map(|pool| pool.clone());
        let current = self.view.pool_of_evse(evse);
        if let Some(current) = &current {
            self.evse_pools.insert(evse.clone(), current.clone());
        }
        self.reproject_both(previous, current).await;
    }

    async fn reproject_both(self: &Arc<Self>, previous: Option<PoolId>, current: Option<PoolId>) {
        if let Some(previous) = &previous {
            self.enqueue(previous, Job::Reproject).await;
        }
        if let Some(current) = current.filter(|c| previous.as_ref() != Some(c)) {
            self.enqueue(&current, Job::Reproject).await;
        }
    }

    fn queue(self: &Arc<Self>, pool: &PoolId) -> JobSender {
        self.queues
            .entry(pool.clone())
            .or_insert_with(|| {
                spawn_worker(
                    pool.clone(),
                    self.config.queue_capacity,
                    self.config.queue_idle_timeout,
                    Arc::downgrade(self),
                )
            })
            .clone()
    }

    /// Drop the queue of `pool` if it is still `queue` and holds no work.
    pub(crate) fn retire_queue(&self, pool: &PoolId, queue: &WeakJobSender) -> bool {
        let Some(queue) = queue.upgrade() else {
            return false;
        };
        let retired = self
            .queues
            .remove_if(pool, |_, current| {
                current.same_channel(&queue) && current.capacity() == current.max_capacity()
            })
            .is_some();
        if retired {
            debug!(%pool, "Idle sync queue retired");
        }
        retired
    }

    async fn enqueue(self: &Arc<Self>, pool: &PoolId, mut job: Job) {
        loop {
            let sender = self.queue(pool);
            match sender.send_timeout(job, self.config.enqueue_timeout).await {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(job)) => {
                    self.record(pool, FailureKind::Overflow, format!("queue full, dropped {job:?}"));
                    return;
                }
                Err(SendTimeoutError::Closed(returned)) => {
                    // Retired between lookup and send.
                    self.queues
                        .remove_if(pool, |_, current| current.same_channel(&sender));
                    job = returned;
                }
            }
        }
    }

    // ── Workers ────────────────────────────────────────────────

    pub(crate) async fn execute(&self, pool: &PoolId, job: Job) {
        let result = match job {
            Job::Barrier(done) => {
                let _ = done.send(());
                return;
            }
            Job::Reproject => self.reproject(pool).await,
            Job::PoolField(field) => self.apply_pool(pool, field).await,
            Job::UpsertEvse(evse) => self.upsert_evse(pool, &evse).await,
            Job::EvseField { evse, field } => self.apply_evse(pool, &evse, field).await,
            Job::RemoveEvse(evse) => self.remove_evse(pool, &evse).await,
        };
        if let Err(err) = result {
            self.record(pool, err.kind(), err.to_string());
        }
    }

    fn key(&self, pool: &PoolId) -> Result<LocationKey, SyncError> {
        Ok(LocationKey::new(self.owner.clone(), to_location_id(pool)?))
    }

    async fn retry<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        retry_with_backoff(&self.config.retry, operation, call, StoreError::is_transient).await
    }

    async fn stored_location(&self, key: &LocationKey) -> Result<Option<Location>, StoreError> {
        let store = &self.store;
        self.retry("get_location", move || store.get_location(key)).await
    }

    async fn write_location(&self, location: Location) -> Result<(), SyncError> {
        let store = &self.store;
        self.retry("upsert_location", move || store.upsert_location(location.clone()))
            .await?;
        Ok(())
    }

    /// Rebuild the Location from the full current state of its pool.
    async fn reproject(&self, pool_id: &PoolId) -> Result<(), SyncError> {
        let key = self.key(pool_id)?;
        let filter = self.filter();
        let Some(pool) = self.view.pool(pool_id).filter(|p| filter.allows_pool(&p.id)) else {
            return self.remove_location(&key).await;
        };

        let evses = self.view.evses_of_pool(pool_id);
        for evse in &evses {
            self.evse_pools.insert(evse.id.clone(), pool_id.clone());
        }
        let Projection {
            mut location,
            skipped,
        } = project_location(&self.owner, &pool, &evses, &filter, Utc::now())?;
        for err in skipped {
            self.record(pool_id, FailureKind::Mapping, err.to_string());
        }

        if self.config.removal_policy == RemovalPolicy::SoftDelete {
            if let Some(stored) = self.stored_location(&key).await? {
                carry_removed_evses(&mut location, &stored);
            }
        }
        self.write_location(location).await
    }

    async fn remove_location(&self, key: &LocationKey) -> Result<(), SyncError> {
        let store = &self.store;
        let policy = self.config.removal_policy;
        match self
            .retry("remove_location", move || store.remove_location(key, policy))
            .await
        {
            Ok(_) | Err(StoreError::UnknownLocation(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn apply_pool(&self, pool_id: &PoolId, field: OcpiField) -> Result<(), SyncError> {
        // Gone already: the removal event follows.
        let Some(pool) = self.view.pool(pool_id) else {
            return Ok(());
        };
        if !self.filter().allows_pool(pool_id) {
            return Ok(());
        }
        let key = self.key(pool_id)?;
        let Some(mut location) = self.stored_location(&key).await?.filter(|l| l.publish) else {
            return self.reproject(pool_id).await;
        };
        if apply_pool_field(&mut location, &pool, field) {
            location.last_updated = Utc::now();
            self.write_location(location).await?;
        }
        Ok(())
    }

    async fn upsert_evse(&self, pool: &PoolId, evse_id: &DomainEvseId) -> Result<(), SyncError> {
        let Some(evse) = self.view.evse(evse_id) else {
            return Ok(());
        };
        if !self.filter().allows_evse(pool, evse_id) {
            return Ok(());
        }
        let key = self.key(pool)?;
        let projected = project_evse(&evse, Utc::now())?;
        let store = &self.store;
        let key_ref = &key;
        match self
            .retry("upsert_evse", move || store.upsert_evse(key_ref, projected.clone()))
            .await
        {
            Ok(_) => Ok(()),
            Err(StoreError::UnknownLocation(_)) => self.reproject(pool).await,
            Err(err) => Err(err.into()),
        }
    }

    async fn apply_evse(
        &self,
        pool: &PoolId,
        evse_id: &DomainEvseId,
        field: OcpiField,
    ) -> Result<(), SyncError> {
        let Some(evse) = self.view.evse(evse_id) else {
            return Ok(());
        };
        if !self.filter().allows_evse(pool, evse_id) {
            return Ok(());
        }
        let key = self.key(pool)?;
        let uid = to_evse_uid(evse_id)?;
        let store = &self.store;
        let (key_ref, uid_ref) = (&key, &uid);
        let stored = self
            .retry("get_evse", move || store.try_get_evse(key_ref, uid_ref))
            .await?;
        let Some(mut target) = stored.filter(|e| e.status != EvseStatus::Removed) else {
            return self.upsert_evse(pool, evse_id).await;
        };

        let now = Utc::now();
        if apply_evse_field(&mut target, &evse, field, now)? {
            target.last_updated = now;
            self.retry("upsert_evse", move || store.upsert_evse(key_ref, target.clone()))
                .await?;
        }
        Ok(())
    }

    async fn remove_evse(&self, pool: &PoolId, evse_id: &DomainEvseId) -> Result<(), SyncError> {
        // Never stored under an unmappable id.
        let Ok(uid) = to_evse_uid(evse_id) else {
            return Ok(());
        };
        let key = self.key(pool)?;
        let store = &self.store;
        let policy = self.config.removal_policy;
        let (key_ref, uid_ref) = (&key, &uid);
        match self
            .retry("remove_evse", move || store.remove_evse(key_ref, uid_ref, policy))
            .await
        {
            Ok(_) | Err(StoreError::UnknownLocation(_) | StoreError::UnknownEvse(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    // ── Bulk operations ────────────────────────────────────────

    /// Wait until every job queued so far has run.
    pub async fn flush(&self) {
        let senders: Vec<JobSender> = self.queues.iter().map(|q| q.value().clone()).collect();
        let mut barriers = Vec::with_capacity(senders.len());
        for sender in senders {
            let (done, waiter) = oneshot::channel();
            if sender.send(Job::Barrier(done)).await.is_ok() {
                barriers.push(waiter);
            }
        }
        for waiter in barriers {
            let _ = waiter.await;
        }
    }

    /// Reproject every pool of the network plus every stored Location of
    /// ours whose pool no longer exists. Returns the number of Locations
    /// visited.
    pub async fn full_resync(self: &Arc<Self>) -> usize {
        self.rebuild_placements();
        let mut pools: BTreeSet<PoolId> = self.view.pools().into_iter().map(|p| p.id).collect();
        match self.store.locations().await {
            Ok(locations) => pools.extend(
                locations
                    .iter()
                    .filter(|l| l.owner() == self.owner)
                    .map(|l| from_location_id(&l.id)),
            ),
            Err(err) => warn!(error = %err, "Stored Locations unavailable, resync covers network pools only"),
        }

        for pool in &pools {
            self.enqueue(pool, Job::Reproject).await;
        }
        self.flush().await;
        info!(locations = pools.len(), "Full resynchronization complete");
        pools.len()
    }

    fn rebuild_placements(&self) {
        self.station_pools.clear();
        self.evse_pools.clear();
        for pool in self.view.pools() {
            for station in self.view.stations_of(&pool.id) {
                for evse in self.view.evses_of_station(&station.id) {
                    self.evse_pools.insert(evse.id, pool.id.clone());
                }
                self.station_pools.insert(station.id, pool.id.clone());
            }
        }
    }

    /// Swap the inclusion filter and converge the store on it.
    pub async fn set_filter(self: &Arc<Self>, filter: InclusionFilter) -> usize {
        match self.filter.write() {
            Ok(mut current) => *current = filter,
            Err(poisoned) => *poisoned.into_inner() = filter,
        }
        info!("Inclusion filter replaced");
        self.full_resync().await
    }

    /// Consume the network feed until shutdown. A lagging receiver has
    /// missed events, so it triggers a full resync.
    pub async fn run(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<NetworkEvent>,
        shutdown: ShutdownSignal,
    ) {
        info!(owner = %self.owner, "Synchronization adapter started");
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                received = events.recv() => match received {
                    Ok(event) => self.handle(event).await,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Network feed lagged, resynchronizing");
                        self.full_resync().await;
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        self.flush().await;
        info!("Synchronization adapter stopped");
    }

    pub fn spawn(
        self: &Arc<Self>,
        events: broadcast::Receiver<NetworkEvent>,
        shutdown: ShutdownSignal,
    ) -> JoinHandle<()> {
        let adapter = self.clone();
        tokio::spawn(async move { adapter.run(events, shutdown).await })
    }
}

pub type SharedSyncAdapter = Arc<SyncAdapter>;

fn dropped(entity: &EntityRef, property: &str) {
    debug!(%entity, property, "Property not visible over OCPI, change dropped");
}

/// Keep EVSEs that vanished from the projection as `REMOVED` entries.
fn carry_removed_evses(location: &mut Location, stored: &Location) {
    let now = Utc::now();
    for evse in &stored.evses {
        if location.evse(&evse.uid).is_some() {
            continue;
        }
        let mut removed = evse.clone();
        if removed.status != EvseStatus::Removed {
            removed.status = EvseStatus::Removed;
            removed.last_updated = now;
        }
        location.evses.push(removed);
    }
    location.normalize();
}
