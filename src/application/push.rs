//! Location push service
//!
//! Forwards changes of our own Locations, EVSEs and Connectors to every
//! registered party that asked for push updates, through the party's
//! locations Receiver endpoint. Each party sees the change through its own
//! inclusion filter. Purged objects reach the party as `REMOVED`, and a party
//! whose filter, registration or push flag changes is brought up to date.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::client::{ClientError, SharedOcpiClient};
use crate::application::events::{Event, EventSubscriber, PartyChange};
use crate::application::mapping::{from_evse_uid, from_location_id};
use crate::application::parties::SharedPartyRegistry;
use crate::application::store::{ChangeNotification, LocationKey, ObjectKind, SharedObjectStore};
use crate::application::sync::{restrict_location, InclusionFilter};
use crate::domain::ocpi::{
    ConnectorId, EvseStatus, EvseUid, InterfaceRole, Location, ModuleId, PartyScope,
};
use crate::domain::party::RemoteParty;
use crate::shared::{retry_with_backoff, RetryPolicy, ShutdownSignal};

/// One receiver-interface call.
#[derive(Debug, Clone, PartialEq)]
pub enum PushRequest {
    Put { url: String, body: Value },
    Patch { url: String, body: Value },
}

pub struct PushService {
    registry: SharedPartyRegistry,
    store: SharedObjectStore,
    client: SharedOcpiClient,
    owner: PartyScope,
    retry: RetryPolicy,
}

impl PushService {
    pub fn new(
        registry: SharedPartyRegistry,
        store: SharedObjectStore,
        client: SharedOcpiClient,
        owner: PartyScope,
    ) -> Self {
        Self {
            registry,
            store,
            client,
            owner,
            retry: RetryPolicy::default(),
        }
    }

    /// React to one bus event. Returns the number of successful deliveries.
    pub async fn handle(&self, event: &Event) -> usize {
        match event {
            Event::ObjectChanged(notification) => self.push(notification).await,
            Event::PartyChanged(changed) => match &changed.change {
                PartyChange::FilterChanged { previous } => {
                    self.resync(&changed.party, Some(previous)).await
                }
                PartyChange::Registered | PartyChange::PushEnabled => {
                    self.resync(&changed.party, None).await
                }
                _ => 0,
            },
            Event::CommandResolved(_) => 0,
        }
    }

    /// Deliver one change to every push target. Returns the number of
    /// successful deliveries.
    pub async fn push(&self, notification: &ChangeNotification) -> usize {
        if notification.owner != self.owner
            || !matches!(
                notification.kind,
                ObjectKind::Location | ObjectKind::Evse | ObjectKind::Connector
            )
        {
            return 0;
        }
        let Some(location_id) = &notification.location_id else {
            return 0;
        };
        let key = LocationKey::new(self.owner.clone(), location_id.clone());
        let location = match self.store.get_location(&key).await {
            Ok(Some(location)) => location,
            Ok(None) => match purged_location(notification) {
                Some(location) => location,
                None => {
                    debug!(location = %key, "Location gone, nothing to push");
                    return 0;
                }
            },
            Err(err) => {
                warn!(location = %key, error = %err, "Location unavailable for push");
                return 0;
            }
        };

        let mut delivered = 0;
        for party in self.registry.push_targets() {
            let Some(request) = build_request(&party, &location, notification) else {
                continue;
            };
            if self.deliver(&party, request).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Bring one party's copy of our Locations in line with its current
    /// filter. Given the `previous` filter, only Locations whose visible part
    /// changed are sent and EVSEs that dropped out are sent as `REMOVED`;
    /// without it every live Location is sent.
    pub async fn resync(&self, scope: &PartyScope, previous: Option<&InclusionFilter>) -> usize {
        let Some(party) = self.registry.get(scope).filter(RemoteParty::receives_push) else {
            return 0;
        };
        let locations = match self.store.locations().await {
            Ok(locations) => locations,
            Err(err) => {
                warn!(party = %scope, error = %err, "Locations unavailable for resync");
                return 0;
            }
        };

        let mut delivered = 0;
        for location in locations.iter().filter(|l| l.owner() == self.owner) {
            let Some(request) = resync_request(&party, location, previous) else {
                continue;
            };
            if self.deliver(&party, request).await {
                delivered += 1;
            }
        }
        info!(party = %scope, delivered, "Party resynchronized");
        delivered
    }

    async fn deliver(&self, party: &RemoteParty, request: PushRequest) -> bool {
        let Some(token) = party.remote_token.as_deref() else {
            return false;
        };
        let (client, request) = (&self.client, &request);
        let result = retry_with_backoff(
            &self.retry,
            "push_location",
            || async move {
                match request {
                    PushRequest::Put { url, body } => client.put_object(url, token, body).await,
                    PushRequest::Patch { url, body } => client.patch_object(url, token, body).await,
                }
            },
            ClientError::is_transient,
        )
        .await;
        match result {
            Ok(()) => {
                metrics::counter!("ocpi_push_total", "outcome" => "delivered").increment(1);
                true
            }
            Err(err) => {
                metrics::counter!("ocpi_push_total", "outcome" => "failed").increment(1);
                warn!(party = %party.scope, error = %err, "Push delivery failed");
                false
            }
        }
    }

    /// Forward store and party changes until shutdown.
    pub async fn run(self: Arc<Self>, mut events: EventSubscriber, shutdown: ShutdownSignal) {
        info!(owner = %self.owner, "Push service started");
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                message = events.recv() => match message {
                    Some(message) => {
                        self.handle(&message.event).await;
                    }
                    None => break,
                },
            }
        }
        info!("Push service stopped");
    }

    pub fn spawn(self: &Arc<Self>, events: EventSubscriber, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(events, shutdown))
    }
}

pub type SharedPushService = Arc<PushService>;

fn location_url(base: &str, location: &Location) -> String {
    format!(
        "{}/{}/{}/{}",
        base.trim_end_matches('/'),
        location.country_code,
        location.party_id,
        location.id
    )
}

/// The receiver call telling `party` about `notification`, if the party is
/// meant to see it.
fn build_request(
    party: &RemoteParty,
    location: &Location,
    notification: &ChangeNotification,
) -> Option<PushRequest> {
    let base = party.endpoint(ModuleId::Locations, InterfaceRole::Receiver)?;
    let location = restrict_location(location, &party.filter)?;
    let location_url = location_url(base, &location);

    match notification.kind {
        ObjectKind::Location => Some(PushRequest::Put {
            url: location_url,
            body: serde_json::to_value(&location).ok()?,
        }),
        ObjectKind::Evse => {
            let uid = child_ids(&notification.id).next().and_then(EvseUid::parse)?;
            let pool = from_location_id(&location.id);
            if !party.filter.allows_evse(&pool, &from_evse_uid(&uid)) {
                return None;
            }
            let url = format!("{location_url}/{uid}");
            let Some(evse) = location.evse(&uid) else {
                // Purged: the party still holds the EVSE.
                previous_value(notification)?;
                return Some(PushRequest::Patch {
                    url,
                    body: json!({
                        "status": EvseStatus::Removed,
                        "last_updated": notification.timestamp,
                    }),
                });
            };
            let evse = serde_json::to_value(evse).ok()?;
            if is_creation(notification) {
                Some(PushRequest::Put { url, body: evse })
            } else {
                Some(PushRequest::Patch {
                    url,
                    body: changed_fields(&evse, notification),
                })
            }
        }
        ObjectKind::Connector => {
            let mut ids = child_ids(&notification.id);
            let uid = ids.next().and_then(EvseUid::parse)?;
            let connector_id = ids.next().and_then(ConnectorId::parse)?;
            let connector = location.evse(&uid)?.connector(&connector_id)?;
            Some(PushRequest::Put {
                url: format!("{location_url}/{uid}/{connector_id}"),
                body: serde_json::to_value(connector).ok()?,
            })
        }
        _ => None,
    }
}

/// The PUT that moves `party` from what `previous` showed it to what its
/// current filter shows.
fn resync_request(
    party: &RemoteParty,
    location: &Location,
    previous: Option<&InclusionFilter>,
) -> Option<PushRequest> {
    let base = party.endpoint(ModuleId::Locations, InterfaceRole::Receiver)?;
    let visible = restrict_location(location, &party.filter);
    let Some(previous) = previous else {
        let visible = visible.filter(|l| !l.is_removed())?;
        return Some(PushRequest::Put {
            url: location_url(base, &visible),
            body: serde_json::to_value(&visible).ok()?,
        });
    };

    let before = restrict_location(location, previous);
    if before == visible {
        return None;
    }
    let mut update = visible.unwrap_or_else(|| {
        let mut hidden = location.clone();
        hidden.publish = false;
        hidden.evses.clear();
        hidden
    });
    let now = Utc::now();
    for mut evse in before.map(|b| b.evses).unwrap_or_default() {
        if update.evse(&evse.uid).is_none() {
            evse.status = EvseStatus::Removed;
            evse.last_updated = now;
            update.evses.push(evse);
        }
    }
    update.normalize();
    update.refresh_hash();
    Some(PushRequest::Put {
        url: location_url(base, &update),
        body: serde_json::to_value(&update).ok()?,
    })
}

/// The object a removal notification cleared, rebuilt from the old values.
/// `None` unless every change clears its field.
fn previous_value(notification: &ChangeNotification) -> Option<Value> {
    if notification.changes.is_empty() || notification.changes.iter().any(|c| !c.new.is_null()) {
        return None;
    }
    let mut object = Map::new();
    let mut evses = Vec::new();
    for change in &notification.changes {
        match change.field.split_once('.') {
            None => {
                object.insert(change.field.clone(), change.old.clone());
            }
            Some(("evses", _)) => evses.push(change.old.clone()),
            Some(_) => {}
        }
    }
    if !evses.is_empty() {
        object.insert("evses".to_string(), Value::Array(evses));
    }
    // Timestamps are not part of the diff.
    object
        .entry("last_updated")
        .or_insert(serde_json::to_value(notification.timestamp).ok()?);
    Some(Value::Object(object))
}

/// A purged Location as the party has to see it: unpublished, every EVSE
/// `REMOVED`.
fn purged_location(notification: &ChangeNotification) -> Option<Location> {
    if notification.kind != ObjectKind::Location {
        return None;
    }
    let mut location: Location = serde_json::from_value(previous_value(notification)?).ok()?;
    location.publish = false;
    for evse in &mut location.evses {
        evse.status = EvseStatus::Removed;
        evse.last_updated = notification.timestamp;
    }
    location.last_updated = notification.timestamp;
    location.normalize();
    location.refresh_hash();
    Some(location)
}

/// `location/evse[/connector]` → the ids below the Location.
fn child_ids(id: &str) -> impl Iterator<Item = &str> {
    id.split('/').skip(1)
}

fn is_creation(notification: &ChangeNotification) -> bool {
    notification.changes.iter().all(|change| change.old.is_null())
}

/// The top-level fields touched by `notification`, plus `last_updated`.
fn changed_fields(object: &Value, notification: &ChangeNotification) -> Value {
    let mut patch = Map::new();
    for change in &notification.changes {
        let field = change.field.split('.').next().unwrap_or(&change.field);
        if let Some(value) = object.get(field) {
            patch.insert(field.to_string(), value.clone());
        }
    }
    if let Some(stamp) = object.get("last_updated") {
        patch.insert("last_updated".to_string(), stamp.clone());
    }
    Value::Object(patch)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::application::client::fake::{Call, FakeOcpiClient};
    use crate::application::events::EventBus;
    use crate::application::parties::PartyRegistry;
    use crate::application::store::ObjectStore;
    use crate::domain::network::{DomainEvseId, PoolId};
    use crate::domain::ocpi::location::fixtures::{evse, location};
    use crate::application::store::RemovalPolicy;
    use crate::domain::ocpi::{Endpoint, LocationId, Role};
    use crate::domain::party::RegistrationState;

    const EMSP_LOCATIONS: &str = "https://emsp.example.com/ocpi/2.2.1/locations";

    fn owner() -> PartyScope {
        PartyScope::parse("DE", "GEF").unwrap()
    }

    fn subscriber(filter: InclusionFilter) -> RemoteParty {
        let mut party = RemoteParty::new(PartyScope::parse("NL", "EMS").unwrap(), Role::Emsp, "eMSP");
        party.registration = RegistrationState::Registered;
        party.remote_token = Some("token-c".to_string());
        party.push = true;
        party.filter = filter;
        party.endpoints.push(Endpoint {
            identifier: ModuleId::Locations,
            role: InterfaceRole::Receiver,
            url: EMSP_LOCATIONS.to_string(),
        });
        party
    }

    struct Fixture {
        store: SharedObjectStore,
        registry: SharedPartyRegistry,
        client: Arc<FakeOcpiClient>,
        service: PushService,
        events: EventSubscriber,
    }

    fn fixture(party: RemoteParty) -> Fixture {
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe();
        let store = Arc::new(ObjectStore::new(bus.clone()));
        let registry = Arc::new(PartyRegistry::new(bus, 10));
        registry.add_party(party).unwrap();
        let client = Arc::new(FakeOcpiClient::default());
        let service = PushService::new(registry.clone(), store.clone(), client.clone(), owner());
        Fixture {
            store,
            registry,
            client,
            service,
            events,
        }
    }

    impl Fixture {
        async fn push_pending(&mut self) -> usize {
            let mut delivered = 0;
            while let Some(message) = self.events.try_recv() {
                delivered += self.service.handle(&message.event).await;
            }
            delivered
        }
    }

    #[tokio::test]
    async fn new_location_is_put_and_status_change_is_patched() {
        let mut f = fixture(subscriber(InclusionFilter::allow_all()));
        let site = location(&owner(), "P1", vec![evse("E1"), evse("E2")]);
        f.store.upsert_location(site).await.unwrap();
        assert_eq!(f.push_pending().await, 1);

        let key = LocationKey::new(owner(), LocationId::parse("P1").unwrap());
        let mut charging = evse("E1");
        charging.status = EvseStatus::Charging;
        f.store.upsert_evse(&key, charging).await.unwrap();
        assert_eq!(f.push_pending().await, 1);

        let calls = f.client.calls();
        assert!(matches!(
            &calls[0],
            Call::Put { url, .. } if url == &format!("{EMSP_LOCATIONS}/DE/GEF/P1")
        ));
        match &calls[1] {
            Call::Patch { url, body } => {
                assert_eq!(url, &format!("{EMSP_LOCATIONS}/DE/GEF/P1/E1"));
                assert_eq!(body["status"], "CHARGING");
                assert!(body.get("connectors").is_none());
                assert!(body.get("last_updated").is_some());
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn party_filter_hides_excluded_evses() {
        let filter = InclusionFilter {
            exclude_evses: BTreeSet::from([DomainEvseId::new("E2")]),
            ..Default::default()
        };
        let mut f = fixture(subscriber(filter));
        let site = location(&owner(), "P1", vec![evse("E1"), evse("E2")]);
        f.store.upsert_location(site).await.unwrap();
        f.push_pending().await;

        let key = LocationKey::new(owner(), LocationId::parse("P1").unwrap());
        let mut charging = evse("E2");
        charging.status = EvseStatus::Charging;
        f.store.upsert_evse(&key, charging).await.unwrap();
        assert_eq!(f.push_pending().await, 0);

        let calls = f.client.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Put { body, .. } => assert_eq!(body["evses"].as_array().unwrap().len(), 1),
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn foreign_locations_are_not_pushed() {
        let mut f = fixture(subscriber(InclusionFilter::allow_all()));
        let other = PartyScope::parse("FR", "CPO").unwrap();
        f.store
            .upsert_location(location(&other, "X1", vec![evse("E1")]))
            .await
            .unwrap();
        assert_eq!(f.push_pending().await, 0);
        assert!(f.client.calls().is_empty());
    }

    fn ems() -> PartyScope {
        PartyScope::parse("NL", "EMS").unwrap()
    }

    fn p1() -> LocationKey {
        LocationKey::new(owner(), LocationId::parse("P1").unwrap())
    }

    fn put_body(call: &Call) -> &Value {
        match call {
            Call::Put { url, body } => {
                assert_eq!(url, &format!("{EMSP_LOCATIONS}/DE/GEF/P1"));
                body
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    fn statuses(body: &Value) -> Vec<(String, String)> {
        body["evses"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| (e["uid"].as_str().unwrap().to_string(), e["status"].as_str().unwrap().to_string()))
            .collect()
    }

    fn pair(uid: &str, status: &str) -> (String, String) {
        (uid.to_string(), status.to_string())
    }

    #[tokio::test]
    async fn narrowed_filter_withdraws_evses_and_widened_filter_restores_them() {
        let mut f = fixture(subscriber(InclusionFilter::allow_all()));
        f.store
            .upsert_location(location(&owner(), "P1", vec![evse("E1"), evse("E2")]))
            .await
            .unwrap();
        f.push_pending().await;

        let narrowed = InclusionFilter {
            exclude_evses: BTreeSet::from([DomainEvseId::new("E2")]),
            ..Default::default()
        };
        f.registry.set_filter(&ems(), narrowed).unwrap();
        assert_eq!(f.push_pending().await, 1);
        f.registry.set_filter(&ems(), InclusionFilter::allow_all()).unwrap();
        assert_eq!(f.push_pending().await, 1);

        let calls = f.client.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            statuses(put_body(&calls[1])),
            vec![pair("E1", "AVAILABLE"), pair("E2", "REMOVED")]
        );
        assert_eq!(
            statuses(put_body(&calls[2])),
            vec![pair("E1", "AVAILABLE"), pair("E2", "AVAILABLE")]
        );
    }

    #[tokio::test]
    async fn excluding_the_pool_unpublishes_the_location() {
        let mut f = fixture(subscriber(InclusionFilter::allow_all()));
        f.store
            .upsert_location(location(&owner(), "P1", vec![evse("E1"), evse("E2")]))
            .await
            .unwrap();
        f.push_pending().await;

        let filter = InclusionFilter {
            exclude_pools: BTreeSet::from([PoolId::new("P1")]),
            ..Default::default()
        };
        f.registry.set_filter(&ems(), filter).unwrap();
        assert_eq!(f.push_pending().await, 1);

        let calls = f.client.calls();
        let body = put_body(&calls[1]);
        assert_eq!(body["publish"], false);
        assert_eq!(
            statuses(body),
            vec![pair("E1", "REMOVED"), pair("E2", "REMOVED")]
        );
    }

    #[tokio::test]
    async fn filter_change_without_visible_effect_sends_nothing() {
        let mut f = fixture(subscriber(InclusionFilter::allow_all()));
        f.store
            .upsert_location(location(&owner(), "P1", vec![evse("E1")]))
            .await
            .unwrap();
        f.push_pending().await;

        let filter = InclusionFilter {
            exclude_evses: BTreeSet::from([DomainEvseId::new("E9")]),
            ..Default::default()
        };
        f.registry.set_filter(&ems(), filter).unwrap();
        assert_eq!(f.push_pending().await, 0);
        assert_eq!(f.client.calls().len(), 1);
    }

    #[tokio::test]
    async fn enabling_push_sends_every_live_location() {
        let mut party = subscriber(InclusionFilter::allow_all());
        party.push = false;
        let mut f = fixture(party);
        f.store
            .upsert_location(location(&owner(), "P1", vec![evse("E1")]))
            .await
            .unwrap();
        f.store
            .upsert_location(location(&owner(), "P2", vec![evse("E1")]))
            .await
            .unwrap();
        f.store
            .remove_location(
                &LocationKey::new(owner(), LocationId::parse("P2").unwrap()),
                RemovalPolicy::SoftDelete,
            )
            .await
            .unwrap();
        assert_eq!(f.push_pending().await, 0);

        f.registry.set_push(&ems(), true).unwrap();
        assert_eq!(f.push_pending().await, 1);
        let calls = f.client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(statuses(put_body(&calls[0])), vec![pair("E1", "AVAILABLE")]);
    }

    #[tokio::test]
    async fn purged_evse_is_patched_removed() {
        let mut f = fixture(subscriber(InclusionFilter::allow_all()));
        f.store
            .upsert_location(location(&owner(), "P1", vec![evse("E1"), evse("E2")]))
            .await
            .unwrap();
        f.push_pending().await;

        let uid = EvseUid::parse("E2").unwrap();
        f.store.remove_evse(&p1(), &uid, RemovalPolicy::Purge).await.unwrap();
        assert_eq!(f.push_pending().await, 1);

        match &f.client.calls()[1] {
            Call::Patch { url, body } => {
                assert_eq!(url, &format!("{EMSP_LOCATIONS}/DE/GEF/P1/E2"));
                assert_eq!(body["status"], "REMOVED");
                assert!(body.get("last_updated").is_some());
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn purged_location_is_put_unpublished_with_evses_removed() {
        let mut f = fixture(subscriber(InclusionFilter::allow_all()));
        f.store
            .upsert_location(location(&owner(), "P1", vec![evse("E1"), evse("E2")]))
            .await
            .unwrap();
        f.push_pending().await;

        f.store.remove_location(&p1(), RemovalPolicy::Purge).await.unwrap();
        assert_eq!(f.push_pending().await, 1);

        let calls = f.client.calls();
        let body = put_body(&calls[1]);
        assert_eq!(body["publish"], false);
        assert_eq!(body["address"], "Main Street 1");
        assert_eq!(
            statuses(body),
            vec![pair("E1", "REMOVED"), pair("E2", "REMOVED")]
        );
    }
}
