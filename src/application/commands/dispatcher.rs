//! Command dispatcher
//!
//! Forwards remote commands to the party executing them and correlates the
//! asynchronous result arriving later on our callback url. Every dispatched
//! command is tracked by a correlation id; the synchronous acknowledgement
//! is awaited with `ack_timeout`, after which a timer task races the result.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::pending::{CommandState, CommandView, Originator, PendingCommand, Resolution};
use crate::application::client::{ClientError, SharedOcpiClient};
use crate::application::events::{CommandResolvedEvent, Event, SharedEventBus};
use crate::application::parties::{LocalIdentity, SharedPartyRegistry};
use crate::application::store::{SharedObjectStore, StoreError};
use crate::domain::ocpi::{
    status, CommandRequest, CommandResponse, CommandResponseType, CommandResult, CommandType,
    InterfaceRole, ModuleId, PartyScope,
};
use crate::domain::party::RemoteParty;
use crate::shared::{retry_with_backoff, RetryPolicy, ShutdownSignal};

#[derive(Debug, Clone)]
pub struct CommandConfig {
    pub ack_timeout: Duration,
    pub result_timeout: Duration,
    pub result_timeouts: HashMap<CommandType, Duration>,
    pub retention: Duration,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(10),
            result_timeout: Duration::from_secs(60),
            result_timeouts: HashMap::new(),
            retention: Duration::from_secs(300),
        }
    }
}

impl CommandConfig {
    pub fn result_timeout_for(&self, kind: CommandType) -> Duration {
        self.result_timeouts
            .get(&kind)
            .copied()
            .unwrap_or(self.result_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown party {0}")]
    UnknownParty(PartyScope),
    #[error("unknown location {0}")]
    UnknownLocation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommandError {
    pub fn status_code(&self) -> u32 {
        match self {
            Self::UnknownParty(_) => status::CLIENT_ERROR,
            Self::UnknownLocation(_) => status::UNKNOWN_LOCATION,
            Self::Store(_) => status::SERVER_ERROR,
        }
    }
}

/// Synchronous answer to a dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub correlation_id: Uuid,
    pub response: CommandResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved,
    /// Already resolved or timed out; the result was dropped.
    Late,
    Unknown,
    /// The reporting party is not the command's target.
    Foreign,
}

pub struct CommandDispatcher {
    pending: DashMap<Uuid, Arc<PendingCommand>>,
    completed: DashMap<Uuid, (Arc<PendingCommand>, Instant)>,
    /// reservation id -> party holding the reservation
    reservations: DashMap<String, PartyScope>,
    registry: SharedPartyRegistry,
    store: SharedObjectStore,
    client: SharedOcpiClient,
    identity: Arc<LocalIdentity>,
    bus: SharedEventBus,
    config: CommandConfig,
    retry: RetryPolicy,
}

impl CommandDispatcher {
    pub fn new(
        registry: SharedPartyRegistry,
        store: SharedObjectStore,
        client: SharedOcpiClient,
        identity: Arc<LocalIdentity>,
        bus: SharedEventBus,
        config: CommandConfig,
    ) -> Self {
        Self {
            pending: DashMap::new(),
            completed: DashMap::new(),
            reservations: DashMap::new(),
            registry,
            store,
            client,
            identity,
            bus,
            config,
            retry: RetryPolicy::default(),
        }
    }

    /// Number of commands still waiting for a result.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Send `request` to `target`. Returns once the target acknowledged the
    /// command (or the command already failed).
    pub async fn dispatch(
        self: &Arc<Self>,
        mut request: CommandRequest,
        target: &PartyScope,
        originator: Option<Originator>,
    ) -> Result<Dispatched, CommandError> {
        let party = self
            .registry
            .get(target)
            .ok_or_else(|| CommandError::UnknownParty(target.clone()))?;
        let kind = request.kind();
        let command = Arc::new(PendingCommand::new(kind, target.clone(), originator));
        let correlation_id = command.correlation_id;
        self.pending.insert(correlation_id, command.clone());
        info!(%correlation_id, command = %kind, target = %target, "Dispatching command");

        if !party.is_authorized() {
            return Ok(self.fail_fast(&command, "target party is not allowed"));
        }
        let (Some(endpoint), Some(token)) = (
            party
                .endpoint(ModuleId::Commands, InterfaceRole::Receiver)
                .map(str::to_string),
            party.remote_token.clone(),
        ) else {
            return Ok(self.fail_fast(&command, "target party has no commands endpoint"));
        };

        command.advance(CommandState::AwaitingRemoteAck);
        request.set_response_url(
            self.identity
                .command_response_url(kind, &correlation_id.to_string()),
        );
        let url = format!("{}/{kind}", endpoint.trim_end_matches('/'));

        let started = Instant::now();
        let ack = tokio::time::timeout(
            self.config.ack_timeout,
            self.client.post_command(&url, &token, &request),
        )
        .await;
        metrics::histogram!("ocpi_command_ack_seconds", "command" => kind.as_str())
            .record(started.elapsed().as_secs_f64());

        let response = match ack {
            Err(_) => {
                warn!(%correlation_id, command = %kind, "No acknowledgement within ack timeout");
                self.finish(&command, Resolution::TimedOut);
                return Ok(Dispatched {
                    correlation_id,
                    response: refusal("no acknowledgement from target"),
                });
            }
            Ok(Err(e)) => return Ok(self.fail_fast(&command, &e.to_string())),
            Ok(Ok(response)) => response,
        };

        if response.result != CommandResponseType::Accepted {
            info!(%correlation_id, command = %kind, result = ?response.result, "Command refused by target");
            self.finish(&command, Resolution::Refused(response.clone()));
            return Ok(Dispatched {
                correlation_id,
                response,
            });
        }

        match &request {
            CommandRequest::ReserveNow(r) => {
                self.reservations
                    .insert(r.reservation_id.clone(), target.clone());
            }
            CommandRequest::CancelReservation(r) => {
                self.reservations.remove(&r.reservation_id);
            }
            _ => {}
        }

        command.advance(CommandState::AwaitingAsyncResult);
        if !command.state().is_terminal() {
            self.arm_timer(&command);
        }
        Ok(Dispatched {
            correlation_id,
            response,
        })
    }

    fn arm_timer(self: &Arc<Self>, command: &Arc<PendingCommand>) {
        let wait = self.config.result_timeout_for(command.kind);
        let deadline = Utc::now()
            + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::zero());
        let dispatcher: Weak<Self> = Arc::downgrade(self);
        let correlation_id = command.correlation_id;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(dispatcher) = dispatcher.upgrade() {
                dispatcher.expire(&correlation_id);
            }
        });
        command.arm_timer(deadline, timer.abort_handle());
        debug!(%correlation_id, timeout_secs = wait.as_secs(), "Result timer armed");
    }

    fn expire(&self, correlation_id: &Uuid) {
        let Some(command) = self.pending.get(correlation_id).map(|c| c.clone()) else {
            return;
        };
        if self.finish(&command, Resolution::TimedOut) {
            warn!(%correlation_id, command = %command.kind, "Command timed out waiting for result");
        }
    }

    /// Resolve with a transport failure without starting any timer.
    fn fail_fast(&self, command: &Arc<PendingCommand>, reason: &str) -> Dispatched {
        warn!(correlation_id = %command.correlation_id, command = %command.kind, reason, "Command failed");
        self.finish(command, Resolution::TransportFailure(reason.to_string()));
        Dispatched {
            correlation_id: command.correlation_id,
            response: refusal(reason),
        }
    }

    /// Set the terminal result. Returns `false` if the command was already
    /// resolved.
    fn finish(&self, command: &Arc<PendingCommand>, resolution: Resolution) -> bool {
        let notify_originator = matches!(resolution, Resolution::Result(_));
        let label = resolution.label();
        let result = resolution.to_result();
        let Some(previous) = command.resolve(resolution) else {
            return false;
        };

        let correlation_id = command.correlation_id;
        self.pending.remove(&correlation_id);
        self.completed
            .insert(correlation_id, (command.clone(), Instant::now()));
        metrics::counter!(
            "ocpi_commands_total",
            "command" => command.kind.as_str(),
            "outcome" => label
        )
        .increment(1);
        info!(%correlation_id, command = %command.kind, outcome = label, result = ?result.result, "Command resolved");

        self.bus.publish(Event::CommandResolved(CommandResolvedEvent {
            correlation_id,
            command: command.kind,
            target: command.target.clone(),
            result: result.result,
        }));

        if notify_originator || previous == CommandState::AwaitingAsyncResult {
            if let Some(originator) = command.originator.clone() {
                self.notify_originator(originator, result);
            }
        }
        true
    }

    /// Push the final result to the party that asked for the command.
    fn notify_originator(&self, originator: Originator, result: CommandResult) {
        let Some(token) = self
            .registry
            .get(&originator.party)
            .and_then(|p| p.remote_token)
        else {
            warn!(party = %originator.party, "Originator has no token, result not delivered");
            return;
        };
        let client = self.client.clone();
        let policy = self.retry.clone();
        tokio::spawn(async move {
            let delivered = retry_with_backoff(
                &policy,
                "deliver_command_result",
                || client.post_command_result(&originator.response_url, &token, &result),
                ClientError::is_transient,
            )
            .await;
            if let Err(e) = delivered {
                warn!(party = %originator.party, url = %originator.response_url, error = %e, "Command result not delivered");
            }
        });
    }

    /// Asynchronous result reported by `from` for `correlation_id`.
    pub fn result(
        &self,
        correlation_id: &Uuid,
        from: &PartyScope,
        result: CommandResult,
    ) -> ResolveOutcome {
        if let Some(command) = self.pending.get(correlation_id).map(|c| c.clone()) {
            if &command.target != from {
                return ResolveOutcome::Foreign;
            }
            return if self.finish(&command, Resolution::Result(result)) {
                ResolveOutcome::Resolved
            } else {
                ResolveOutcome::Late
            };
        }

        if let Some(entry) = self.completed.get(correlation_id) {
            if &entry.0.target != from {
                return ResolveOutcome::Foreign;
            }
            warn!(%correlation_id, state = ?entry.0.state(), "Late command result ignored");
            return ResolveOutcome::Late;
        }
        warn!(%correlation_id, party = %from, "Result for unknown command");
        ResolveOutcome::Unknown
    }

    fn find(&self, correlation_id: &Uuid) -> Option<Arc<PendingCommand>> {
        self.pending
            .get(correlation_id)
            .map(|c| c.clone())
            .or_else(|| self.completed.get(correlation_id).map(|e| e.0.clone()))
    }

    /// Current snapshot of a command.
    pub fn query(&self, correlation_id: &Uuid) -> Option<CommandView> {
        self.find(correlation_id).map(|c| c.view())
    }

    /// Wait for the command to reach a terminal state. Bounded by the ack
    /// and result timeouts.
    pub async fn wait_result(&self, correlation_id: &Uuid) -> Option<CommandView> {
        let command = self.find(correlation_id)?;
        command.wait().await;
        Some(command.view())
    }

    /// Snapshot of a command, but only for a party that issued or executes
    /// it. With `wait`, blocks until the command is terminal.
    pub async fn result_for(
        &self,
        correlation_id: &Uuid,
        party: &RemoteParty,
        wait: bool,
    ) -> Option<CommandView> {
        let command = self.find(correlation_id)?;
        let involved = party.acts_for(&command.target)
            || command
                .originator
                .as_ref()
                .is_some_and(|o| party.acts_for(&o.party));
        if !involved {
            return None;
        }
        if wait {
            command.wait().await;
        }
        Some(command.view())
    }

    /// Drop terminal commands older than the retention window.
    pub fn gc(&self) -> usize {
        let before = self.completed.len();
        let retention = self.config.retention;
        self.completed
            .retain(|_, (_, resolved_at)| resolved_at.elapsed() < retention);
        let purged = before.saturating_sub(self.completed.len());
        if purged > 0 {
            debug!(purged, "Purged resolved commands");
        }
        purged
    }

    pub fn spawn_gc(self: &Arc<Self>, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let dispatcher = self.clone();
        let period = (self.config.retention / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        dispatcher.gc();
                    }
                    _ = shutdown.wait() => break,
                }
            }
        })
    }

    // ── Inbound routing ────────────────────────────────────────

    /// Route a command received from `originator` to the party operating
    /// the addressed object.
    pub async fn route(
        self: &Arc<Self>,
        request: CommandRequest,
        originator: &PartyScope,
    ) -> Result<Dispatched, CommandError> {
        let target = match &request {
            CommandRequest::ReserveNow(_)
            | CommandRequest::StartSession(_)
            | CommandRequest::UnlockConnector(_) => {
                let Some(location_id) = request.location_id() else {
                    return Err(CommandError::UnknownLocation(String::new()));
                };
                let owners: Vec<PartyScope> = self
                    .store
                    .find_locations(location_id)
                    .await?
                    .into_iter()
                    .map(|l| l.owner())
                    .collect();
                if owners.iter().any(|owner| self.identity.owns(owner)) {
                    return Ok(self.answer_locally(request.kind(), "location is operated locally"));
                }
                owners
                    .into_iter()
                    .next()
                    .ok_or_else(|| CommandError::UnknownLocation(location_id.to_string()))?
            }
            CommandRequest::StopSession(stop) => {
                let Some(session) = self.store.find_session(&stop.session_id) else {
                    return Ok(Dispatched {
                        correlation_id: Uuid::new_v4(),
                        response: CommandResponse {
                            result: CommandResponseType::UnknownSession,
                            timeout: 0,
                            message: Some(format!("unknown session {}", stop.session_id)),
                        },
                    });
                };
                if self.identity.owns(&session.owner()) {
                    return Ok(self.answer_locally(request.kind(), "session is operated locally"));
                }
                session.owner()
            }
            CommandRequest::CancelReservation(cancel) => {
                match self.reservations.get(&cancel.reservation_id) {
                    Some(target) => target.clone(),
                    None => {
                        return Ok(self.answer_locally(request.kind(), "unknown reservation"));
                    }
                }
            }
        };

        let originator = Originator {
            party: originator.clone(),
            response_url: request.response_url().to_string(),
        };
        self.dispatch(request, &target, Some(originator)).await
    }

    fn answer_locally(&self, kind: CommandType, reason: &str) -> Dispatched {
        info!(command = %kind, reason, "Command rejected locally");
        metrics::counter!("ocpi_commands_total", "command" => kind.as_str(), "outcome" => "rejected")
            .increment(1);
        Dispatched {
            correlation_id: Uuid::new_v4(),
            response: refusal(reason),
        }
    }
}

fn refusal(reason: &str) -> CommandResponse {
    CommandResponse {
        result: CommandResponseType::Rejected,
        timeout: 0,
        message: Some(reason.to_string()),
    }
}

pub type SharedCommandDispatcher = Arc<CommandDispatcher>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::client::fake::{Call, FakeOcpiClient};
    use crate::application::events::EventBus;
    use crate::application::parties::PartyRegistry;
    use crate::application::store::ObjectStore;
    use crate::domain::ocpi::location::fixtures::{evse, location};
    use crate::domain::ocpi::{
        CommandResultType, Endpoint, LocationId, Role, SessionId, StartSession, StopSession,
        Token, TokenType, TokenUid, WhitelistType,
    };
    use crate::domain::party::{RegistrationState, RemoteParty};

    const CPO_COMMANDS: &str = "https://cpo.example.com/ocpi/2.2.1/commands";

    fn cpo() -> PartyScope {
        PartyScope::parse("NL", "CPO").unwrap()
    }

    fn emsp() -> PartyScope {
        PartyScope::parse("NL", "EMS").unwrap()
    }

    fn registered(scope: PartyScope, role: Role, with_endpoint: bool) -> RemoteParty {
        let mut party = RemoteParty::new(scope, role, "party");
        party.registration = RegistrationState::Registered;
        party.remote_token = Some("remote".to_string());
        if with_endpoint {
            party.endpoints.push(Endpoint {
                identifier: ModuleId::Commands,
                role: InterfaceRole::Receiver,
                url: CPO_COMMANDS.to_string(),
            });
        }
        party
    }

    struct Fixture {
        dispatcher: Arc<CommandDispatcher>,
        client: Arc<FakeOcpiClient>,
        store: SharedObjectStore,
    }

    fn fixture(client: FakeOcpiClient, with_endpoint: bool, config: CommandConfig) -> Fixture {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(PartyRegistry::new(bus.clone(), 10));
        registry
            .add_party(registered(cpo(), Role::Cpo, with_endpoint))
            .unwrap();
        registry
            .add_party(registered(emsp(), Role::Emsp, false))
            .unwrap();
        let store = Arc::new(ObjectStore::new(bus.clone()));
        let client = Arc::new(client);
        let identity = Arc::new(LocalIdentity::cpo(
            PartyScope::parse("DE", "GEF").unwrap(),
            "GraphDefined",
            "https://hub.example.com",
        ));
        let dispatcher = Arc::new(CommandDispatcher::new(
            registry,
            store.clone(),
            client.clone(),
            identity,
            bus,
            config,
        ));
        Fixture {
            dispatcher,
            client,
            store,
        }
    }

    fn token() -> Token {
        Token {
            country_code: emsp().country_code,
            party_id: emsp().party_id,
            uid: TokenUid::parse("T1").unwrap(),
            token_type: TokenType::Rfid,
            contract_id: "NL-EMS-C1".to_string(),
            visual_number: None,
            issuer: "EMSP".to_string(),
            valid: true,
            whitelist: WhitelistType::Allowed,
            language: None,
            last_updated: Utc::now(),
        }
    }

    fn start_session(location: &str) -> CommandRequest {
        CommandRequest::StartSession(StartSession {
            response_url: "https://emsp.example.com/cb/1".to_string(),
            token: token(),
            location_id: LocationId::parse(location).unwrap(),
            evse_uid: None,
            connector_id: None,
            authorization_reference: None,
        })
    }

    fn accepted() -> CommandResult {
        CommandResult {
            result: CommandResultType::Accepted,
            message: None,
        }
    }

    #[tokio::test]
    async fn unreachable_target_resolves_immediately_without_timer() {
        let f = fixture(FakeOcpiClient::unreachable(), true, CommandConfig::default());

        let dispatched = f
            .dispatcher
            .dispatch(start_session("L1"), &cpo(), None)
            .await
            .unwrap();
        assert_eq!(dispatched.response.result, CommandResponseType::Rejected);
        assert_eq!(f.dispatcher.pending_count(), 0);

        let view = f.dispatcher.query(&dispatched.correlation_id).unwrap();
        assert_eq!(view.state, CommandState::Resolved);
        assert_eq!(view.result.unwrap().result, CommandResultType::Failed);
        assert!(view.deadline.is_none());
        let command = f.dispatcher.find(&dispatched.correlation_id).unwrap();
        assert!(!command.has_timer());
    }

    #[tokio::test]
    async fn missing_endpoint_is_a_transport_failure() {
        let f = fixture(FakeOcpiClient::default(), false, CommandConfig::default());
        let dispatched = f
            .dispatcher
            .dispatch(start_session("L1"), &cpo(), None)
            .await
            .unwrap();
        assert_eq!(dispatched.response.result, CommandResponseType::Rejected);
        assert!(f.client.calls().is_empty());
    }

    #[tokio::test]
    async fn accepted_command_is_resolved_once_by_the_async_result() {
        let f = fixture(FakeOcpiClient::default(), true, CommandConfig::default());
        let dispatched = f
            .dispatcher
            .dispatch(start_session("L1"), &cpo(), None)
            .await
            .unwrap();
        assert_eq!(dispatched.response.result, CommandResponseType::Accepted);
        let id = dispatched.correlation_id;
        assert_eq!(
            f.dispatcher.query(&id).unwrap().state,
            CommandState::AwaitingAsyncResult
        );

        let Call::PostCommand { url, request } = &f.client.calls()[0] else {
            panic!("expected a command call");
        };
        assert_eq!(url, &format!("{CPO_COMMANDS}/START_SESSION"));
        assert_eq!(
            request.response_url(),
            format!("https://hub.example.com/ocpi/2.2.1/commands/START_SESSION/{id}")
        );

        assert_eq!(f.dispatcher.result(&id, &emsp(), accepted()), ResolveOutcome::Foreign);
        assert_eq!(f.dispatcher.result(&id, &cpo(), accepted()), ResolveOutcome::Resolved);
        assert_eq!(f.dispatcher.result(&id, &cpo(), accepted()), ResolveOutcome::Late);
        assert_eq!(
            f.dispatcher.result(&Uuid::new_v4(), &cpo(), accepted()),
            ResolveOutcome::Unknown
        );
        let view = f.dispatcher.wait_result(&id).await.unwrap();
        assert_eq!(view.result.unwrap().result, CommandResultType::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_result_times_out_and_late_result_is_ignored() {
        let config = CommandConfig {
            result_timeout: Duration::from_secs(30),
            ..CommandConfig::default()
        };
        let f = fixture(FakeOcpiClient::default(), true, config);
        let id = f
            .dispatcher
            .dispatch(start_session("L1"), &cpo(), None)
            .await
            .unwrap()
            .correlation_id;

        let view = f.dispatcher.wait_result(&id).await.unwrap();
        assert_eq!(view.state, CommandState::TimedOut);
        assert_eq!(view.result.unwrap().result, CommandResultType::Timeout);
        assert_eq!(f.dispatcher.result(&id, &cpo(), accepted()), ResolveOutcome::Late);
        assert_eq!(f.dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn refused_acknowledgement_resolves_immediately() {
        let client = FakeOcpiClient::default();
        client.set_command_reply(Ok(CommandResponse {
            result: CommandResponseType::NotSupported,
            timeout: 0,
            message: None,
        }));
        let f = fixture(client, true, CommandConfig::default());
        let dispatched = f
            .dispatcher
            .dispatch(start_session("L1"), &cpo(), None)
            .await
            .unwrap();
        assert_eq!(dispatched.response.result, CommandResponseType::NotSupported);
        let view = f.dispatcher.query(&dispatched.correlation_id).unwrap();
        assert_eq!(view.result.unwrap().result, CommandResultType::NotSupported);
    }

    #[tokio::test]
    async fn inbound_commands_are_routed_by_location_owner() {
        let f = fixture(FakeOcpiClient::default(), true, CommandConfig::default());
        f.store
            .upsert_location(location(&cpo(), "REMOTE1", vec![evse("E1")]))
            .await
            .unwrap();
        f.store
            .upsert_location(location(
                &PartyScope::parse("DE", "GEF").unwrap(),
                "LOCAL1",
                vec![evse("E1")],
            ))
            .await
            .unwrap();

        let remote = f
            .dispatcher
            .route(start_session("REMOTE1"), &emsp())
            .await
            .unwrap();
        assert_eq!(remote.response.result, CommandResponseType::Accepted);

        let local = f
            .dispatcher
            .route(start_session("LOCAL1"), &emsp())
            .await
            .unwrap();
        assert_eq!(local.response.result, CommandResponseType::Rejected);

        let unknown = f.dispatcher.route(start_session("NOPE"), &emsp()).await;
        assert_eq!(
            unknown.unwrap_err().status_code(),
            status::UNKNOWN_LOCATION
        );

        let stop = CommandRequest::StopSession(StopSession {
            response_url: "https://emsp.example.com/cb/2".to_string(),
            session_id: SessionId::parse("S404").unwrap(),
        });
        let stop = f.dispatcher.route(stop, &emsp()).await.unwrap();
        assert_eq!(stop.response.result, CommandResponseType::UnknownSession);
    }

    #[tokio::test]
    async fn originator_receives_the_final_result() {
        let f = fixture(FakeOcpiClient::default(), true, CommandConfig::default());
        f.store
            .upsert_location(location(&cpo(), "REMOTE1", vec![evse("E1")]))
            .await
            .unwrap();
        let id = f
            .dispatcher
            .route(start_session("REMOTE1"), &emsp())
            .await
            .unwrap()
            .correlation_id;
        f.dispatcher.result(&id, &cpo(), accepted());

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(f.client.calls().iter().any(|call| matches!(
            call,
            Call::PostCommandResult { url, .. } if url == "https://emsp.example.com/cb/1"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn resolved_commands_are_purged_after_retention() {
        let config = CommandConfig {
            retention: Duration::from_secs(60),
            ..CommandConfig::default()
        };
        let f = fixture(FakeOcpiClient::unreachable(), true, config);
        let id = f
            .dispatcher
            .dispatch(start_session("L1"), &cpo(), None)
            .await
            .unwrap()
            .correlation_id;
        assert_eq!(f.dispatcher.gc(), 0);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(f.dispatcher.gc(), 1);
        assert!(f.dispatcher.query(&id).is_none());
    }
}
