//! Service runtime.
//!
//! [`ServerHandle`] owns the whole lifecycle: it wires the services from an
//! [`AppConfig`], starts the background tasks and the HTTP server, and stops
//! everything again on shutdown.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::client::{HttpOcpiClient, SharedOcpiClient};
use crate::application::events::{create_event_bus, SharedEventBus};
use crate::application::parties::{
    CredentialsService, PartyRegistry, SharedCredentialsService, SharedPartyRegistry,
};
use crate::application::push::PushService;
use crate::application::store::{ObjectStore, SharedObjectStore};
use crate::application::sync::{SharedSyncAdapter, SyncAdapter};
use crate::application::{CommandDispatcher, SharedCommandDispatcher};
use crate::config::{AppConfig, ConfigError, PartyConfig};
use crate::domain::network::{RoamingNetwork, SharedNetworkView, SharedRoamingNetwork};
use crate::domain::party::{AccessToken, RemoteParty, TokenScope};
use crate::interfaces::http::modules::metrics::describe_metrics;
use crate::interfaces::http::{create_router, AppState, RouterOptions};
use crate::shared::{ShutdownCoordinator, ShutdownSignal};

/// Handle to a running OCPI service.
///
/// # Examples
///
/// ```rust,no_run
/// use texnouz_ocpi::config::AppConfig;
/// use texnouz_ocpi::server::ServerHandle;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = ServerHandle::start(AppConfig::default()).await?;
///     handle.install_signal_handler();
///     handle.shutdown_signal().wait().await;
///     handle.wait().await;
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    pub event_bus: SharedEventBus,
    pub registry: SharedPartyRegistry,
    pub store: SharedObjectStore,
    /// Charging network feeding the synchronization adapter.
    pub network: SharedRoamingNetwork,
    pub sync: SharedSyncAdapter,
    pub dispatcher: SharedCommandDispatcher,
    pub credentials: SharedCredentialsService,
    pub config: AppConfig,
    /// Port the HTTP server is listening on.
    pub port: u16,

    shutdown: ShutdownCoordinator,
    api_task: JoinHandle<()>,
    background: Vec<JoinHandle<()>>,
}

/// The global metrics recorder can only be installed once per process.
fn prometheus_handle() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    if let Some(handle) = HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    info!("📊 Prometheus metrics recorder installed");
    Ok(HANDLE.get_or_init(|| handle).clone())
}

/// Remote party for a `[[parties]]` entry, holding its Token A.
fn configured_party(entry: &PartyConfig) -> Result<RemoteParty, ConfigError> {
    let mut party = RemoteParty::new(entry.scope()?, entry.role, entry.business_name.clone());
    party.local_tokens.push(AccessToken {
        value: entry.token_a.clone(),
        scope: TokenScope::Registration,
    });
    party.remote_token = entry.remote_token_a.clone();
    party.versions_url = entry.versions_url.clone();
    party.push = entry.push;
    party.filter = entry.filter.clone();
    Ok(party)
}

impl ServerHandle {
    /// Wire every service and start serving.
    ///
    /// Order: event bus, object store, party registry (with the configured
    /// parties), roaming network, sync adapter, command dispatcher, push
    /// service, HTTP server.
    pub async fn start(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        info!("Starting OCPI service...");

        let prometheus = prometheus_handle()?;
        let identity = Arc::new(config.local_identity()?);
        info!(party = %identity.scope, url = %identity.public_url, "Local identity");

        let event_bus = create_event_bus();
        let store: SharedObjectStore = Arc::new(ObjectStore::with_lock_timeout(
            event_bus.clone(),
            Duration::from_millis(config.sync.lock_timeout_ms),
        ));

        let registry: SharedPartyRegistry = Arc::new(PartyRegistry::new(
            event_bus.clone(),
            config.ocpi.violation_threshold,
        ));
        for entry in &config.parties {
            let party = configured_party(entry)?;
            info!(party = %party.scope, role = %party.role, "Configured party added");
            registry.add_party(party)?;
        }

        let client: SharedOcpiClient = Arc::new(HttpOcpiClient::new(Duration::from_secs(
            config.server.client_timeout,
        ))?);

        let network: SharedRoamingNetwork = Arc::new(RoamingNetwork::new());
        let view: SharedNetworkView = network.clone();
        let sync: SharedSyncAdapter = Arc::new(SyncAdapter::new(
            view,
            store.clone(),
            identity.scope.clone(),
            config.sync.filter.clone(),
            config.sync_config(),
        ));

        let dispatcher: SharedCommandDispatcher = Arc::new(CommandDispatcher::new(
            registry.clone(),
            store.clone(),
            client.clone(),
            identity.clone(),
            event_bus.clone(),
            config.command_config(),
        ));

        let credentials: SharedCredentialsService = Arc::new(CredentialsService::new(
            registry.clone(),
            client.clone(),
            identity.clone(),
        ));

        let push = Arc::new(PushService::new(
            registry.clone(),
            store.clone(),
            client,
            identity.scope.clone(),
        ));

        // ── Background tasks ───────────────────────────────────
        let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout);
        let signal = shutdown.signal();
        let background = vec![
            sync.spawn(network.subscribe(), signal.clone()),
            dispatcher.spawn_gc(signal.clone()),
            push.spawn(event_bus.subscribe(), signal.clone()),
        ];

        // Parties we know the versions url of are registered from our side.
        for entry in config
            .parties
            .iter()
            .filter(|p| p.versions_url.is_some() && p.remote_token_a.is_some())
        {
            let scope = entry.scope()?;
            let credentials = credentials.clone();
            tokio::spawn(async move {
                match credentials.register_with(&scope).await {
                    Ok(()) => info!(party = %scope, "Registered with configured party"),
                    Err(e) => warn!(party = %scope, error = %e, "Registration with configured party failed"),
                }
            });
        }

        // ── HTTP server ────────────────────────────────────────
        let state = AppState {
            registry: registry.clone(),
            store: store.clone(),
            credentials: credentials.clone(),
            dispatcher: dispatcher.clone(),
            sync: sync.clone(),
            network: network.clone(),
            identity,
            max_page_size: config.ocpi.max_page_size,
            started_at: Arc::new(Instant::now()),
        };
        let router = create_router(
            state,
            RouterOptions {
                gate_version_discovery: config.ocpi.gate_version_discovery,
                admin_key_sha256: config.admin_key_sha256(),
                metrics: Some(prometheus),
            },
        );
        if config.admin_key_sha256().is_none() {
            warn!("admin.api_key_sha256 is empty, admin API disabled");
        }

        let address = config.server.address();
        let listener = tokio::net::TcpListener::bind(&address).await?;
        let port = listener.local_addr()?.port();
        info!("OCPI server listening on http://{}", address);
        info!("Version discovery at {}/ocpi/versions", config.server.public_url);

        let api_shutdown = signal.clone();
        let api_task = tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                api_shutdown.wait().await;
                info!("🛑 HTTP server received shutdown signal");
            });
            if let Err(e) = server.await {
                error!("HTTP server error: {}", e);
            }
        });

        info!("🚀 OCPI service started");

        Ok(Self {
            event_bus,
            registry,
            store,
            network,
            sync,
            dispatcher,
            credentials,
            config,
            port,
            shutdown,
            api_task,
            background,
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install SIGTERM/SIGINT listeners that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for the HTTP server and the background tasks to stop, bounded by
    /// the configured shutdown timeout.
    pub async fn wait(self) {
        info!("⏳ Waiting for server tasks to complete...");
        let Self {
            shutdown,
            api_task,
            background,
            ..
        } = self;
        let finished = shutdown
            .shutdown_with_cleanup(|| async move {
                if let Err(e) = api_task.await {
                    error!("HTTP server task panicked: {}", e);
                }
                for (task, result) in futures_util::future::join_all(background)
                    .await
                    .into_iter()
                    .enumerate()
                {
                    if let Err(e) = result {
                        error!(task, "Background task panicked: {}", e);
                    }
                }
            })
            .await;
        if !finished {
            warn!("Some tasks did not stop in time");
        }
        info!("👋 OCPI service shutdown complete");
    }

    /// Trigger shutdown and wait for completion.
    pub async fn shutdown(self) {
        info!("🛑 Shutting down OCPI service...");
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.api_task.is_finished()
    }
}

/// Initialize tracing from the logging config. `RUST_LOG` wins over the
/// configured level.
pub fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ocpi::Role;

    #[test]
    fn configured_party_holds_token_a() {
        let entry = PartyConfig {
            country_code: "NL".into(),
            party_id: "EMS".into(),
            role: Role::Emsp,
            business_name: "EMSP".into(),
            token_a: "token-a".into(),
            versions_url: Some("https://emsp.example.com/ocpi/versions".into()),
            remote_token_a: Some("their-token".into()),
            push: true,
            filter: Default::default(),
        };
        let party = configured_party(&entry).unwrap();
        assert_eq!(party.local_tokens.len(), 1);
        assert_eq!(party.local_tokens[0].scope, TokenScope::Registration);
        assert_eq!(party.remote_token.as_deref(), Some("their-token"));
        assert!(party.push);
    }

    #[tokio::test]
    async fn starts_and_stops() {
        let mut config = AppConfig::default();
        config.server.host = "127.0.0.1".into();
        config.server.port = 0;
        config.server.shutdown_timeout = 5;

        let handle = ServerHandle::start(config).await.unwrap();
        assert_ne!(handle.port, 0);
        assert!(handle.is_running());
        handle.shutdown().await;
    }
}
