//! Router fixture shared by the HTTP tests

use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use tower::ServiceExt;

use crate::application::client::fake::FakeOcpiClient;
use crate::application::events::EventBus;
use crate::application::parties::{generate_token, CredentialsService, LocalIdentity, PartyRegistry};
use crate::application::store::ObjectStore;
use crate::application::sync::{InclusionFilter, SyncAdapter, SyncConfig};
use crate::application::{CommandConfig, CommandDispatcher};
use crate::domain::network::{RoamingNetwork, SharedNetworkView};
use crate::domain::ocpi::{PartyScope, Role};
use crate::domain::party::{AccessToken, RegistrationState, RemoteParty, TokenScope};
use crate::interfaces::http::middleware::hash_admin_key;
use crate::interfaces::http::router::{create_router, AppState, RouterOptions};

pub const ADMIN_KEY: &str = "admin-secret";
pub const MAX_PAGE_SIZE: usize = 2;

pub fn us() -> PartyScope {
    PartyScope::parse("DE", "GEF").unwrap()
}

pub fn emsp() -> PartyScope {
    PartyScope::parse("NL", "EMS").unwrap()
}

pub fn other_emsp() -> PartyScope {
    PartyScope::parse("FR", "OTH").unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub client: Arc<FakeOcpiClient>,
}

pub fn app() -> TestApp {
    app_with(RouterOptions {
        admin_key_sha256: Some(hash_admin_key(ADMIN_KEY)),
        ..Default::default()
    })
}

pub fn app_with(options: RouterOptions) -> TestApp {
    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(PartyRegistry::new(bus.clone(), 3));
    let store = Arc::new(ObjectStore::new(bus.clone()));
    let client = Arc::new(FakeOcpiClient::default());
    let identity = Arc::new(LocalIdentity::cpo(us(), "GraphDefined", "https://hub.example.com"));
    let network = Arc::new(RoamingNetwork::new());
    let view: SharedNetworkView = network.clone();
    let sync = Arc::new(SyncAdapter::new(
        view,
        store.clone(),
        us(),
        InclusionFilter::allow_all(),
        SyncConfig::default(),
    ));
    let dispatcher = Arc::new(CommandDispatcher::new(
        registry.clone(),
        store.clone(),
        client.clone(),
        identity.clone(),
        bus,
        CommandConfig::default(),
    ));
    let credentials = Arc::new(CredentialsService::new(
        registry.clone(),
        client.clone(),
        identity.clone(),
    ));
    let state = AppState {
        registry,
        store,
        credentials,
        dispatcher,
        sync,
        network,
        identity,
        max_page_size: MAX_PAGE_SIZE,
        started_at: Arc::new(Instant::now()),
    };
    TestApp {
        router: create_router(state.clone(), options),
        state,
        client,
    }
}

impl TestApp {
    /// Add a party holding one token; `registered` decides between Token A
    /// and a full token. Returns the token.
    pub fn party(&self, scope: PartyScope, role: Role, registered: bool) -> String {
        let token = generate_token();
        let mut party = RemoteParty::new(scope, role, "party");
        party.local_tokens.push(AccessToken {
            value: token.clone(),
            scope: if registered {
                TokenScope::Full
            } else {
                TokenScope::Registration
            },
        });
        if registered {
            party.registration = RegistrationState::Registered;
            party.remote_token = Some(generate_token());
        }
        self.state.registry.add_party(party).unwrap();
        token
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Token {}", STANDARD.encode(token)));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        send(&self.router, request).await
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-admin-key", ADMIN_KEY);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => {
                builder = builder.header("content-length", "0");
                builder.body(Body::empty()).unwrap()
            }
        };
        let (status, _, body) = send(&self.router, request).await;
        (status, body)
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, body)
}
