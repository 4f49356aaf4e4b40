//! OCPI and admin router

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::FromRef,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::application::parties::{LocalIdentity, SharedCredentialsService, SharedPartyRegistry};
use crate::application::store::SharedObjectStore;
use crate::application::sync::SharedSyncAdapter;
use crate::application::SharedCommandDispatcher;
use crate::domain::network::SharedRoamingNetwork;
use crate::domain::ocpi::ModuleId;
use crate::interfaces::http::common::OcpiError;
use crate::interfaces::http::middleware::{
    admin_auth_middleware, ocpi_auth_middleware, AdminAuthState, Gate, OcpiAuthState,
};

use super::modules::metrics::{http_metrics_middleware, prometheus_metrics, MetricsState};
use super::modules::request_id::request_id_middleware;
use super::modules::{
    admin, cdrs, commands, credentials, health, locations, sessions, tariffs, tokens, versions,
};

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: SharedPartyRegistry,
    pub store: SharedObjectStore,
    pub credentials: SharedCredentialsService,
    pub dispatcher: SharedCommandDispatcher,
    pub sync: SharedSyncAdapter,
    pub network: SharedRoamingNetwork,
    pub identity: Arc<LocalIdentity>,
    pub max_page_size: usize,
    pub started_at: Arc<Instant>,
}

/// Router-level switches that are not handler state.
#[derive(Clone, Default)]
pub struct RouterOptions {
    pub gate_version_discovery: bool,
    /// Hex SHA-256 of the admin key; `None` disables `/admin`.
    pub admin_key_sha256: Option<String>,
    pub metrics: Option<PrometheusHandle>,
}

impl FromRef<AppState> for health::HealthState {
    fn from_ref(s: &AppState) -> Self {
        health::HealthState {
            registry: s.registry.clone(),
            sync: s.sync.clone(),
            dispatcher: s.dispatcher.clone(),
            started_at: Arc::clone(&s.started_at),
        }
    }
}

/// Security scheme modifier for OpenAPI
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Admin-Key"))),
            );
        }
    }
}

/// OpenAPI documentation of the admin API
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        admin::list_parties,
        admin::create_party,
        admin::delete_party,
        admin::rotate_token,
        admin::set_status,
        admin::set_access,
        admin::set_party_filter,
        admin::set_push,
        admin::register_party,
        admin::resync,
        admin::set_sync_filter,
        admin::sync_failures,
        admin::get_command,
        admin::network::put_pool,
        admin::network::put_station,
        admin::network::put_evse,
        admin::network::set_evse_status,
        admin::network::delete_pool,
        admin::network::delete_station,
        admin::network::delete_evse,
    ),
    components(
        schemas(
            health::HealthResponse,
            admin::PartyDto,
            admin::CreatePartyRequest,
            admin::CreatedPartyResponse,
            admin::TokenResponse,
            admin::StatusRequest,
            admin::AccessRequest,
            admin::PushRequest,
            admin::FilterDto,
            admin::ResyncResponse,
            admin::network::EvseStatusRequest,
            crate::application::sync::SyncFailure,
            crate::application::sync::FailureKind,
            crate::application::commands::CommandView,
            crate::application::commands::CommandState,
            crate::domain::party::PartyStatus,
            crate::domain::party::AccessStatus,
            crate::domain::party::RegistrationState,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Parties", description = "Remote party administration: registration, tokens, status"),
        (name = "Sync", description = "Network to OCPI synchronization control"),
        (name = "Network", description = "Charging network feed: pools, stations, EVSEs"),
        (name = "Commands", description = "Command correlation lookups"),
    ),
    info(
        title = "OCPI Service Admin API",
        version = "1.0.0",
        description = "Administration of the OCPI 2.2.1 roaming endpoint",
        license(name = "MIT"),
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> impl IntoResponse {
    axum::Json(ApiDoc::openapi())
}

async fn not_found() -> OcpiError {
    OcpiError::not_found("no such endpoint")
}

fn guarded(router: Router<AppState>, state: &AppState, gate: Gate, options: &RouterOptions) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        OcpiAuthState::new(state.registry.clone(), gate, options.gate_version_discovery),
        ocpi_auth_middleware,
    ))
}

/// Create the router with every OCPI, admin and operational route.
pub fn create_router(state: AppState, options: RouterOptions) -> Router {
    let version_routes = guarded(
        Router::new()
            .route("/versions", get(versions::list_versions))
            .route("/2.2.1", get(versions::version_details)),
        &state,
        Gate::VersionDiscovery,
        &options,
    );

    let credentials_routes = guarded(
        Router::new().route(
            "/",
            get(credentials::get_credentials)
                .post(credentials::register)
                .put(credentials::update)
                .delete(credentials::unregister),
        ),
        &state,
        Gate::Module(ModuleId::Credentials),
        &options,
    );

    let location_routes = guarded(
        Router::new()
            .route("/", get(locations::list_locations))
            .route("/{location_id}", get(locations::get_location))
            .route("/{location_id}/{evse_uid}", get(locations::get_evse))
            .route(
                "/{location_id}/{evse_uid}/{connector_id}",
                get(locations::get_connector),
            ),
        &state,
        Gate::Module(ModuleId::Locations),
        &options,
    );

    let location_receiver_routes = guarded(
        Router::new()
            .route(
                "/{country_code}/{party_id}/{location_id}",
                get(locations::receiver_get_location)
                    .put(locations::put_location)
                    .patch(locations::patch_location),
            )
            .route(
                "/{country_code}/{party_id}/{location_id}/{evse_uid}",
                get(locations::receiver_get_evse)
                    .put(locations::put_evse)
                    .patch(locations::patch_evse),
            )
            .route(
                "/{country_code}/{party_id}/{location_id}/{evse_uid}/{connector_id}",
                get(locations::receiver_get_connector)
                    .put(locations::put_connector)
                    .patch(locations::patch_connector),
            ),
        &state,
        Gate::Module(ModuleId::Locations),
        &options,
    );

    let tariff_routes = guarded(
        Router::new().route("/", get(tariffs::list_tariffs)),
        &state,
        Gate::Module(ModuleId::Tariffs),
        &options,
    );
    let tariff_receiver_routes = guarded(
        Router::new().route(
            "/{country_code}/{party_id}/{tariff_id}",
            get(tariffs::get_tariff)
                .put(tariffs::put_tariff)
                .delete(tariffs::delete_tariff),
        ),
        &state,
        Gate::Module(ModuleId::Tariffs),
        &options,
    );

    let session_routes = guarded(
        Router::new().route("/", get(sessions::list_sessions)),
        &state,
        Gate::Module(ModuleId::Sessions),
        &options,
    );
    let session_receiver_routes = guarded(
        Router::new().route(
            "/{country_code}/{party_id}/{session_id}",
            get(sessions::get_session)
                .put(sessions::put_session)
                .patch(sessions::patch_session),
        ),
        &state,
        Gate::Module(ModuleId::Sessions),
        &options,
    );

    let cdr_routes = guarded(
        Router::new().route("/", get(cdrs::list_cdrs)),
        &state,
        Gate::Module(ModuleId::Cdrs),
        &options,
    );
    let cdr_receiver_routes = guarded(
        Router::new()
            .route("/", post(cdrs::post_cdr))
            .route("/{cdr_id}", get(cdrs::get_cdr)),
        &state,
        Gate::Module(ModuleId::Cdrs),
        &options,
    );

    let token_routes = guarded(
        Router::new()
            .route("/", get(tokens::list_tokens))
            .route("/{token_uid}/authorize", post(tokens::authorize)),
        &state,
        Gate::Module(ModuleId::Tokens),
        &options,
    );
    let token_receiver_routes = guarded(
        Router::new().route(
            "/{country_code}/{party_id}/{token_uid}",
            get(tokens::get_token)
                .put(tokens::put_token)
                .patch(tokens::patch_token),
        ),
        &state,
        Gate::Module(ModuleId::Tokens),
        &options,
    );

    let command_routes = guarded(
        Router::new()
            .route("/results/{correlation_id}", get(commands::get_result))
            .route("/{command}", post(commands::receive_command))
            .route("/{command}/{correlation_id}", post(commands::receive_result)),
        &state,
        Gate::Module(ModuleId::Commands),
        &options,
    );

    let admin_routes = Router::new()
        .route("/parties", get(admin::list_parties).post(admin::create_party))
        .route("/parties/{country_code}/{party_id}", delete(admin::delete_party))
        .route("/parties/{country_code}/{party_id}/rotate", post(admin::rotate_token))
        .route("/parties/{country_code}/{party_id}/status", post(admin::set_status))
        .route("/parties/{country_code}/{party_id}/access", post(admin::set_access))
        .route("/parties/{country_code}/{party_id}/filter", put(admin::set_party_filter))
        .route("/parties/{country_code}/{party_id}/push", put(admin::set_push))
        .route("/parties/{country_code}/{party_id}/register", post(admin::register_party))
        .route("/resync", post(admin::resync))
        .route("/sync/filter", put(admin::set_sync_filter))
        .route("/sync/failures", get(admin::sync_failures))
        .route("/commands/{correlation_id}", get(admin::get_command))
        .route("/network/pools", post(admin::network::put_pool))
        .route("/network/pools/{pool_id}", delete(admin::network::delete_pool))
        .route("/network/stations", post(admin::network::put_station))
        .route("/network/stations/{station_id}", delete(admin::network::delete_station))
        .route("/network/evses", post(admin::network::put_evse))
        .route("/network/evses/{evse_id}", delete(admin::network::delete_evse))
        .route("/network/evses/{evse_id}/status", put(admin::network::set_evse_status))
        .route("/openapi.json", get(openapi_json))
        .route_layer(middleware::from_fn_with_state(
            AdminAuthState {
                key_sha256: options.admin_key_sha256.as_deref().map(Arc::from),
            },
            admin_auth_middleware,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health::health_check))
        .nest("/ocpi", version_routes)
        .nest("/ocpi/2.2.1/credentials", credentials_routes)
        .nest("/ocpi/2.2.1/locations", location_routes)
        .nest("/ocpi/2.2.1/receiver/locations", location_receiver_routes)
        .nest("/ocpi/2.2.1/tariffs", tariff_routes)
        .nest("/ocpi/2.2.1/receiver/tariffs", tariff_receiver_routes)
        .nest("/ocpi/2.2.1/sessions", session_routes)
        .nest("/ocpi/2.2.1/receiver/sessions", session_receiver_routes)
        .nest("/ocpi/2.2.1/cdrs", cdr_routes)
        .nest("/ocpi/2.2.1/receiver/cdrs", cdr_receiver_routes)
        .nest("/ocpi/2.2.1/tokens", token_routes)
        .nest("/ocpi/2.2.1/receiver/tokens", token_receiver_routes)
        .nest("/ocpi/2.2.1/commands", command_routes)
        .nest("/admin", admin_routes)
        .fallback(not_found)
        .with_state(state);

    if let Some(handle) = options.metrics {
        router = router.merge(
            Router::new()
                .route("/metrics", get(prometheus_metrics))
                .with_state(MetricsState { handle }),
        );
    }

    router
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::domain::ocpi::location::fixtures::{evse, location};
    use crate::domain::ocpi::{Endpoint, InterfaceRole, Role};
    use crate::interfaces::http::modules::testing::{app, app_with, emsp, other_emsp, us};

    #[tokio::test]
    async fn version_discovery_is_public_unless_gated() {
        let open = app();
        let (status, _, body) = open.call(Method::GET, "/ocpi/versions", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status_code"], 1000);
        assert_eq!(body["data"][0]["version"], "2.2.1");

        let gated = app_with(RouterOptions {
            gate_version_discovery: true,
            ..Default::default()
        });
        let (status, _, body) = gated.call(Method::GET, "/ocpi/versions", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status_code"], 2000);

        let token_a = gated.party(emsp(), Role::Emsp, false);
        let (status, _, body) = gated
            .call(Method::GET, "/ocpi/2.2.1", Some(&token_a), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["endpoints"].as_array().unwrap().len(), 14);
    }

    #[tokio::test]
    async fn registration_token_only_reaches_credentials() {
        let app = app();
        let token_a = app.party(emsp(), Role::Emsp, false);

        let (status, _, body) = app
            .call(Method::GET, "/ocpi/2.2.1/credentials", Some(&token_a), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["token"], token_a.as_str());

        let (status, _, body) = app
            .call(Method::GET, "/ocpi/2.2.1/locations", Some(&token_a), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["status_code"], 2000);
    }

    #[tokio::test]
    async fn blocked_party_is_refused_on_every_module() {
        let app = app();
        let token = app.party(emsp(), Role::Emsp, true);
        app.state
            .store
            .upsert_location(location(&us(), "L1", vec![evse("E1")]))
            .await
            .unwrap();
        app.state
            .registry
            .set_access_status(&emsp(), crate::domain::party::AccessStatus::Blocked)
            .unwrap();

        let id = uuid::Uuid::new_v4();
        let results = format!("/ocpi/2.2.1/commands/results/{id}");
        let callback = format!("/ocpi/2.2.1/commands/START_SESSION/{id}");
        let requests = [
            (Method::GET, "/ocpi/2.2.1/credentials"),
            (Method::PUT, "/ocpi/2.2.1/credentials"),
            (Method::DELETE, "/ocpi/2.2.1/credentials"),
            (Method::GET, "/ocpi/2.2.1/locations"),
            (Method::GET, "/ocpi/2.2.1/locations/L1"),
            (Method::GET, "/ocpi/2.2.1/locations/L1/E1"),
            (Method::GET, "/ocpi/2.2.1/locations/L1/E1/1"),
            (Method::GET, "/ocpi/2.2.1/tariffs"),
            (Method::GET, "/ocpi/2.2.1/sessions"),
            (Method::GET, "/ocpi/2.2.1/cdrs"),
            (Method::GET, "/ocpi/2.2.1/tokens"),
            (Method::POST, "/ocpi/2.2.1/tokens/T1/authorize"),
            (Method::GET, "/ocpi/2.2.1/receiver/locations/NL/EMS/X1"),
            (Method::PUT, "/ocpi/2.2.1/receiver/locations/NL/EMS/X1"),
            (Method::PATCH, "/ocpi/2.2.1/receiver/locations/NL/EMS/X1/E1"),
            (Method::PUT, "/ocpi/2.2.1/receiver/locations/NL/EMS/X1/E1/1"),
            (Method::PUT, "/ocpi/2.2.1/receiver/tariffs/NL/EMS/T1"),
            (Method::DELETE, "/ocpi/2.2.1/receiver/tariffs/NL/EMS/T1"),
            (Method::PUT, "/ocpi/2.2.1/receiver/sessions/NL/EMS/S1"),
            (Method::PATCH, "/ocpi/2.2.1/receiver/sessions/NL/EMS/S1"),
            (Method::POST, "/ocpi/2.2.1/receiver/cdrs"),
            (Method::GET, "/ocpi/2.2.1/receiver/cdrs/C1"),
            (Method::GET, "/ocpi/2.2.1/receiver/tokens/NL/EMS/T1"),
            (Method::PUT, "/ocpi/2.2.1/receiver/tokens/NL/EMS/T1"),
            (Method::POST, "/ocpi/2.2.1/commands/START_SESSION"),
            (Method::POST, callback.as_str()),
            (Method::GET, results.as_str()),
        ];

        for (method, uri) in requests {
            let body = (method != Method::GET && method != Method::DELETE).then(|| json!({}));
            let (status, headers, body) = app.call(method.clone(), uri, Some(&token), body).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{method} {uri}");
            assert_eq!(body["status_code"], 2000, "{method} {uri}");
            assert!(body["data"].is_null(), "{method} {uri}");
            assert!(headers.get("x-total-count").is_none(), "{method} {uri}");
        }
        assert_eq!(app.state.store.locations().await.unwrap().len(), 1);
        assert!(app.state.dispatcher.query(&id).is_none());
    }

    #[tokio::test]
    async fn every_response_carries_an_envelope_and_request_ids() {
        let app = app();
        for (uri, expected) in [
            ("/nowhere", StatusCode::NOT_FOUND),
            ("/ocpi/2.2.1/locations", StatusCode::UNAUTHORIZED),
        ] {
            let (status, headers, body) = app.call(Method::GET, uri, None, None).await;
            assert_eq!(status, expected, "{uri}");
            assert!(body["status_code"].is_u64(), "{uri}");
            assert!(body["timestamp"].is_string(), "{uri}");
            assert!(headers.contains_key("x-request-id"), "{uri}");
            assert!(headers.contains_key("x-correlation-id"), "{uri}");
        }
    }

    #[tokio::test]
    async fn location_list_is_paginated_with_headers() {
        let app = app();
        let token = app.party(emsp(), Role::Emsp, true);
        for id in ["L1", "L2", "L3"] {
            app.state
                .store
                .upsert_location(location(&us(), id, vec![evse("E1")]))
                .await
                .unwrap();
        }
        let mut hidden = location(&us(), "L4", vec![]);
        hidden.publish = false;
        app.state.store.upsert_location(hidden).await.unwrap();

        let (status, headers, body) = app
            .call(Method::GET, "/ocpi/2.2.1/locations?limit=10", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-total-count"], "3");
        assert_eq!(headers["x-limit"], "2");
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (status, _, body) = app
            .call(Method::GET, "/ocpi/2.2.1/locations/L4", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status_code"], 2003);
    }

    #[tokio::test]
    async fn receiver_writes_are_scoped_to_the_caller() {
        let app = app();
        let token = app.party(emsp(), Role::Emsp, true);
        app.party(other_emsp(), Role::Emsp, true);

        let own = serde_json::to_value(location(&emsp(), "L1", vec![evse("E1")])).unwrap();
        let (status, _, body) = app
            .call(Method::PUT, "/ocpi/2.2.1/receiver/locations/NL/EMS/L1", Some(&token), Some(own))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let (status, _, body) = app
            .call(Method::GET, "/ocpi/2.2.1/receiver/locations/NL/EMS/L1/E1", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["uid"], "E1");

        let foreign = serde_json::to_value(location(&other_emsp(), "L9", vec![])).unwrap();
        let (status, _, _) = app
            .call(Method::PUT, "/ocpi/2.2.1/receiver/locations/FR/OTH/L9", Some(&token), Some(foreign))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(app.state.registry.get(&emsp()).unwrap().violations, 1);

        let (status, _, _) = app
            .call(Method::GET, "/ocpi/2.2.1/receiver/locations/FR/OTH/L9", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(app.state.registry.get(&emsp()).unwrap().violations, 1);
    }

    #[tokio::test]
    async fn receiver_rejects_mismatched_ids_and_patch_without_timestamp() {
        let app = app();
        let token = app.party(emsp(), Role::Emsp, true);
        let body = serde_json::to_value(location(&emsp(), "L1", vec![])).unwrap();
        let (status, _, reply) = app
            .call(Method::PUT, "/ocpi/2.2.1/receiver/locations/NL/EMS/L2", Some(&token), Some(body))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply["status_code"], 2001);

        let (status, _, reply) = app
            .call(
                Method::PATCH,
                "/ocpi/2.2.1/receiver/locations/NL/EMS/L1",
                Some(&token),
                Some(json!({"name": "renamed"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(reply["status_code"], 2001);
    }

    fn start_session(location_id: &str) -> serde_json::Value {
        json!({
            "response_url": "https://emsp.example.com/cb/1",
            "token": {
                "country_code": "NL",
                "party_id": "EMS",
                "uid": "T1",
                "type": "RFID",
                "contract_id": "NL-EMS-C1",
                "issuer": "EMSP",
                "valid": true,
                "whitelist": "ALLOWED",
                "last_updated": "2026-01-01T00:00:00Z"
            },
            "location_id": location_id
        })
    }

    #[tokio::test]
    async fn command_is_routed_and_its_result_correlated() {
        let app = app();
        let emsp_token = app.party(emsp(), Role::Emsp, true);
        let cpo = other_emsp();
        let cpo_token = app.party(cpo.clone(), Role::Cpo, true);
        app.state
            .registry
            .update(&cpo, |party| {
                party.endpoints.push(Endpoint {
                    identifier: ModuleId::Commands,
                    role: InterfaceRole::Receiver,
                    url: "https://cpo.example.com/ocpi/2.2.1/commands".to_string(),
                })
            })
            .unwrap();
        app.state
            .store
            .upsert_location(location(&cpo, "L7", vec![evse("E1")]))
            .await
            .unwrap();

        let (status, headers, body) = app
            .call(
                Method::POST,
                "/ocpi/2.2.1/commands/START_SESSION",
                Some(&emsp_token),
                Some(start_session("L7")),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["result"], "ACCEPTED");
        let location = headers["location"].to_str().unwrap().to_string();
        let correlation_id = location.rsplit('/').next().unwrap().to_string();
        assert!(location.starts_with("https://hub.example.com/ocpi/2.2.1/commands/results/"));

        // Only the executing party may report the result.
        let result_uri = format!("/ocpi/2.2.1/commands/START_SESSION/{correlation_id}");
        let result = json!({"result": "ACCEPTED"});
        let (status, _, _) = app
            .call(Method::POST, &result_uri, Some(&emsp_token), Some(result.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let wrong_kind = format!("/ocpi/2.2.1/commands/STOP_SESSION/{correlation_id}");
        let (status, _, body) = app
            .call(Method::POST, &wrong_kind, Some(&cpo_token), Some(result.clone()))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status_code"], 2001);

        let (status, _, body) = app
            .call(Method::POST, &result_uri, Some(&cpo_token), Some(result.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status_message"], "Success");

        let (status, _, body) = app
            .call(Method::POST, &result_uri, Some(&cpo_token), Some(result))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["status_message"], "Success");

        let (status, _, body) = app
            .call(
                Method::GET,
                &format!("/ocpi/2.2.1/commands/results/{correlation_id}?wait=true"),
                Some(&emsp_token),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["state"], "RESOLVED");
        assert_eq!(body["data"]["result"]["result"], "ACCEPTED");
    }

    #[tokio::test]
    async fn admin_api_requires_the_configured_key() {
        let disabled = app_with(RouterOptions::default());
        let (status, body) = disabled.admin(Method::GET, "/admin/parties", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

        let app = app();
        let (status, _, _) = app.call(Method::GET, "/admin/parties", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app
            .admin(
                Method::POST,
                "/admin/parties",
                Some(json!({
                    "country_code": "NL",
                    "party_id": "EMS",
                    "role": "EMSP",
                    "business_name": "EMSP"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let token_a = body["data"]["token"].as_str().unwrap().to_string();

        let (status, _, body) = app
            .call(Method::GET, "/ocpi/2.2.1/credentials", Some(&token_a), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["token"], token_a.as_str());

        let (status, body) = app.admin(Method::GET, "/admin/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/admin/parties"].is_object());
    }

    #[tokio::test]
    async fn network_feed_reaches_the_location_store() {
        use crate::domain::network::model::fixtures::{evse as network_evse, pool, station};

        let app = app();
        let sync = app.state.sync.clone();
        let events = app.state.network.subscribe();
        let shutdown = crate::shared::ShutdownSignal::new();
        let task = sync.spawn(events, shutdown.clone());

        for (uri, body) in [
            ("/admin/network/pools", serde_json::to_value(pool("P1")).unwrap()),
            ("/admin/network/stations", serde_json::to_value(station("S1", "P1")).unwrap()),
            ("/admin/network/evses", serde_json::to_value(network_evse("E1", "S1")).unwrap()),
        ] {
            let (status, body) = app.admin(Method::POST, uri, Some(body)).await;
            assert_eq!(status, StatusCode::CREATED, "{uri}: {body}");
        }
        let (status, _) = app
            .admin(
                Method::PUT,
                "/admin/network/evses/E1/status",
                Some(json!({"status": "Charging"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        app.state.sync.flush().await;
        let token = app.party(emsp(), Role::Emsp, true);
        let (status, _, body) = app
            .call(Method::GET, "/ocpi/2.2.1/locations/P1/E1", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["status"], "CHARGING");

        shutdown.trigger();
        let _ = task.await;
    }
}
