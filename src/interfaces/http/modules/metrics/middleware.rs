//! HTTP request metrics middleware
//!
//! Records `http_requests_total` and `http_request_duration_seconds`, labelled
//! with the route template and the OCPI module it belongs to.

use std::time::Instant;

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};

/// Label for requests no route matched; raw paths would explode cardinality.
const UNMATCHED: &str = "unmatched";

/// OCPI module of a route template (`/ocpi/2.2.1/receiver/locations/...`
/// → `locations`). Non-OCPI routes are labelled by their first segment.
fn module_of(route: &str) -> &str {
    let mut segments = route.trim_start_matches('/').split('/');
    match segments.next() {
        Some("ocpi") => match segments.next() {
            Some("versions") | None => "versions",
            Some(_) => match segments.next() {
                Some("receiver") => segments.next().unwrap_or("versions"),
                Some(module) => module,
                None => "versions",
            },
        },
        Some("") | None => UNMATCHED,
        Some(first) => first,
    }
}

pub async fn http_metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED.to_string());
    let module = module_of(&route).to_string();

    let start = Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    metrics::counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => route.clone(),
        "module" => module.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => route,
        "module" => module
    )
    .record(duration);

    response
}
