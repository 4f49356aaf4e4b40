//! Request and correlation id middleware
//!
//! OCPI asks every party to send `X-Request-ID` (unique per hop) and
//! `X-Correlation-ID` (shared by every hop of one logical request). Both are
//! reused when present, generated otherwise, attached to a `tracing::Span`
//! wrapping the request, and echoed back on the response.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Ids of the current request, stored in request extensions.
///
/// Extract in handlers: `Extension(ids): Extension<RequestIds>`
#[derive(Clone, Debug)]
pub struct RequestIds {
    pub request_id: String,
    pub correlation_id: String,
}

fn header_or_new(request: &Request<Body>, name: &str) -> String {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let ids = RequestIds {
        request_id: header_or_new(&request, REQUEST_ID_HEADER),
        correlation_id: header_or_new(&request, CORRELATION_ID_HEADER),
    };
    request.extensions_mut().insert(ids.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        correlation_id = %ids.correlation_id,
        method = %request.method(),
        uri = %request.uri(),
    );

    let mut response = next.run(request).instrument(span).await;

    let headers = response.headers_mut();
    if let Ok(value) = ids.request_id.parse() {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    if let Ok(value) = ids.correlation_id.parse() {
        headers.insert(CORRELATION_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::middleware;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn incoming_ids_are_echoed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(REQUEST_ID_HEADER, "req-1")
                    .header(CORRELATION_ID_HEADER, "corr-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-1");
        assert_eq!(response.headers()[CORRELATION_ID_HEADER], "corr-1");
    }

    #[tokio::test]
    async fn missing_ids_are_generated() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let request_id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert!(Uuid::parse_str(request_id).is_ok());
        assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
    }
}
