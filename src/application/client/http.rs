//! `reqwest` implementation of [`OcpiClient`]

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{ClientError, OcpiClient};
use crate::domain::ocpi::{
    CommandRequest, CommandResponse, CommandResult, Credentials, Envelope, Version,
    VersionDetails,
};

/// OCPI 2.2 `Authorization` header value: the token, base64 encoded.
pub fn authorization_header(token: &str) -> String {
    format!("Token {}", STANDARD.encode(token))
}

pub struct HttpOcpiClient {
    client: Client,
}

impl HttpOcpiClient {
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        token: &str,
    ) -> Result<Option<T>, ClientError> {
        let request_id = Uuid::new_v4().to_string();
        let response = request
            .header(AUTHORIZATION, authorization_header(token))
            .header("X-Request-ID", &request_id)
            .header("X-Correlation-ID", &request_id)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        debug!(%request_id, status = status.as_u16(), url = %response.url(), "OCPI call answered");
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        if !envelope.is_success() {
            return Err(ClientError::Ocpi {
                code: envelope.status_code,
                message: envelope.status_message.unwrap_or_default(),
            });
        }
        Ok(envelope.data)
    }

    async fn send_required<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        token: &str,
    ) -> Result<T, ClientError> {
        self.send(request, token)
            .await?
            .ok_or_else(|| ClientError::Decode("response envelope carries no data".to_string()))
    }
}

fn from_reqwest(error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Transport(error.to_string())
    }
}

#[async_trait]
impl OcpiClient for HttpOcpiClient {
    async fn get_versions(&self, url: &str, token: &str) -> Result<Vec<Version>, ClientError> {
        self.send_required(self.client.get(url), token).await
    }

    async fn get_version_details(
        &self,
        url: &str,
        token: &str,
    ) -> Result<VersionDetails, ClientError> {
        self.send_required(self.client.get(url), token).await
    }

    async fn post_credentials(
        &self,
        url: &str,
        token: &str,
        credentials: &Credentials,
    ) -> Result<Credentials, ClientError> {
        self.send_required(self.client.post(url).json(credentials), token)
            .await
    }

    async fn post_command(
        &self,
        url: &str,
        token: &str,
        request: &CommandRequest,
    ) -> Result<CommandResponse, ClientError> {
        self.send_required(self.client.post(url).json(&request.to_json()), token)
            .await
    }

    async fn post_command_result(
        &self,
        url: &str,
        token: &str,
        result: &CommandResult,
    ) -> Result<(), ClientError> {
        self.send::<Value>(self.client.post(url).json(result), token)
            .await
            .map(|_| ())
    }

    async fn put_object(&self, url: &str, token: &str, body: &Value) -> Result<(), ClientError> {
        self.send::<Value>(self.client.put(url).json(body), token)
            .await
            .map(|_| ())
    }

    async fn patch_object(
        &self,
        url: &str,
        token: &str,
        body: &Value,
    ) -> Result<(), ClientError> {
        self.send::<Value>(self.client.patch(url).json(body), token)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn authorization_header_is_base64_encoded() {
        assert_eq!(authorization_header("abc-123"), "Token YWJjLTEyMw==");
    }

    #[test]
    fn server_side_failures_are_transient() {
        assert!(ClientError::Status(503).is_transient());
        assert!(ClientError::Timeout.is_transient());
        assert!(!ClientError::Status(404).is_transient());
        assert!(!ClientError::Ocpi { code: 2001, message: String::new() }.is_transient());
    }

    #[tokio::test]
    async fn versions_are_read_from_the_envelope() {
        let router = Router::new().route(
            "/versions",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "data": [{"version": "2.2.1", "url": auth}],
                    "status_code": 1000,
                    "timestamp": "2024-01-01T00:00:00Z"
                }))
            }),
        );
        let base = serve(router).await;
        let client = HttpOcpiClient::new(Duration::from_secs(5)).unwrap();

        let versions = client
            .get_versions(&format!("{base}/versions"), "tok")
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].url, authorization_header("tok"));
    }

    #[tokio::test]
    async fn ocpi_error_status_is_reported() {
        let router = Router::new().route(
            "/versions",
            get(|| async {
                Json(json!({
                    "status_code": 2000,
                    "status_message": "nope",
                    "timestamp": "2024-01-01T00:00:00Z"
                }))
            }),
        );
        let base = serve(router).await;
        let client = HttpOcpiClient::new(Duration::from_secs(5)).unwrap();

        let err = client
            .get_versions(&format!("{base}/versions"), "tok")
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Ocpi { code: 2000, message: "nope".to_string() });
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let client = HttpOcpiClient::new(Duration::from_secs(2)).unwrap();
        let err = client
            .get_versions("http://127.0.0.1:9/versions", "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport(_) | ClientError::Timeout));
    }
}
