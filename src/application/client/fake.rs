//! In-memory [`OcpiClient`] used by tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{ClientError, OcpiClient};
use crate::domain::ocpi::{
    CommandRequest, CommandResponse, CommandResponseType, CommandResult, Credentials, Version,
    VersionDetails,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetVersions(String),
    GetVersionDetails(String),
    PostCredentials { url: String, token: String },
    PostCommand { url: String, request: CommandRequest },
    PostCommandResult { url: String, result: CommandResult },
    Put { url: String, body: Value },
    Patch { url: String, body: Value },
}

pub struct FakeOcpiClient {
    unreachable: AtomicBool,
    versions: DashMap<String, Vec<Version>>,
    details: DashMap<String, VersionDetails>,
    credentials_reply: Mutex<Option<Credentials>>,
    command_reply: Mutex<Result<CommandResponse, ClientError>>,
    calls: Mutex<Vec<Call>>,
}

impl Default for FakeOcpiClient {
    fn default() -> Self {
        Self {
            unreachable: AtomicBool::new(false),
            versions: DashMap::new(),
            details: DashMap::new(),
            credentials_reply: Mutex::new(None),
            command_reply: Mutex::new(Ok(CommandResponse {
                result: CommandResponseType::Accepted,
                timeout: 30,
                message: None,
            })),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeOcpiClient {
    /// Every call fails with a transport error.
    pub fn unreachable() -> Self {
        let client = Self::default();
        client.unreachable.store(true, Ordering::SeqCst);
        client
    }

    pub fn with_versions(self, url: &str, versions: Vec<Version>) -> Self {
        self.versions.insert(url.to_string(), versions);
        self
    }

    pub fn with_details(self, url: &str, details: VersionDetails) -> Self {
        self.details.insert(url.to_string(), details);
        self
    }

    pub fn set_credentials_reply(&self, credentials: Credentials) {
        *self.credentials_reply.lock().unwrap() = Some(credentials);
    }

    pub fn set_command_reply(&self, reply: Result<CommandResponse, ClientError>) {
        *self.command_reply.lock().unwrap() = reply;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(call);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OcpiClient for FakeOcpiClient {
    async fn get_versions(&self, url: &str, _token: &str) -> Result<Vec<Version>, ClientError> {
        self.record(Call::GetVersions(url.to_string()))?;
        self.versions
            .get(url)
            .map(|v| v.clone())
            .ok_or(ClientError::Status(404))
    }

    async fn get_version_details(
        &self,
        url: &str,
        _token: &str,
    ) -> Result<VersionDetails, ClientError> {
        self.record(Call::GetVersionDetails(url.to_string()))?;
        self.details
            .get(url)
            .map(|d| d.clone())
            .ok_or(ClientError::Status(404))
    }

    async fn post_credentials(
        &self,
        url: &str,
        token: &str,
        _credentials: &Credentials,
    ) -> Result<Credentials, ClientError> {
        self.record(Call::PostCredentials {
            url: url.to_string(),
            token: token.to_string(),
        })?;
        self.credentials_reply
            .lock()
            .unwrap()
            .clone()
            .ok_or(ClientError::Status(404))
    }

    async fn post_command(
        &self,
        url: &str,
        _token: &str,
        request: &CommandRequest,
    ) -> Result<CommandResponse, ClientError> {
        self.record(Call::PostCommand {
            url: url.to_string(),
            request: request.clone(),
        })?;
        self.command_reply.lock().unwrap().clone()
    }

    async fn post_command_result(
        &self,
        url: &str,
        _token: &str,
        result: &CommandResult,
    ) -> Result<(), ClientError> {
        self.record(Call::PostCommandResult {
            url: url.to_string(),
            result: result.clone(),
        })
    }

    async fn put_object(&self, url: &str, _token: &str, body: &Value) -> Result<(), ClientError> {
        self.record(Call::Put {
            url: url.to_string(),
            body: body.clone(),
        })
    }

    async fn patch_object(
        &self,
        url: &str,
        _token: &str,
        body: &Value,
    ) -> Result<(), ClientError> {
        self.record(Call::Patch {
            url: url.to_string(),
            body: body.clone(),
        })
    }
}
