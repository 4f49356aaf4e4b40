//! Configuration module
//!
//! The service reads a single TOML file, by default
//! `~/.config/ocpi-service/config.toml`. Every section is optional; missing
//! values fall back to a runnable development setup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::commands::CommandConfig;
use crate::application::parties::LocalIdentity;
use crate::application::store::RemovalPolicy;
use crate::application::sync::SyncConfig;
use crate::domain::network::InclusionFilter;
use crate::domain::ocpi::{BusinessDetails, CommandType, CredentialsRole, PartyScope, Role};
use crate::shared::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Default config location: `<config dir>/ocpi-service/config.toml`.
pub fn default_config_path() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ocpi-service")
        .join("config.toml")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub identity: IdentityConfig,
    pub ocpi: OcpiConfig,
    pub sync: SyncSection,
    pub commands: CommandsSection,
    pub admin: AdminConfig,
    pub parties: Vec<PartyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable base url; advertised endpoints and command
    /// `response_url`s are built from it.
    pub public_url: String,
    /// Seconds granted to background tasks once shutdown starts.
    pub shutdown_timeout: u64,
    /// Timeout of outbound OCPI calls, in seconds.
    pub client_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            public_url: "http://localhost:8090".to_string(),
            shutdown_timeout: 30,
            client_timeout: 10,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub country_code: String,
    pub party_id: String,
    pub business_name: String,
    pub website: Option<String>,
    pub roles: Vec<Role>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            country_code: "DE".to_string(),
            party_id: "GEF".to_string(),
            business_name: "OCPI Service".to_string(),
            website: None,
            roles: vec![Role::Cpo],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcpiConfig {
    /// Require a token for `/ocpi/versions` and `/ocpi/2.2.1`.
    pub gate_version_discovery: bool,
    pub max_page_size: usize,
    /// Protocol violations after which a party is blocked.
    pub violation_threshold: u32,
}

impl Default for OcpiConfig {
    fn default() -> Self {
        Self {
            gate_version_discovery: false,
            max_page_size: 100,
            violation_threshold: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub queue_capacity: usize,
    pub enqueue_timeout_ms: u64,
    pub queue_idle_secs: u64,
    pub lock_timeout_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub removal_policy: RemovalPolicy,
    pub filter: InclusionFilter,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            enqueue_timeout_ms: 1000,
            queue_idle_secs: 60,
            lock_timeout_ms: 2000,
            retry_max_attempts: 4,
            retry_initial_delay_ms: 50,
            retry_max_delay_ms: 2000,
            removal_policy: RemovalPolicy::default(),
            filter: InclusionFilter::allow_all(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsSection {
    pub ack_timeout_secs: u64,
    pub result_timeout_secs: u64,
    /// Per command kind overrides of `result_timeout_secs`.
    pub result_timeouts: HashMap<CommandType, u64>,
    pub result_retention_secs: u64,
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            ack_timeout_secs: 10,
            result_timeout_secs: 60,
            result_timeouts: HashMap::new(),
            result_retention_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Hex SHA-256 of the admin key. Empty disables the admin API.
    pub api_key_sha256: String,
}

/// A party known before it ever calls us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyConfig {
    pub country_code: String,
    pub party_id: String,
    pub role: Role,
    pub business_name: String,
    /// Token A the party registers with.
    pub token_a: String,
    /// Versions url of the party, when we start the handshake.
    #[serde(default)]
    pub versions_url: Option<String>,
    /// Token A the party handed us for a locally initiated handshake.
    #[serde(default)]
    pub remote_token_a: Option<String>,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub filter: InclusionFilter,
}

impl PartyConfig {
    pub fn scope(&self) -> Result<PartyScope, ConfigError> {
        parse_scope(&self.country_code, &self.party_id)
    }
}

fn parse_scope(country_code: &str, party_id: &str) -> Result<PartyScope, ConfigError> {
    let uppercase = country_code.chars().all(|c| c.is_ascii_uppercase())
        && party_id
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if !uppercase {
        return Err(ConfigError::Invalid(format!(
            "party {country_code}*{party_id} must be upper case"
        )));
    }
    PartyScope::parse(country_code, party_id).ok_or_else(|| {
        ConfigError::Invalid(format!("malformed party {country_code}*{party_id}"))
    })
}

impl AppConfig {
    /// Read and validate the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_scope(&self.identity.country_code, &self.identity.party_id)?;
        if self.identity.roles.is_empty() {
            return Err(ConfigError::Invalid("identity needs at least one role".into()));
        }
        if self.ocpi.max_page_size == 0 {
            return Err(ConfigError::Invalid("ocpi.max_page_size must be positive".into()));
        }
        if self.sync.queue_capacity == 0 {
            return Err(ConfigError::Invalid("sync.queue_capacity must be positive".into()));
        }
        if !self.admin.api_key_sha256.is_empty()
            && (self.admin.api_key_sha256.len() != 64
                || hex::decode(&self.admin.api_key_sha256).is_err())
        {
            return Err(ConfigError::Invalid(
                "admin.api_key_sha256 must be a hex SHA-256 digest".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for party in &self.parties {
            let scope = party.scope()?;
            if party.token_a.is_empty() {
                return Err(ConfigError::Invalid(format!("party {scope} has an empty token_a")));
            }
            if !seen.insert(scope.clone()) {
                return Err(ConfigError::Invalid(format!("party {scope} is configured twice")));
            }
        }
        Ok(())
    }

    pub fn local_identity(&self) -> Result<LocalIdentity, ConfigError> {
        let identity = &self.identity;
        let scope = parse_scope(&identity.country_code, &identity.party_id)?;
        let roles = identity
            .roles
            .iter()
            .map(|role| CredentialsRole {
                role: *role,
                business_details: BusinessDetails {
                    name: identity.business_name.clone(),
                    website: identity.website.clone(),
                },
                party_id: scope.party_id.clone(),
                country_code: scope.country_code.clone(),
            })
            .collect();
        Ok(LocalIdentity {
            scope,
            business_name: identity.business_name.clone(),
            roles,
            public_url: self.server.public_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn sync_config(&self) -> SyncConfig {
        let sync = &self.sync;
        SyncConfig {
            queue_capacity: sync.queue_capacity,
            enqueue_timeout: Duration::from_millis(sync.enqueue_timeout_ms),
            queue_idle_timeout: Duration::from_secs(sync.queue_idle_secs.max(1)),
            removal_policy: sync.removal_policy,
            retry: RetryPolicy::new(
                sync.retry_max_attempts,
                Duration::from_millis(sync.retry_initial_delay_ms),
                Duration::from_millis(sync.retry_max_delay_ms),
            ),
        }
    }

    pub fn command_config(&self) -> CommandConfig {
        let commands = &self.commands;
        CommandConfig {
            ack_timeout: Duration::from_secs(commands.ack_timeout_secs),
            result_timeout: Duration::from_secs(commands.result_timeout_secs),
            result_timeouts: commands
                .result_timeouts
                .iter()
                .map(|(kind, secs)| (*kind, Duration::from_secs(*secs)))
                .collect(),
            retention: Duration::from_secs(commands.result_retention_secs),
        }
    }

    pub fn admin_key_sha256(&self) -> Option<String> {
        let key = self.admin.api_key_sha256.trim();
        (!key.is_empty()).then(|| key.to_lowercase())
    }
}
