//! Configuration for cloud access and job defaults.
//!
//! [`RemoteConfig`] can be loaded from:
//! 1. a TOML file ([`RemoteConfig::from_file`]),
//! 2. environment variables with the `PASQAL_` prefix ([`RemoteConfig::from_env`]).
//!
//! Environment variables override file values when both are used through
//! [`RemoteConfig::load`].
//!
//! ```toml
//! username = "alice@example.com"
//! password = "..."
//! project_id = "00000000-0000-0000-0000-000000000000"
//!
//! [endpoints]
//! core = "https://apis.pasqal.cloud/core-fast"
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::PollPolicy;
use crate::error::{ProviderError, ProviderResult};

pub const ENV_USERNAME: &str = "PASQAL_USERNAME";
pub const ENV_PASSWORD: &str = "PASQAL_PASSWORD";
pub const ENV_PROJECT_ID: &str = "PASQAL_PROJECT_ID";
pub const ENV_TOKEN: &str = "PASQAL_TOKEN";
pub const ENV_CORE_URL: &str = "PASQAL_CORE_URL";
pub const ENV_ACCOUNT_URL: &str = "PASQAL_ACCOUNT_URL";
pub const ENV_WEBHOOK: &str = "PASQAL_WEBHOOK";

/// Credentials and endpoints of the cloud.
///
/// Either a static `token` or a `username`/`password` pair is needed.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub project_id: String,
    /// Pre-issued access token. Skips the password login.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub auth0: Auth0Config,
    /// URL notified when batches finish.
    #[serde(default)]
    pub webhook: Option<String>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("project_id", &self.project_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("endpoints", &self.endpoints)
            .field("auth0", &self.auth0)
            .field("webhook", &self.webhook)
            .finish()
    }
}

/// Base URLs of the cloud services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_core_url")]
    pub core: String,
    #[serde(default = "default_account_url")]
    pub account: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            core: default_core_url(),
            account: default_account_url(),
        }
    }
}

/// Identity provider used for the password login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth0Config {
    #[serde(default = "default_auth0_domain")]
    pub domain: String,
    #[serde(default = "default_public_client_id")]
    pub public_client_id: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_realm")]
    pub realm: String,
}

impl Default for Auth0Config {
    fn default() -> Self {
        Self {
            domain: default_auth0_domain(),
            public_client_id: default_public_client_id(),
            audience: default_audience(),
            realm: default_realm(),
        }
    }
}

fn default_core_url() -> String {
    "https://apis.pasqal.cloud/core-fast".to_string()
}

fn default_account_url() -> String {
    "https://apis.pasqal.cloud/account".to_string()
}

fn default_auth0_domain() -> String {
    "https://authenticate.pasqal.cloud".to_string()
}

fn default_public_client_id() -> String {
    "PeZvo7Atx7IVv3iel59asJSb4Ig7vuSB".to_string()
}

fn default_audience() -> String {
    "https://apis.pasqal.cloud/account/api/v1".to_string()
}

fn default_realm() -> String {
    "pcs-users".to_string()
}

impl RemoteConfig {
    /// Config authenticating with a username and password.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    /// Config authenticating with a pre-issued token.
    pub fn with_token(token: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_auth0(mut self, auth0: Auth0Config) -> Self {
        self.auth0 = auth0;
        self
    }

    pub fn with_webhook(mut self, webhook: impl Into<String>) -> Self {
        self.webhook = Some(webhook.into());
        self
    }

    pub fn from_toml_str(contents: &str) -> ProviderResult<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ProviderError::Configuration(format!("invalid remote config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Build a config from `PASQAL_*` environment variables.
    ///
    /// Returns `Ok(None)` when no credentials are set at all.
    pub fn from_env() -> ProviderResult<Option<Self>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load `path`, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ProviderResult<Option<Self>> {
        let has_credentials = [ENV_USERNAME, ENV_PASSWORD, ENV_TOKEN]
            .into_iter()
            .any(|key| lookup(key).is_some());
        if !has_credentials {
            return Ok(None);
        }
        let mut config = Self::default();
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(Some(config))
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(username) = lookup(ENV_USERNAME) {
            self.username = Some(username);
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.password = Some(password);
        }
        if let Some(project_id) = lookup(ENV_PROJECT_ID) {
            self.project_id = project_id;
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.token = Some(token);
        }
        if let Some(core) = lookup(ENV_CORE_URL) {
            self.endpoints.core = core;
        }
        if let Some(account) = lookup(ENV_ACCOUNT_URL) {
            self.endpoints.account = account;
        }
        if let Some(webhook) = lookup(ENV_WEBHOOK) {
            self.webhook = Some(webhook);
        }
    }

    /// Check that a project and a way to authenticate are configured.
    pub fn validate(&self) -> ProviderResult<()> {
        if self.project_id.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "a project id is required".into(),
            ));
        }
        let has_login = self.username.is_some() && self.password.is_some();
        if self.token.is_none() && !has_login {
            return Err(ProviderError::Configuration(
                "either a token or both username and password are required".into(),
            ));
        }
        Ok(())
    }
}

/// Defaults applied to every backend a provider builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderOptions {
    /// Shots used by local backends when none are given.
    pub default_shots: u32,
    pub poll_policy: PollPolicy,
    /// Finished jobs a local backend keeps before evicting the oldest.
    pub max_finished_jobs: usize,
}

impl ProviderOptions {
    pub const DEFAULT_SHOTS: u32 = 1000;
    pub const DEFAULT_MAX_FINISHED_JOBS: usize = 256;

    pub fn with_default_shots(mut self, shots: u32) -> Self {
        self.default_shots = shots;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_policy.interval = interval;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.poll_policy.max_polls = max_polls;
        self
    }

    pub fn with_max_finished_jobs(mut self, max_finished_jobs: usize) -> Self {
        self.max_finished_jobs = max_finished_jobs;
        self
    }
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            default_shots: Self::DEFAULT_SHOTS,
            poll_policy: PollPolicy::default(),
            max_finished_jobs: Self::DEFAULT_MAX_FINISHED_JOBS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: FxHashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_toml() {
        let config = RemoteConfig::from_toml_str(
            r#"
            username = "alice"
            password = "secret"
            project_id = "project-1"

            [endpoints]
            core = "http://localhost:9000"
            "#,
        )
        .unwrap();

        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.endpoints.core, "http://localhost:9000");
        assert_eq!(config.endpoints.account, default_account_url());
        assert_eq!(config.auth0.realm, "pcs-users");
    }

    #[test]
    fn test_toml_needs_credentials() {
        let err = RemoteConfig::from_toml_str(r#"project_id = "project-1""#).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(RemoteConfig::from_toml_str("not toml = = =").is_err());
    }

    #[test]
    fn test_from_env_lookup() {
        assert!(RemoteConfig::from_lookup(env(&[])).unwrap().is_none());

        let config = RemoteConfig::from_lookup(env(&[
            (ENV_TOKEN, "tok"),
            (ENV_PROJECT_ID, "project-2"),
            (ENV_CORE_URL, "http://core.test"),
            (ENV_WEBHOOK, "http://hook.test"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(config.token.as_deref(), Some("tok"));
        assert_eq!(config.endpoints.core, "http://core.test");
        assert_eq!(config.webhook.as_deref(), Some("http://hook.test"));

        assert!(RemoteConfig::from_lookup(env(&[(ENV_USERNAME, "bob")])).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = RemoteConfig::new("alice", "hunter2", "p");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_provider_options() {
        let options = ProviderOptions::default()
            .with_default_shots(50)
            .with_poll_interval(Duration::from_millis(10))
            .with_max_polls(3);
        assert_eq!(options.default_shots, 50);
        assert_eq!(options.poll_policy.timeout(), Duration::from_millis(30));
        assert_eq!(ProviderOptions::default().default_shots, 1000);
    }
}
