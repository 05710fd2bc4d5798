//! REST client for the Pasqal cloud.
//!
//! ## Submission flow
//!
//! 1. Log in (`POST {auth0}/oauth/token`) unless a token is configured
//! 2. `GET /api/v1/devices/specs` to describe the target device
//! 3. `POST /api/v1/batches` with the serialized sequence and one job
//! 4. Poll `GET /api/v1/batches/{id}` until a terminal state
//! 5. `GET /api/v1/jobs/{id}/results` for the counts

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::config::RemoteConfig;
use crate::device::Device;
use crate::job::JobStatus;
use crate::parameter::ParameterValues;
use crate::result::Counts;

use super::error::{CloudError, CloudResult};

const API_PATH: &str = "/api/v1";

const PASSWORD_REALM_GRANT: &str = "http://auth0.com/oauth/grant-type/password-realm";

/// Cloud API client.
///
/// Cloning is cheap and clones share the cached access token.
#[derive(Clone)]
pub struct CloudClient {
    client: Client,
    config: RemoteConfig,
    token: Arc<Mutex<Option<String>>>,
}

impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClient")
            .field("core", &self.config.endpoints.core)
            .field("project_id", &self.config.project_id)
            .field("credentials", &"[REDACTED]")
            .finish()
    }
}

impl CloudClient {
    pub fn new(config: RemoteConfig) -> CloudResult<Self> {
        let has_login = config.username.is_some() && config.password.is_some();
        if config.token.is_none() && !has_login {
            return Err(CloudError::MissingCredentials);
        }
        if config.project_id.trim().is_empty() {
            return Err(CloudError::MissingProjectId);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            token: Arc::new(Mutex::new(config.token.clone())),
            config,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}{}{}",
            self.config.endpoints.core.trim_end_matches('/'),
            API_PATH,
            path
        )
    }

    // ─── Authentication ─────────────────────────────────────────────

    /// The cached access token, logging in first if there is none.
    pub async fn access_token(&self) -> CloudResult<String> {
        let mut token = self.token.lock().await;
        if let Some(token) = token.as_ref() {
            return Ok(token.clone());
        }
        let fresh = self.login().await?;
        *token = Some(fresh.clone());
        Ok(fresh)
    }

    #[instrument(skip(self))]
    async fn login(&self) -> CloudResult<String> {
        let (Some(username), Some(password)) = (&self.config.username, &self.config.password)
        else {
            return Err(CloudError::MissingCredentials);
        };
        let auth0 = &self.config.auth0;
        let url = format!("{}/oauth/token", auth0.domain.trim_end_matches('/'));
        debug!("POST {}", url);

        let body = TokenRequest {
            grant_type: PASSWORD_REALM_GRANT,
            realm: &auth0.realm,
            client_id: &auth0.public_client_id,
            audience: &auth0.audience,
            username,
            password,
        };
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CloudError::AuthFailed(format!("{status}: {message}")));
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn authorized(&self, request: RequestBuilder) -> CloudResult<RequestBuilder> {
        let token = self.access_token().await?;
        Ok(request.bearer_auth(token))
    }

    // ─── Devices ────────────────────────────────────────────────────

    /// Specs of every device the cloud offers, keyed by device name.
    ///
    /// Specs may come as JSON objects or as JSON-encoded strings.
    #[instrument(skip(self))]
    pub async fn fetch_device_specs(&self) -> CloudResult<FxHashMap<String, Device>> {
        let url = self.url("/devices/specs");
        debug!("GET {}", url);

        let request = self.authorized(self.client.get(&url)).await?;
        let specs: Envelope<FxHashMap<String, serde_json::Value>> =
            self.handle_response(request.send().await?).await?;

        let mut devices = FxHashMap::default();
        for (name, spec) in specs.data {
            let parsed = match spec {
                serde_json::Value::String(raw) => serde_json::from_str::<Device>(&raw),
                other => serde_json::from_value::<Device>(other),
            };
            match parsed {
                Ok(device) => {
                    devices.insert(name, device);
                }
                Err(e) => warn!("Skipping device {}: {}", name, e),
            }
        }
        Ok(devices)
    }

    /// Specs of the device called `name`.
    pub async fn fetch_device(&self, name: &str) -> CloudResult<Device> {
        self.fetch_device_specs()
            .await?
            .remove(name)
            .ok_or_else(|| CloudError::DeviceNotFound(name.to_string()))
    }

    // ─── Batches ────────────────────────────────────────────────────

    /// Create a batch running `sequence` once per job.
    #[instrument(skip(self, sequence, jobs))]
    pub async fn create_batch(
        &self,
        sequence: &str,
        jobs: &[JobSpec],
        emulator: Option<EmulatorType>,
    ) -> CloudResult<Batch> {
        let url = self.url("/batches");
        debug!("POST {} ({} jobs)", url, jobs.len());

        let body = CreateBatchRequest {
            sequence_builder: sequence,
            jobs,
            emulator,
            project_id: &self.config.project_id,
            webhook: self.config.webhook.as_deref(),
        };
        let request = self.authorized(self.client.post(&url).json(&body)).await?;
        let batch: Envelope<Batch> = self.handle_response(request.send().await?).await?;
        Ok(batch.data)
    }

    #[instrument(skip(self))]
    pub async fn get_batch(&self, batch_id: &str) -> CloudResult<Batch> {
        let url = self.url(&format!("/batches/{batch_id}"));
        debug!("GET {}", url);

        let request = self.authorized(self.client.get(&url)).await?;
        let batch: Envelope<Batch> = self.handle_response(request.send().await?).await?;
        Ok(batch.data)
    }

    #[instrument(skip(self))]
    pub async fn cancel_batch(&self, batch_id: &str) -> CloudResult<Batch> {
        let url = self.url(&format!("/batches/{batch_id}/cancel"));
        debug!("PUT {}", url);

        let request = self.authorized(self.client.put(&url)).await?;
        let batch: Envelope<Batch> = self.handle_response(request.send().await?).await?;
        Ok(batch.data)
    }

    /// Counts of a finished job.
    #[instrument(skip(self))]
    pub async fn get_job_results(&self, job_id: &str) -> CloudResult<Counts> {
        let url = self.url(&format!("/jobs/{job_id}/results"));
        debug!("GET {}", url);

        let request = self.authorized(self.client.get(&url)).await?;
        let results: Envelope<JobResults> = self.handle_response(request.send().await?).await?;
        results
            .data
            .counter
            .map(|counter| counter.into_iter().collect())
            .ok_or_else(|| CloudError::MissingResults(job_id.to_string()))
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> CloudResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                if self.config.token.is_none() {
                    // Stale login; the next call logs in again.
                    *self.token.lock().await = None;
                }
                Err(CloudError::AuthFailed(message))
            }
            StatusCode::NOT_FOUND => Err(CloudError::NotFound(message)),
            _ => Err(CloudError::ApiError {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

// ─── Request types ──────────────────────────────────────────────────

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    realm: &'a str,
    client_id: &'a str,
    audience: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct CreateBatchRequest<'a> {
    sequence_builder: &'a str,
    jobs: &'a [JobSpec],
    emulator: Option<EmulatorType>,
    project_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook: Option<&'a str>,
}

/// One job of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSpec {
    pub runs: u32,
    pub variables: ParameterValues,
}

/// Cloud emulators. QPU batches carry no emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmulatorType {
    EmuFree,
    EmuTn,
    EmuFresnel,
}

// ─── Response types ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct JobResults {
    #[serde(default)]
    counter: Option<FxHashMap<String, u64>>,
}

/// Status of a cloud batch or job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloudStatus {
    Pending,
    Running,
    Done,
    Canceled,
    TimedOut,
    Error,
    Paused,
}

impl CloudStatus {
    pub fn to_job_status(self) -> JobStatus {
        match self {
            CloudStatus::Pending | CloudStatus::Paused => JobStatus::Queued,
            CloudStatus::Running => JobStatus::Running,
            CloudStatus::Done => JobStatus::Completed,
            CloudStatus::Canceled => JobStatus::Cancelled,
            CloudStatus::TimedOut => JobStatus::Failed("timed out".into()),
            CloudStatus::Error => JobStatus::Failed("execution error".into()),
        }
    }
}

/// A batch as reported by the cloud.
#[derive(Debug, Clone, Deserialize)]
pub struct Batch {
    pub id: String,
    pub status: CloudStatus,
    #[serde(default)]
    pub jobs: Vec<CloudJob>,
}

impl Batch {
    /// Batch status, with job errors folded into failures.
    pub fn job_status(&self) -> JobStatus {
        match self.status.to_job_status() {
            JobStatus::Failed(reason) => {
                let errors: Vec<&str> = self
                    .jobs
                    .iter()
                    .flat_map(|job| job.errors.iter().map(String::as_str))
                    .collect();
                if errors.is_empty() {
                    JobStatus::Failed(reason)
                } else {
                    JobStatus::Failed(errors.join("; "))
                }
            }
            status => status,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudJob {
    pub id: String,
    pub status: CloudStatus,
    #[serde(default)]
    pub runs: Option<u32>,
    #[serde(default)]
    pub errors: Vec<String>,
}
