//! Orchestration manager endpoint over its REST API.
//!
//! Authenticates lazily with login/password, caches the token and sends it
//! in the `FDS-Auth` header. A request rejected with 401 re-authenticates
//! once before giving up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use iodriver_core::endpoint::{
    Capabilities, ConnectionParams, Endpoint, EndpointFactory, EndpointType, OrchestrationApi,
    Tenant, User, VolumeDescriptor,
};
use iodriver_core::qos::{MediaPolicy, VolumeQosSettings};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const AUTH_HEADER: &str = "FDS-Auth";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct WireVolumePolicy {
    #[serde(rename = "mediaPolicy")]
    media_policy: MediaPolicy,
}

/// Volume as listed by `GET /api/config/volumes`.
#[derive(Debug, Deserialize)]
struct WireVolume {
    name: String,
    id: String,
    #[serde(default, rename = "tenantId")]
    tenant_id: Option<u64>,
    sla: u32,
    limit: u32,
    priority: u32,
    commit_log_retention: u64,
    policy: WireVolumePolicy,
}

impl WireVolume {
    fn into_descriptor(self) -> Result<VolumeDescriptor> {
        let id = self
            .id
            .parse()
            .with_context(|| format!("volume {} has a non-numeric id {:?}", self.name, self.id))?;
        Ok(VolumeDescriptor {
            name: self.name,
            tenant_id: self.tenant_id,
            qos: VolumeQosSettings {
                id,
                iops_assured: self.sla,
                iops_throttle: self.limit,
                priority: self.priority,
                commit_log_retention: self.commit_log_retention,
                media_policy: self.policy.media_policy,
            },
        })
    }
}

/// Body of `PUT /api/config/volumes/{id}`.
#[derive(Debug, Serialize)]
struct WireQosUpdate {
    sla: u32,
    limit: u32,
    priority: u32,
    commit_log_retention: u64,
    #[serde(rename = "mediaPolicy")]
    media_policy: MediaPolicy,
}

impl From<&VolumeQosSettings> for WireQosUpdate {
    fn from(s: &VolumeQosSettings) -> Self {
        Self {
            sla: s.iops_assured,
            limit: s.iops_throttle,
            priority: s.priority,
            commit_log_retention: s.commit_log_retention,
            media_policy: s.media_policy,
        }
    }
}

pub struct OmRestEndpoint {
    client: Client,
    base: String,
    login: String,
    password: String,
    token: Mutex<Option<String>>,
}

impl OmRestEndpoint {
    /// Options: `login`, `password` (both default `admin`), `timeout_secs`
    /// (default 30) and `trusting` to accept self-signed certificates.
    pub fn new(params: &ConnectionParams) -> Result<Self> {
        if params.uri.is_empty() {
            anyhow::bail!("om-rest endpoint needs a uri");
        }
        let timeout = match params.options.get("timeout_secs") {
            Some(v) => Duration::from_secs(v.parse().context("invalid timeout_secs")?),
            None => Duration::from_secs(30),
        };
        let trusting = params
            .options
            .get("trusting")
            .is_some_and(|v| v == "true");
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(trusting)
            .build()
            .context("failed to create HTTP client")?;
        let option = |key: &str| {
            params
                .options
                .get(key)
                .cloned()
                .unwrap_or_else(|| "admin".to_string())
        };
        Ok(Self {
            client,
            base: params.uri.trim_end_matches('/').to_string(),
            login: option("login"),
            password: option("password"),
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let response = self
            .client
            .post(self.url("/api/auth/token"))
            .query(&[("login", &self.login), ("password", &self.password)])
            .send()
            .await
            .context("authentication request failed")?
            .error_for_status()
            .context("authentication rejected")?;
        let body: TokenResponse = response
            .json()
            .await
            .context("malformed authentication response")?;
        info!(login = %self.login, "authenticated against orchestration manager");
        *cached = Some(body.token.clone());
        Ok(body.token)
    }

    /// Sends an authenticated request built by `build`, re-authenticating
    /// once if the cached token was rejected.
    async fn send<F>(&self, method: Method, path: &str, build: F) -> Result<Response>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        for attempt in 0..2 {
            let token = self.token().await?;
            let request = self
                .client
                .request(method.clone(), self.url(path))
                .header(AUTH_HEADER, token);
            let response = build(request)
                .send()
                .await
                .with_context(|| format!("{method} {path} failed"))?;
            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                debug!(path, "token rejected, re-authenticating");
                *self.token.lock().await = None;
                continue;
            }
            return response
                .error_for_status()
                .with_context(|| format!("{method} {path} returned an error"));
        }
        anyhow::bail!("{method} {path}: not authorized")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::GET, path, |r| r)
            .await?
            .json()
            .await
            .with_context(|| format!("malformed response from {path}"))
    }
}

#[async_trait]
impl OrchestrationApi for OmRestEndpoint {
    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        self.get_json("/api/system/tenants").await
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeDescriptor>> {
        let volumes: Vec<WireVolume> = self.get_json("/api/config/volumes").await?;
        volumes.into_iter().map(WireVolume::into_descriptor).collect()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.get_json("/api/system/users").await
    }

    async fn set_volume_qos(&self, settings: &VolumeQosSettings) -> Result<()> {
        let body = WireQosUpdate::from(settings);
        let path = format!("/api/config/volumes/{}", settings.id);
        self.send(Method::PUT, &path, |r| r.json(&body)).await?;
        Ok(())
    }
}

impl Endpoint for OmRestEndpoint {
    fn name(&self) -> &str {
        "om-rest"
    }

    fn capabilities(&self) -> Capabilities {
        EndpointType::OrchestrationManager.into()
    }

    fn orchestration(&self) -> Option<&dyn OrchestrationApi> {
        Some(self)
    }
}

pub struct OmRestFactory;

impl EndpointFactory for OmRestFactory {
    fn name(&self) -> &'static str {
        "om-rest"
    }

    fn create(&self, params: &ConnectionParams) -> Result<Box<dyn Endpoint>> {
        Ok(Box::new(OmRestEndpoint::new(params)?))
    }
}
