//! HTTP client for a Pulse bridge.
//!
//! The bridge is a separate process running the vendor client library; it
//! owns the portal session and exposes sites and zones as JSON.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::AdtPulseConfig;
use super::client::ClientError;
use super::client::PulseService;
use super::client::PulseSite;
use super::client::Zone;

/// Request timeout; arming can take several seconds on the portal side.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct StatusResponse {
    gateway_online: bool,
    #[serde(default)]
    sites: Vec<SiteData>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct SiteData {
    id: String,
    name: String,
    status: String,
    #[serde(default)]
    last_updated: f64,
    #[serde(default)]
    zones: Vec<ZoneData>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct ZoneData {
    /// Numeric zone id
    zone: u32,
    id: String,
    name: String,
    #[serde(default)]
    tags: BTreeSet<String>,
    status: String,
    state: String,
    #[serde(default)]
    last_activity_timestamp: i64,
}

impl From<ZoneData> for Zone {
    fn from(z: ZoneData) -> Self {
        Zone {
            id: z.id,
            name: z.name,
            tags: z.tags,
            status: z.status,
            state: z.state,
            last_activity_timestamp: z.last_activity_timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    fingerprint: &'a str,
}

#[derive(Debug, Serialize)]
struct ArmRequest {
    mode: &'static str,
    force_arm: bool,
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    success: bool,
}

/// Transport shared by the service and its sites.
#[derive(Debug)]
struct Transport {
    http: reqwest::Client,
    base_url: String,
}

impl Transport {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_command<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<bool, ClientError> {
        let response: CommandResponse = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.success)
    }
}

/// Latest status for one site, shared between the service and the site handle.
type SharedSite = Arc<RwLock<SiteData>>;

/// Site handle returned by [`BridgeClient::sites`].
pub struct BridgeSite {
    data: SharedSite,
    transport: Arc<Transport>,
}

impl BridgeSite {
    fn read<T>(&self, f: impl FnOnce(&SiteData) -> T) -> T {
        match self.data.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    async fn command<B: Serialize + ?Sized>(&self, action: &str, body: &B) -> bool {
        let path = format!("/sites/{}/{}", self.id(), action);
        match self.transport.post_command(&path, body).await {
            Ok(success) => success,
            Err(e) => {
                warn!("ADT Pulse {} request failed: {}", action, e);
                false
            }
        }
    }
}

#[async_trait]
impl PulseSite for BridgeSite {
    fn id(&self) -> String {
        self.read(|s| s.id.clone())
    }

    fn name(&self) -> String {
        self.read(|s| s.name.clone())
    }

    fn status(&self) -> String {
        self.read(|s| s.status.clone())
    }

    fn last_updated(&self) -> f64 {
        self.read(|s| s.last_updated)
    }

    fn zones(&self) -> BTreeMap<u32, Zone> {
        self.read(|s| {
            s.zones
                .iter()
                .map(|z| (z.zone, Zone::from(z.clone())))
                .collect()
        })
    }

    async fn arm_home(&self, force_arm: bool) -> bool {
        self.command(
            "arm",
            &ArmRequest {
                mode: "stay",
                force_arm,
            },
        )
        .await
    }

    async fn arm_away(&self, force_arm: bool) -> bool {
        self.command(
            "arm",
            &ArmRequest {
                mode: "away",
                force_arm,
            },
        )
        .await
    }

    async fn disarm(&self) -> bool {
        self.command("disarm", &serde_json::json!({})).await
    }
}

/// [`PulseService`] backed by a Pulse bridge over HTTP.
pub struct BridgeClient {
    transport: Arc<Transport>,
    username: String,
    password: String,
    fingerprint: String,
    poll_interval: Duration,
    gateway_online: AtomicBool,
    /// Site handles keep their `SharedSite` across polls so entities holding
    /// them see updates in place.
    sites: RwLock<Vec<Arc<BridgeSite>>>,
}

impl BridgeClient {
    pub fn new(config: &AdtPulseConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Self::from_reqwest(config, http)
    }

    pub fn from_reqwest(config: &AdtPulseConfig, http: reqwest::Client) -> Result<Self, ClientError> {
        let base_url = config.url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(config.url.clone()));
        }

        Ok(Self {
            transport: Arc::new(Transport { http, base_url }),
            username: config.username.clone(),
            password: config.password.clone(),
            fingerprint: config.fingerprint.clone(),
            poll_interval: config.poll_interval(),
            gateway_online: AtomicBool::new(false),
            sites: RwLock::new(Vec::new()),
        })
    }

    async fn fetch_status(&self) -> Result<StatusResponse, ClientError> {
        let status = self
            .transport
            .http
            .get(self.transport.url("/status"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(status)
    }

    /// Apply a status response, updating existing site handles in place.
    /// Returns whether anything changed.
    fn apply_status(&self, status: StatusResponse) -> bool {
        let was_online = self
            .gateway_online
            .swap(status.gateway_online, Ordering::SeqCst);
        let mut changed = was_online != status.gateway_online;

        let Ok(mut sites) = self.sites.write() else {
            return changed;
        };

        for data in status.sites {
            let existing = sites
                .iter()
                .find(|s| s.read(|current| current.id == data.id))
                .cloned();
            match existing {
                Some(site) => {
                    if let Ok(mut current) = site.data.write() {
                        if *current != data {
                            *current = data;
                            changed = true;
                        }
                    }
                }
                None => {
                    debug!("ADT Pulse bridge reported new site {}", data.id);
                    sites.push(Arc::new(BridgeSite {
                        data: Arc::new(RwLock::new(data)),
                        transport: self.transport.clone(),
                    }));
                    changed = true;
                }
            }
        }

        changed
    }
}

#[async_trait]
impl PulseService for BridgeClient {
    async fn login(&self) -> Result<(), ClientError> {
        info!("Logging in to ADT Pulse as {}", self.username);
        let request = LoginRequest {
            username: &self.username,
            password: &self.password,
            fingerprint: &self.fingerprint,
        };
        if !self.transport.post_command("/login", &request).await? {
            return Err(ClientError::Login(format!(
                "bridge rejected credentials for {}",
                self.username
            )));
        }

        let status = self.fetch_status().await?;
        self.apply_status(status);
        Ok(())
    }

    async fn logout(&self) -> Result<(), ClientError> {
        info!("Logging out of ADT Pulse");
        self.transport
            .http
            .post(self.transport.url("/logout"))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn wait_for_update(&self) -> Result<bool, ClientError> {
        tokio::time::sleep(self.poll_interval).await;
        let status = self.fetch_status().await?;
        Ok(self.apply_status(status))
    }

    fn gateway_online(&self) -> bool {
        self.gateway_online.load(Ordering::SeqCst)
    }

    fn sites(&self) -> Vec<Arc<dyn PulseSite>> {
        match self.sites.read() {
            Ok(sites) => sites
                .iter()
                .map(|s| s.clone() as Arc<dyn PulseSite>)
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
