use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;

/// Zone state reported for a zone that is not tripped.
pub const STATE_OK: &str = "OK";

/// Alarm status vocabulary used by the Pulse portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum AdtAlarmStatus {
    #[strum(serialize = "away")]
    Away,
    #[strum(serialize = "stay")]
    Home,
    #[strum(serialize = "off")]
    Off,
    #[strum(serialize = "arming")]
    Arming,
    #[strum(serialize = "disarming")]
    Disarming,
    #[strum(serialize = "unknown")]
    Unknown,
}

/// A single monitored sensor point within a site.
///
/// zone = {'id': 'sensor-12', 'name': 'South Office Motion',
/// 'tags': ['sensor', 'motion'], 'status': 'Online', 'state': 'Motion',
/// 'last_activity_timestamp': 1569078085}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// Portal device id, e.g. `sensor-12`
    pub id: String,
    pub name: String,
    pub tags: BTreeSet<String>,
    /// Device status, e.g. `Online`
    pub status: String,
    /// Sensor state, `OK` when not tripped
    pub state: String,
    /// Epoch seconds of the last activity
    pub last_activity_timestamp: i64,
}

impl Zone {
    pub fn is_tripped(&self) -> bool {
        self.state != STATE_OK
    }
}

/// Errors raised by a Pulse client implementation.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("ADT Pulse login failed: {0}")]
    Login(String),

    #[error("Request to ADT Pulse bridge failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid ADT Pulse bridge URL {0}")]
    InvalidUrl(String),
}

/// A monitored premises with one alarm panel and a set of zones.
///
/// Implementations own the data and update it in place while polling; all
/// getters return the latest known value.
#[async_trait]
pub trait PulseSite: Send + Sync {
    fn id(&self) -> String;

    fn name(&self) -> String;

    /// Raw vendor alarm status (see [`AdtAlarmStatus`])
    fn status(&self) -> String;

    /// Epoch seconds of the last site update
    fn last_updated(&self) -> f64;

    /// Zones keyed by numeric zone id
    fn zones(&self) -> BTreeMap<u32, Zone>;

    fn zone(&self, zone_id: u32) -> Option<Zone> {
        self.zones().remove(&zone_id)
    }

    async fn arm_home(&self, force_arm: bool) -> bool;

    async fn arm_away(&self, force_arm: bool) -> bool;

    async fn disarm(&self) -> bool;
}

/// Connection to the Pulse cloud service.
#[async_trait]
pub trait PulseService: Send + Sync {
    async fn login(&self) -> Result<(), ClientError>;

    async fn logout(&self) -> Result<(), ClientError>;

    /// Wait until vendor data may have changed.
    ///
    /// Returns `Ok(true)` if the site or zone data differs from before.
    async fn wait_for_update(&self) -> Result<bool, ClientError>;

    fn gateway_online(&self) -> bool;

    fn sites(&self) -> Vec<Arc<dyn PulseSite>>;
}
